use serde_json::{Map, Value};

use crate::normalizer::schema::{Schema, DEFAULT_ROLE};

/// Absent and explicit `null` are treated the same.
pub(crate) fn is_missing(value: Option<&Value>) -> bool {
    value.map_or(true, Value::is_null)
}

fn is_blank_text(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s.trim().is_empty(),
        other => is_missing(other),
    }
}

fn default_list(map: &mut Map<String, Value>, keys: &[&str]) {
    if let Some(&first) = keys.first() {
        if keys.iter().all(|key| is_missing(map.get(*key))) {
            map.insert(first.to_string(), Value::Array(Vec::new()));
        }
    }
}

/// Fills the keys downstream code reads unconditionally: list fields become
/// empty lists and the essay type falls back to the schema's sentinel.
pub fn fill_defaults(mut body: Map<String, Value>, schema: Schema) -> Map<String, Value> {
    let layout = schema.layout();

    match layout.feedback_object {
        Some(key) => {
            if is_missing(body.get(key)) {
                body.insert(key.to_string(), Value::Object(Map::new()));
            }
            if let Some(Value::Object(feedback)) = body.get_mut(key) {
                default_list(feedback, &["strengths"]);
                default_list(feedback, &["weaknesses"]);
            }
        }
        None => {
            default_list(&mut body, &["strengths"]);
            default_list(&mut body, &["weaknesses"]);
        }
    }
    default_list(&mut body, layout.suggestion_keys);
    default_list(&mut body, layout.focus_keys);

    if layout
        .type_keys
        .iter()
        .all(|key| is_blank_text(body.get(*key)))
    {
        body.insert(
            layout.type_keys[0].to_string(),
            Value::from(layout.sentinel_type),
        );
    }

    if let Some(key) = layout.role_key {
        if is_blank_text(body.get(key)) {
            body.insert(key.to_string(), Value::from(DEFAULT_ROLE));
        }
    }

    body
}
