//! The family of payload shapes the assessment prompts ask the model for.
//!
//! Each prompt produces a differently nested object ("essay_score" vs
//! "essay_evaluation" vs top-level "indicative_scores"). A `Schema` variant
//! describes where everything lives so one validation path serves all of them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::normalizer::defaults::{fill_defaults, is_missing};
use crate::normalizer::record::{EvaluationRecord, RecordContext, RecordMetadata, Suggestion};
use crate::normalizer::scores::{validate_and_coerce_scores, ScoreBounds};
use crate::normalizer::ParseFailure;

pub const FOUR_LENSES: &[&str] = &["content", "organization", "language", "communicative"];

pub const LEGACY_LENSES: &[&str] = &[
    "content",
    "organization",
    "clarity_and_coherence",
    "grammar_and_language",
    "evidence_and_support",
    "conclusion",
    "overall_score",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// Seven 0–10 lenses under `essay_score`, rewrites under `essay_suggestion`.
    LegacyTenPoint,
    /// SPM four-lens suggestions under `essay_evaluation`.
    FourLens,
    /// Four-lens self-test; strengths/weaknesses nested under `feedback`.
    SelfTest,
    /// Writer profile with top-level `indicative_scores`.
    WritingProfile,
}

/// Where each field of a schema lives in the model's payload.
/// Lookups try the keys in order and take the first present one.
#[derive(Debug)]
pub(crate) struct Layout {
    pub envelope_keys: &'static [&'static str],
    pub score_keys: &'static [&'static str],
    /// `(parent, child)` tried when none of `score_keys` is present.
    pub score_fallback: Option<(&'static str, &'static str)>,
    pub type_keys: &'static [&'static str],
    pub suggestion_keys: &'static [&'static str],
    pub focus_keys: &'static [&'static str],
    /// Strengths/weaknesses live under this object instead of at the top level.
    pub feedback_object: Option<&'static str>,
    pub role_key: Option<&'static str>,
    pub lenses: &'static [&'static str],
    pub bounds: ScoreBounds,
    pub sentinel_type: &'static str,
}

const LEGACY_LAYOUT: Layout = Layout {
    envelope_keys: &["essay_score", "essay_evaluation"],
    score_keys: &["scores"],
    score_fallback: None,
    type_keys: &["type_of_essay"],
    suggestion_keys: &["essay_suggestion", "feedback"],
    focus_keys: &[],
    feedback_object: None,
    role_key: None,
    lenses: LEGACY_LENSES,
    bounds: ScoreBounds::TEN_POINT,
    sentinel_type: "Unclassified",
};

const FOUR_LENS_LAYOUT: Layout = Layout {
    envelope_keys: &["essay_evaluation"],
    score_keys: &["scores"],
    score_fallback: None,
    type_keys: &["type_of_essay"],
    suggestion_keys: &["feedback"],
    focus_keys: &["next_focus"],
    feedback_object: None,
    role_key: None,
    lenses: FOUR_LENSES,
    bounds: ScoreBounds::FOUR_LENS,
    sentinel_type: "Mixed",
};

const SELF_TEST_LAYOUT: Layout = Layout {
    envelope_keys: &[],
    score_keys: &["scores"],
    score_fallback: Some(("analysis", "scores")),
    type_keys: &["type_of_essay"],
    suggestion_keys: &[],
    focus_keys: &["next_focus"],
    feedback_object: Some("feedback"),
    role_key: None,
    lenses: FOUR_LENSES,
    bounds: ScoreBounds::FOUR_LENS,
    sentinel_type: "Mixed",
};

const WRITING_PROFILE_LAYOUT: Layout = Layout {
    envelope_keys: &[],
    score_keys: &["indicative_scores", "scores"],
    score_fallback: None,
    type_keys: &["writing_style", "type_of_essay"],
    suggestion_keys: &[],
    focus_keys: &["top_priorities", "next_focus"],
    feedback_object: None,
    role_key: Some("game_like_role"),
    lenses: FOUR_LENSES,
    bounds: ScoreBounds::FOUR_LENS,
    sentinel_type: "Mixed",
};

pub const DEFAULT_ROLE: &str = "The Builder";

impl Schema {
    pub(crate) fn layout(self) -> &'static Layout {
        match self {
            Schema::LegacyTenPoint => &LEGACY_LAYOUT,
            Schema::FourLens => &FOUR_LENS_LAYOUT,
            Schema::SelfTest => &SELF_TEST_LAYOUT,
            Schema::WritingProfile => &WRITING_PROFILE_LAYOUT,
        }
    }

    /// Stable name used as the persisted `kind` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Schema::LegacyTenPoint => "legacy_ten_point",
            Schema::FourLens => "four_lens",
            Schema::SelfTest => "self_test",
            Schema::WritingProfile => "writing_profile",
        }
    }

    pub fn lenses(self) -> &'static [&'static str] {
        self.layout().lenses
    }

    pub fn bounds(self) -> ScoreBounds {
        self.layout().bounds
    }

    /// Turns an extracted payload into a record: unwrap the envelope, check
    /// container types, fill defaults, coerce scores.
    pub fn validate(
        self,
        payload: Map<String, Value>,
        context: &RecordContext,
    ) -> Result<EvaluationRecord, ParseFailure> {
        let layout = self.layout();
        let mut body = unwrap_envelope(payload, layout)?;
        check_shape(&body, layout)?;

        if let Some(intended) = context.intended_type.as_deref() {
            if first_text(&body, layout.type_keys).is_none() {
                body.insert(layout.type_keys[0].to_string(), Value::from(intended));
            }
        }
        let body = fill_defaults(body, self);

        let raw_scores = first_present(&body, layout.score_keys)
            .or_else(|| {
                layout
                    .score_fallback
                    .and_then(|(parent, child)| body.get(parent)?.get(child))
            })
            .cloned()
            .unwrap_or(Value::Null);
        let coerced = validate_and_coerce_scores(&raw_scores, layout.lenses, layout.bounds);
        for warning in &coerced.warnings {
            warn!(schema = ?self, "Score adjusted: {warning}");
        }

        let (strengths, weaknesses) = match layout.feedback_object {
            Some(key) => {
                let feedback = body.get(key);
                (
                    string_list(feedback.and_then(|f| f.get("strengths"))),
                    string_list(feedback.and_then(|f| f.get("weaknesses"))),
                )
            }
            None => (
                string_list(body.get("strengths")),
                string_list(body.get("weaknesses")),
            ),
        };

        Ok(EvaluationRecord {
            kind: self,
            essay_type: first_text(&body, layout.type_keys)
                .unwrap_or(layout.sentinel_type)
                .to_string(),
            part: text(body.get("part"))
                .map(String::from)
                .or_else(|| context.intended_part.clone()),
            scores: coerced.scores,
            suggestions: suggestions(first_present(&body, layout.suggestion_keys)),
            strengths,
            weaknesses,
            next_focus: string_list(first_present(&body, layout.focus_keys)),
            summary_comment: text(body.get("summary_comment")).map(String::from),
            game_like_role: layout
                .role_key
                .and_then(|key| text(body.get(key)))
                .map(String::from),
            metadata: RecordMetadata::new(context.username.as_deref()),
        })
    }
}

fn unwrap_envelope(
    mut payload: Map<String, Value>,
    layout: &Layout,
) -> Result<Map<String, Value>, ParseFailure> {
    for &key in layout.envelope_keys {
        match payload.remove(key) {
            Some(Value::Object(inner)) => return Ok(inner),
            Some(Value::Null) | None => continue,
            Some(_) => return Err(ParseFailure::Shape(format!("'{key}' is not an object"))),
        }
    }
    Ok(payload)
}

fn check_shape(body: &Map<String, Value>, layout: &Layout) -> Result<(), ParseFailure> {
    let expect = |key: &str, value: Option<&Value>, ok: fn(&Value) -> bool, what: &str| {
        match value {
            Some(v) if !v.is_null() && !ok(v) => {
                Err(ParseFailure::Shape(format!("'{key}' is not {what}")))
            }
            _ => Ok(()),
        }
    };

    for &key in layout.score_keys {
        expect(key, body.get(key), Value::is_object, "an object")?;
    }
    for &key in layout.suggestion_keys.iter().chain(layout.focus_keys) {
        expect(key, body.get(key), Value::is_array, "a list")?;
    }
    match layout.feedback_object {
        Some(key) => {
            let feedback = body.get(key);
            expect(key, feedback, Value::is_object, "an object")?;
            for list in ["strengths", "weaknesses"] {
                expect(list, feedback.and_then(|f| f.get(list)), Value::is_array, "a list")?;
            }
        }
        None => {
            for list in ["strengths", "weaknesses"] {
                expect(list, body.get(list), Value::is_array, "a list")?;
            }
        }
    }
    Ok(())
}

fn first_present<'a>(body: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .find(|v| !is_missing(Some(v)))
}

fn text(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn first_text<'a>(body: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| text(body.get(*key)))
}

/// Non-empty strings in order; numbers and booleans are stringified, other
/// entries dropped.
fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Positive whole numbers, including integral floats like `2.0` and numeric strings.
fn section_index(value: Option<&Value>) -> Option<u32> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() || n.fract() != 0.0 || n < 1.0 || n > f64::from(u32::MAX) {
        return None;
    }
    Some(n as u32)
}

/// Suggestion entries in model order. A missing or invalid section index
/// continues from the previous one.
fn suggestions(value: Option<&Value>) -> Vec<Suggestion> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    let field = |item: &Value, key: &str| {
        item.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    let mut previous = 0u32;
    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| {
            let section =
                section_index(item.get("section")).unwrap_or_else(|| previous.saturating_add(1));
            previous = section;
            Suggestion {
                section,
                original_text: field(item, "original_text"),
                issue: field(item, "issue"),
                suggestion: field(item, "suggestion"),
                improved_version: field(item, "improved_version"),
            }
        })
        .collect()
}
