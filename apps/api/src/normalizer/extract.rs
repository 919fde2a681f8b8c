use serde_json::{Map, Value};

/// Pulls the JSON object out of free-text model output.
///
/// Slices from the first `{` to the last `}` and parses the slice. Surrounding
/// prose and markdown fences are ignored; braces inside string values are fine.
/// Two separate top-level objects defeat the slice, and that case returns
/// `None` rather than guessing which one was meant.
pub fn extract_json(raw_text: &str) -> Option<Map<String, Value>> {
    let start = raw_text.find('{')?;
    let end = raw_text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&raw_text[start..=end]).ok()
}
