use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalizer::schema::Schema;

/// Username recorded for submissions made without a named user.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Key of the derived four-lens total in both raw payloads and persisted records.
pub const TOTAL_KEY: &str = "total_out_of_20";

/// Lens name → coerced score. `None` means "unscored", never zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LensScores {
    #[serde(flatten)]
    pub lenses: BTreeMap<String, Option<i64>>,
    #[serde(
        rename = "total_out_of_20",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_out_of_20: Option<i64>,
}

impl LensScores {
    pub fn get(&self, lens: &str) -> Option<i64> {
        self.lenses.get(lens).copied().flatten()
    }

    /// True when every listed lens carries a score.
    pub fn is_complete(&self, lenses: &[&str]) -> bool {
        lenses.iter().all(|lens| self.get(lens).is_some())
    }
}

/// One targeted rewrite. `section` is 1-based and follows the model's order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub section: u32,
    pub original_text: String,
    #[serde(default)]
    pub issue: String,
    pub suggestion: String,
    pub improved_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl RecordMetadata {
    pub fn new(username: Option<&str>) -> Self {
        let username = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(ANONYMOUS_USER)
            .to_string();
        Self {
            username,
            created_at: Utc::now(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username == ANONYMOUS_USER
    }
}

/// Caller-supplied context for a normalization: who submitted the essay and,
/// for self-tests, what part/type the student said they were practising.
#[derive(Debug, Clone, Default)]
pub struct RecordContext {
    pub username: Option<String>,
    pub intended_part: Option<String>,
    pub intended_type: Option<String>,
}

impl RecordContext {
    pub fn for_user(username: Option<&str>) -> Self {
        Self {
            username: username.map(String::from),
            ..Self::default()
        }
    }
}

/// The normalized output of one essay assessment.
///
/// Records are built once by the normalizer and only ever appended to the
/// store; a correction is a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub kind: Schema,
    pub essay_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<String>,
    pub scores: LensScores,
    pub suggestions: Vec<Suggestion>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub next_focus: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_like_role: Option<String>,
    pub metadata: RecordMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults_to_anonymous() {
        assert!(RecordMetadata::new(None).is_anonymous());
        assert!(RecordMetadata::new(Some("   ")).is_anonymous());
        let named = RecordMetadata::new(Some(" aisyah "));
        assert_eq!(named.username, "aisyah");
        assert!(!named.is_anonymous());
    }

    #[test]
    fn test_lens_scores_flatten_total_alongside_lenses() {
        let mut scores = LensScores::default();
        scores.lenses.insert("content".into(), Some(4));
        scores.lenses.insert("language".into(), None);
        scores.total_out_of_20 = Some(14);

        let json = serde_json::to_value(&scores).unwrap();
        assert_eq!(json["content"], 4);
        assert!(json["language"].is_null());
        assert_eq!(json[TOTAL_KEY], 14);

        let back: LensScores = serde_json::from_value(json).unwrap();
        assert_eq!(back, scores);
        assert!(!back.lenses.contains_key(TOTAL_KEY));
    }

    #[test]
    fn test_total_omitted_when_not_derived() {
        let mut scores = LensScores::default();
        scores.lenses.insert("content".into(), Some(3));
        let json = serde_json::to_value(&scores).unwrap();
        assert!(json.get(TOTAL_KEY).is_none());
    }

    #[test]
    fn test_is_complete_treats_missing_as_unscored() {
        let mut scores = LensScores::default();
        scores.lenses.insert("content".into(), Some(0));
        scores.lenses.insert("language".into(), None);
        assert!(scores.is_complete(&["content"]));
        assert!(!scores.is_complete(&["content", "language"]));
        assert_eq!(scores.get("content"), Some(0));
        assert_eq!(scores.get("organization"), None);
    }
}
