//! Document store for normalized evaluations.
//!
//! Append-only: records are inserted once and never updated or deleted.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::normalizer::{EvaluationRecord, Schema};

pub mod chats;
#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use chats::{ChatStore, ChatThread, PgChatStore};
pub use postgres::PgRecordStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub username: Option<String>,
    pub kind: Option<Schema>,
}

impl RecordFilter {
    pub fn for_user(username: &str, kind: Schema) -> Self {
        Self {
            username: Some(username.to_string()),
            kind: Some(kind),
        }
    }

    pub fn matches(&self, record: &EvaluationRecord) -> bool {
        self.username
            .as_deref()
            .map_or(true, |u| u == record.metadata.username)
            && self.kind.map_or(true, |k| k == record.kind)
    }
}

/// Ordering by `metadata.created_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub record: EvaluationRecord,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &EvaluationRecord) -> Result<Uuid>;

    async fn find(&self, filter: &RecordFilter, sort: SortOrder) -> Result<Vec<StoredRecord>>;

    /// Most recent record matching `filter`, if any.
    async fn latest(&self, filter: &RecordFilter) -> Result<Option<StoredRecord>> {
        Ok(self
            .find(filter, SortOrder::NewestFirst)
            .await?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::record::{LensScores, RecordMetadata};

    fn record(username: &str, kind: Schema) -> EvaluationRecord {
        EvaluationRecord {
            kind,
            essay_type: "Narrative".to_string(),
            part: None,
            scores: LensScores::default(),
            suggestions: vec![],
            strengths: vec![],
            weaknesses: vec![],
            next_focus: vec![],
            summary_comment: None,
            game_like_role: None,
            metadata: RecordMetadata::new(Some(username)),
        }
    }

    #[test]
    fn test_filter_matches_on_both_fields() {
        let filter = RecordFilter::for_user("amir", Schema::SelfTest);
        assert!(filter.matches(&record("amir", Schema::SelfTest)));
        assert!(!filter.matches(&record("amir", Schema::FourLens)));
        assert!(!filter.matches(&record("siti", Schema::SelfTest)));
        assert!(RecordFilter::default().matches(&record("siti", Schema::FourLens)));
    }

    #[test]
    fn test_stored_record_serializes_flat() {
        let stored = StoredRecord {
            id: Uuid::nil(),
            record: record("amir", Schema::FourLens),
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["kind"], "four_lens");
        assert_eq!(json["metadata"]["username"], "amir");
        assert!(json["id"].is_string());
    }
}
