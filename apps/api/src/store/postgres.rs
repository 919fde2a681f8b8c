use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::evaluation::EvaluationRow;
use crate::normalizer::EvaluationRecord;
use crate::store::{RecordFilter, RecordStore, SortOrder, StoredRecord};

/// Evaluations as JSONB rows in the `evaluations` table.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn find_query(sort: SortOrder) -> String {
    let direction = match sort {
        SortOrder::NewestFirst => "DESC",
        SortOrder::OldestFirst => "ASC",
    };
    format!(
        r#"
        SELECT id, username, kind, record, created_at
        FROM evaluations
        WHERE ($1::text IS NULL OR username = $1)
          AND ($2::text IS NULL OR kind = $2)
        ORDER BY created_at {direction}, id
        "#
    )
}

impl TryFrom<EvaluationRow> for StoredRecord {
    type Error = anyhow::Error;

    fn try_from(row: EvaluationRow) -> Result<Self> {
        let record: EvaluationRecord = serde_json::from_value(row.record)
            .with_context(|| format!("Corrupt evaluation record {}", row.id))?;
        Ok(StoredRecord { id: row.id, record })
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, record: &EvaluationRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO evaluations (id, username, kind, record, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(&record.metadata.username)
        .bind(record.kind.as_str())
        .bind(serde_json::to_value(record)?)
        .bind(record.metadata.created_at)
        .execute(&self.pool)
        .await?;

        info!(
            "Stored {} evaluation {id} for {}",
            record.kind.as_str(),
            record.metadata.username
        );
        Ok(id)
    }

    async fn find(&self, filter: &RecordFilter, sort: SortOrder) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query_as::<_, EvaluationRow>(&find_query(sort))
            .bind(filter.username.as_deref())
            .bind(filter.kind.map(|k| k.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StoredRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_find_query_direction() {
        assert!(find_query(SortOrder::NewestFirst).contains("created_at DESC"));
        assert!(find_query(SortOrder::OldestFirst).contains("created_at ASC"));
    }

    #[test]
    fn test_corrupt_row_is_an_error() {
        let row = EvaluationRow {
            id: Uuid::new_v4(),
            username: "amir".to_string(),
            kind: "self_test".to_string(),
            record: json!({"kind": "self_test"}),
            created_at: Utc::now(),
        };
        assert!(StoredRecord::try_from(row).is_err());
    }
}
