use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EvaluationRow {
    pub id: Uuid,
    pub username: String,
    pub kind: String,
    pub record: Value,
    pub created_at: DateTime<Utc>,
}
