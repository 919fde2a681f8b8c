use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatRow {
    pub username: String,
    pub messages: Value,
    pub updated_at: DateTime<Utc>,
}
