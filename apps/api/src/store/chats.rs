//! Per-user coaching conversations.
//!
//! Unlike evaluations, a thread is a single document that is replaced on
//! every exchange.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::debug;

use crate::llm_client::ChatTurn;
use crate::models::chat::ChatRow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatThread {
    pub username: String,
    pub messages: Vec<ChatTurn>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn load(&self, username: &str) -> Result<Option<ChatThread>>;

    /// Replaces the user's thread, creating it on first save.
    async fn save(&self, username: &str, messages: &[ChatTurn]) -> Result<ChatThread>;
}

#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TryFrom<ChatRow> for ChatThread {
    type Error = anyhow::Error;

    fn try_from(row: ChatRow) -> Result<Self> {
        let messages: Vec<ChatTurn> = serde_json::from_value(row.messages)
            .with_context(|| format!("Corrupt chat thread for {}", row.username))?;
        Ok(ChatThread {
            username: row.username,
            messages,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn load(&self, username: &str) -> Result<Option<ChatThread>> {
        let row = sqlx::query_as::<_, ChatRow>(
            "SELECT username, messages, updated_at FROM chats WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ChatThread::try_from).transpose()
    }

    async fn save(&self, username: &str, messages: &[ChatTurn]) -> Result<ChatThread> {
        let updated_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO chats (username, messages, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (username)
            DO UPDATE SET messages = EXCLUDED.messages, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(username)
        .bind(serde_json::to_value(messages)?)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Saved {} chat messages for {username}", messages.len());
        Ok(ChatThread {
            username: username.to_string(),
            messages: messages.to_vec(),
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_round_trips_turns() {
        let row = ChatRow {
            username: "amir".to_string(),
            messages: json!([
                {"role": "user", "content": "How do I start an article?"},
                {"role": "assistant", "content": "Open with a question."}
            ]),
            updated_at: Utc::now(),
        };
        let thread = ChatThread::try_from(row).unwrap();
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[1], ChatTurn::assistant("Open with a question."));
    }

    #[test]
    fn test_corrupt_row_is_an_error() {
        let row = ChatRow {
            username: "amir".to_string(),
            messages: json!({"role": "user"}),
            updated_at: Utc::now(),
        };
        assert!(ChatThread::try_from(row).is_err());
    }
}
