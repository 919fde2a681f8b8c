//! Practice task generation. Tasks are returned to the caller and never stored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use crate::assessment::prompts::PRACTICE_TASK_SYSTEM;
use crate::assessment::service::PaperPart;
use crate::errors::AppError;
use crate::llm_client::prompts::with_json_rules;
use crate::llm_client::ContentPart;
use crate::normalizer::{generate_json, ModelRequest};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeTask {
    pub title: String,
    pub instructions: String,
    #[serde(default)]
    pub notes: Vec<String>,
    /// Free text such as "125-150"; models sometimes send a bare number.
    #[serde(default, deserialize_with = "text_or_number")]
    pub word_count: String,
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct PracticeTaskRequest {
    pub part: PaperPart,
    pub essay_type: Option<String>,
}

pub async fn generate_practice_task(
    state: &AppState,
    part: PaperPart,
    essay_type: Option<&str>,
) -> Result<PracticeTask, AppError> {
    let essay_type = essay_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(part.default_type());

    let request = ModelRequest {
        system: with_json_rules(PRACTICE_TASK_SYSTEM),
        parts: vec![ContentPart::Text(format!(
            "Part: {}; Type: {essay_type}. Generate one practice task.",
            part.label()
        ))],
    };

    let task: PracticeTask = generate_json(state.llm.as_ref(), &request, &state.retry_policy).await?;
    info!("Generated {} practice task '{}'", part.label(), task.title);
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::service::tests::harness;

    #[tokio::test]
    async fn test_generates_task_from_wrapped_json() {
        let h = harness([
            r#"Sure! {"title": "A Rainy Day", "instructions": "Write an email to Ali.", "notes": ["when", "where", "why"], "word_count": 80}"#,
        ]);
        let task = generate_practice_task(&h.state, PaperPart::One, None)
            .await
            .unwrap();
        assert_eq!(task.title, "A Rainy Day");
        assert_eq!(task.notes.len(), 3);
        assert_eq!(task.word_count, "80");
        assert_eq!(h.store.len(), 0);

        let seen = h.llm.seen_parts.lock().unwrap();
        assert_eq!(
            seen[0][0],
            ContentPart::text("Part: Part 1; Type: Email. Generate one practice task.")
        );
    }

    #[tokio::test]
    async fn test_task_missing_title_is_retried_then_fails() {
        let h = harness([r#"{"instructions": "Write something."}"#]);
        let err = generate_practice_task(&h.state, PaperPart::Three, Some("Review"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
        assert_eq!(h.llm.calls(), 2);
    }
}
