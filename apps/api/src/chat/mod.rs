//! Essay-writing coach: free-text, multi-turn, scoped to SPM Paper 2.
//!
//! Named users get one persisted thread that is loaded before and saved after
//! every exchange. Anonymous callers send their own history with each message.
//! A failed model call saves nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chat::prompts::{
    coach_system, CONCLUSION_TIPS_PROMPT, GREETING, IMPROVE_INTRODUCTION_PROMPT,
    SAMPLE_ESSAY_PROMPT,
};
use crate::errors::AppError;
use crate::llm_client::ChatTurn;
use crate::normalizer::record::ANONYMOUS_USER;
use crate::state::AppState;

pub mod handlers;
pub mod prompts;

pub const MAX_MESSAGE_CHARS: usize = 4000;
/// Most recent turns sent upstream with each message.
const CONTEXT_TURNS: usize = 40;
/// Most recent turns kept in a thread.
const STORED_TURNS: usize = 200;

/// Canned questions offered next to the chat box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickHelp {
    SampleEssay,
    ImproveIntroduction,
    ConclusionTips,
}

impl QuickHelp {
    pub const ALL: [QuickHelp; 3] = [
        QuickHelp::SampleEssay,
        QuickHelp::ImproveIntroduction,
        QuickHelp::ConclusionTips,
    ];

    pub fn label(self) -> &'static str {
        match self {
            QuickHelp::SampleEssay => "Sample Essay",
            QuickHelp::ImproveIntroduction => "Improve My Introduction",
            QuickHelp::ConclusionTips => "Conclusion Tips",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            QuickHelp::SampleEssay => SAMPLE_ESSAY_PROMPT,
            QuickHelp::ImproveIntroduction => IMPROVE_INTRODUCTION_PROMPT,
            QuickHelp::ConclusionTips => CONCLUSION_TIPS_PROMPT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuickHelpOption {
    pub id: QuickHelp,
    pub label: &'static str,
    pub prompt: &'static str,
}

fn quick_help_options() -> Vec<QuickHelpOption> {
    QuickHelp::ALL
        .iter()
        .map(|&id| QuickHelpOption {
            id,
            label: id.label(),
            prompt: id.prompt(),
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub username: Option<String>,
    pub message: Option<String>,
    pub quick_help: Option<QuickHelp>,
    /// Earlier turns, used only for anonymous callers.
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl ChatRequest {
    /// The new user turn: typed text or a quick-help prompt, never both.
    fn user_message(&self) -> Result<String, AppError> {
        let message = self
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());
        match (message, self.quick_help) {
            (Some(_), Some(_)) => Err(AppError::Validation(
                "provide either message or quick_help, not both".to_string(),
            )),
            (Some(message), None) if message.chars().count() > MAX_MESSAGE_CHARS => {
                Err(AppError::Validation(format!(
                    "message must be at most {MAX_MESSAGE_CHARS} characters"
                )))
            }
            (Some(message), None) => Ok(message.to_string()),
            (None, Some(help)) => Ok(help.prompt().to_string()),
            (None, None) => Err(AppError::Validation(
                "message cannot be empty; provide message or quick_help".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    /// Whole thread after this exchange, oldest first.
    pub messages: Vec<ChatTurn>,
    pub persisted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatHistory {
    pub username: String,
    pub greeting: &'static str,
    pub messages: Vec<ChatTurn>,
    pub updated_at: Option<DateTime<Utc>>,
    pub quick_help: Vec<QuickHelpOption>,
}

fn keep_last(turns: &mut Vec<ChatTurn>, limit: usize) {
    let excess = turns.len().saturating_sub(limit);
    turns.drain(..excess);
}

/// One exchange: append the user's turn, ask the coach, append its reply.
pub async fn run_chat(
    state: &AppState,
    username: Option<String>,
    request: &ChatRequest,
) -> Result<ChatReply, AppError> {
    let message = request.user_message()?;

    let mut messages = match username.as_deref() {
        Some(name) => state
            .chats
            .load(name)
            .await?
            .map(|thread| thread.messages)
            .unwrap_or_default(),
        None => request
            .history
            .iter()
            .filter(|turn| !turn.content.trim().is_empty())
            .cloned()
            .collect(),
    };
    messages.push(ChatTurn::user(message));
    keep_last(&mut messages, STORED_TURNS);

    let window = &messages[messages.len().saturating_sub(CONTEXT_TURNS)..];
    let reply = state
        .llm
        .converse(&coach_system(username.as_deref()), window)
        .await?;
    messages.push(ChatTurn::assistant(reply.clone()));
    keep_last(&mut messages, STORED_TURNS);

    let persisted = match username.as_deref() {
        Some(name) => {
            state.chats.save(name, &messages).await?;
            true
        }
        None => false,
    };
    info!(
        "Coach replied to {} ({} turns in thread)",
        username.as_deref().unwrap_or(ANONYMOUS_USER),
        messages.len()
    );

    Ok(ChatReply {
        reply,
        messages,
        persisted,
    })
}

/// Stored thread for a named user; empty when they have not chatted yet.
pub async fn chat_history(state: &AppState, username: String) -> Result<ChatHistory, AppError> {
    let thread = state.chats.load(&username).await?;
    let (messages, updated_at) = match thread {
        Some(thread) => (thread.messages, Some(thread.updated_at)),
        None => (Vec::new(), None),
    };
    Ok(ChatHistory {
        username,
        greeting: GREETING,
        messages,
        updated_at,
        quick_help: quick_help_options(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::service::tests::harness;
    use crate::llm_client::testing::ScriptedGenerator;
    use crate::llm_client::{ChatRole, TextGenerator};
    use crate::store::ChatStore;
    use std::sync::Arc;

    fn ask(message: &str) -> ChatRequest {
        ChatRequest {
            username: None,
            message: Some(message.to_string()),
            quick_help: None,
            history: vec![],
        }
    }

    #[tokio::test]
    async fn test_named_user_thread_is_loaded_and_saved() {
        let h = harness(["Start with a hook.", "Use a rhetorical question."]);
        let amir = Some("amir".to_string());

        run_chat(&h.state, amir.clone(), &ask("How do I start an article?"))
            .await
            .unwrap();
        let second = run_chat(&h.state, amir, &ask("Another idea?")).await.unwrap();

        assert!(second.persisted);
        assert_eq!(second.reply, "Use a rhetorical question.");
        assert_eq!(second.messages.len(), 4);

        let turns = h.llm.seen_turns.lock().unwrap();
        assert_eq!(turns[1].len(), 3);
        assert_eq!(turns[1][1], ChatTurn::assistant("Start with a hook."));
        assert_eq!(turns[1][2], ChatTurn::user("Another idea?"));

        let stored = h.chats.load("amir").await.unwrap().unwrap();
        assert_eq!(stored.messages, second.messages);
        assert!(h.llm.seen_systems.lock().unwrap()[0].contains("username: amir"));
    }

    #[tokio::test]
    async fn test_anonymous_history_is_used_but_not_saved() {
        let h = harness(["About 80 words."]);
        let request = ChatRequest {
            history: vec![
                ChatTurn::assistant(GREETING),
                ChatTurn::user("What is Part 1?"),
                ChatTurn::assistant("An informal email."),
                ChatTurn::user("   "),
            ],
            ..ask("How long should it be?")
        };
        let reply = run_chat(&h.state, None, &request).await.unwrap();

        assert!(!reply.persisted);
        assert_eq!(reply.messages.len(), 5);
        assert_eq!(reply.messages.last().unwrap().role, ChatRole::Assistant);
        assert!(h.chats.threads.lock().unwrap().is_empty());
        assert_eq!(h.llm.seen_turns.lock().unwrap()[0].len(), 4);
    }

    #[tokio::test]
    async fn test_quick_help_sends_canned_prompt() {
        let h = harness(["1. Restate your view."]);
        let request = ChatRequest {
            message: None,
            quick_help: Some(QuickHelp::ConclusionTips),
            ..ask("")
        };
        run_chat(&h.state, None, &request).await.unwrap();
        let turns = h.llm.seen_turns.lock().unwrap();
        assert_eq!(turns[0], vec![ChatTurn::user(CONCLUSION_TIPS_PROMPT)]);
    }

    #[tokio::test]
    async fn test_invalid_messages_never_reach_model() {
        let h = harness(["unused"]);
        let both = ChatRequest {
            quick_help: Some(QuickHelp::SampleEssay),
            ..ask("Help")
        };
        let too_long = ask(&"a".repeat(MAX_MESSAGE_CHARS + 1));
        for request in [ask("  "), both, too_long] {
            let err = run_chat(&h.state, None, &request).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert_eq!(h.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_leaves_thread_untouched() {
        let mut h = harness(["unused"]);
        let failing: Arc<dyn TextGenerator> = Arc::new(ScriptedGenerator::with_results([Err(529)]));
        h.state.llm = failing;
        h.chats
            .save("amir", &[ChatTurn::user("Hi"), ChatTurn::assistant("Hello!")])
            .await
            .unwrap();

        let err = run_chat(&h.state, Some("amir".to_string()), &ask("Tips?"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ModelInvocation(_)));
        assert_eq!(h.chats.load("amir").await.unwrap().unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_context_window_and_stored_thread_are_bounded() {
        let h = harness(["ok"]);
        let long: Vec<ChatTurn> = (0..STORED_TURNS)
            .map(|i| {
                if i % 2 == 0 {
                    ChatTurn::user(format!("q{i}"))
                } else {
                    ChatTurn::assistant(format!("a{i}"))
                }
            })
            .collect();
        h.chats.save("amir", &long).await.unwrap();

        let reply = run_chat(&h.state, Some("amir".to_string()), &ask("last"))
            .await
            .unwrap();
        assert_eq!(reply.messages.len(), STORED_TURNS);
        assert_eq!(reply.messages.last().unwrap(), &ChatTurn::assistant("ok"));
        assert_eq!(h.llm.seen_turns.lock().unwrap()[0].len(), CONTEXT_TURNS);
    }

    #[tokio::test]
    async fn test_history_for_new_user_offers_greeting_and_quick_help() {
        let h = harness(["unused"]);
        let history = chat_history(&h.state, "siti".to_string()).await.unwrap();
        assert!(history.messages.is_empty());
        assert!(history.updated_at.is_none());
        assert_eq!(history.greeting, GREETING);
        assert_eq!(history.quick_help.len(), 3);
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json["quick_help"][1]["id"], "improve_introduction");
    }
}
