/// LLM Client: the single point of entry for all model calls in the essay API.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// Everything else depends on the `TextGenerator` trait.
///
/// Model: claude-sonnet-4-5 (hardcoded, do not make configurable to prevent drift)
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all assessment calls.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
/// Transport-level retries (429 / 5xx). Unparsable output is retried by the normalizer.
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// One piece of model input: prompt text or an opaque image.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Image { media_type: String, data: Bytes },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One message of a multi-turn conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Anything that turns a system prompt plus content parts into raw text.
/// No promise about the format of the text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, parts: &[ContentPart]) -> Result<String, LlmError>;

    /// Next assistant reply for a conversation whose last turn is the user's.
    async fn converse(&self, system: &str, turns: &[ChatTurn]) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<RequestBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    encoding: &'static str,
    media_type: &'a str,
    data: String,
}

/// Messages for a conversation. The API wants a leading user turn and
/// alternating roles, so leading assistant turns are dropped and runs of the
/// same role are sent as one message with several text blocks.
fn conversation_messages(turns: &[ChatTurn]) -> Vec<AnthropicMessage<'_>> {
    let first_user = turns
        .iter()
        .position(|t| t.role == ChatRole::User)
        .unwrap_or(turns.len());

    let mut messages: Vec<AnthropicMessage<'_>> = Vec::new();
    for turn in &turns[first_user..] {
        let block = RequestBlock::Text {
            text: &turn.content,
        };
        match messages.last_mut() {
            Some(last) if last.role == turn.role.as_str() => last.content.push(block),
            _ => messages.push(AnthropicMessage {
                role: turn.role.as_str(),
                content: vec![block],
            }),
        }
    }
    messages
}

impl<'a> From<&'a ContentPart> for RequestBlock<'a> {
    fn from(part: &'a ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => RequestBlock::Text { text },
            ContentPart::Image { media_type, data } => RequestBlock::Image {
                source: ImageSource {
                    encoding: "base64",
                    media_type,
                    data: STANDARD.encode(data),
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ResponseBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Concatenates every text block in order.
    pub fn text(&self) -> Option<String> {
        let text: String = self
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        (!text.trim().is_empty()).then_some(text)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Wraps the Anthropic Messages API with transport retries.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            api_key,
        })
    }

    /// Makes a raw single-message call, returning the full response object.
    pub async fn call(&self, system: &str, parts: &[ContentPart]) -> Result<LlmResponse, LlmError> {
        self.send(&AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: parts.iter().map(RequestBlock::from).collect(),
            }],
        })
        .await
    }

    /// Makes a raw multi-turn call.
    pub async fn call_turns(
        &self,
        system: &str,
        turns: &[ChatTurn],
    ) -> Result<LlmResponse, LlmError> {
        self.send(&AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: conversation_messages(turns),
        })
        .await
    }

    /// Retries on 429 (rate limit) and 5xx errors with exponential backoff.
    async fn send(&self, request_body: &AnthropicRequest<'_>) -> Result<LlmResponse, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let llm_response: LlmResponse = response.json().await?;

            debug!(
                "LLM call succeeded: input_tokens={}, output_tokens={}",
                llm_response.usage.input_tokens, llm_response.usage.output_tokens
            );

            return Ok(llm_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, system: &str, parts: &[ContentPart]) -> Result<String, LlmError> {
        self.call(system, parts)
            .await?
            .text()
            .ok_or(LlmError::EmptyContent)
    }

    async fn converse(&self, system: &str, turns: &[ChatTurn]) -> Result<String, LlmError> {
        self.call_turns(system, turns)
            .await?
            .text()
            .ok_or(LlmError::EmptyContent)
    }
}

/// Scripted generators for pipeline tests.
#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Replays canned responses in order; repeats the last one when exhausted.
    pub struct ScriptedGenerator {
        responses: Mutex<VecDeque<Result<String, u16>>>,
        last: Mutex<Option<Result<String, u16>>>,
        calls: AtomicU32,
        pub seen_parts: Mutex<Vec<Vec<ContentPart>>>,
        pub seen_turns: Mutex<Vec<Vec<ChatTurn>>>,
        pub seen_systems: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        pub fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self::with_results(responses.into_iter().map(|r| Ok(r.into())))
        }

        /// `Err(status)` entries simulate an API failure with that status.
        pub fn with_results(responses: impl IntoIterator<Item = Result<String, u16>>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
                last: Mutex::new(None),
                calls: AtomicU32::new(0),
                seen_parts: Mutex::new(Vec::new()),
                seen_turns: Mutex::new(Vec::new()),
                seen_systems: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_result(&self, system: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_systems.lock().unwrap().push(system.to_string());
            let next = self.responses.lock().unwrap().pop_front();
            let result = match next {
                Some(r) => {
                    *self.last.lock().unwrap() = Some(r.clone());
                    r
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .clone()
                    .unwrap_or_else(|| Ok(String::new())),
            };
            result.map_err(|status| LlmError::Api {
                status,
                message: "scripted failure".to_string(),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, system: &str, parts: &[ContentPart]) -> Result<String, LlmError> {
            self.seen_parts.lock().unwrap().push(parts.to_vec());
            self.next_result(system)
        }

        async fn converse(&self, system: &str, turns: &[ChatTurn]) -> Result<String, LlmError> {
            self.seen_turns.lock().unwrap().push(turns.to_vec());
            self.next_result(system)
        }
    }
}
