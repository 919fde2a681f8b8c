//! Response normalizer. Turns free-text model output into an `EvaluationRecord`.
//!
//! Flow per attempt: AwaitingResponse → Extracting → Validating → Normalized,
//! or → Failed and back to AwaitingResponse while the retry policy allows.
//! Only unparsable output is retried; a failed model call propagates at once.

use std::sync::{Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::llm_client::{ContentPart, LlmError, TextGenerator};

pub mod defaults;
pub mod extract;
pub mod record;
pub mod retry;
pub mod schema;
pub mod scores;
pub mod stage;

pub use extract::extract_json;
pub use record::{EvaluationRecord, RecordContext};
pub use retry::RetryPolicy;
pub use schema::Schema;

use retry::{run_with_retry, AttemptError, RetryError};
use stage::{Stage, StageTracker};

/// Why a single raw response could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no JSON object found in model output")]
    NoJsonObject,

    #[error("unexpected payload shape: {0}")]
    Shape(String),
}

/// Terminal parse failure. Carries the last raw text for support/debugging.
#[derive(Debug, Clone, Error)]
#[error("model output could not be parsed after {attempts} attempt(s): {reason}")]
pub struct ParseError {
    pub attempts: u32,
    pub reason: ParseFailure,
    pub last_raw: String,
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("model invocation failed: {0}")]
    ModelInvocation(#[from] LlmError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// What gets sent upstream on every attempt.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub parts: Vec<ContentPart>,
}

#[derive(Debug, Error)]
enum AttemptFailure {
    #[error(transparent)]
    Model(LlmError),

    #[error("{reason}")]
    Unparsable { reason: ParseFailure, raw: String },
}

fn with_tracker<R>(tracker: &Mutex<StageTracker>, f: impl FnOnce(&mut StageTracker) -> R) -> R {
    let mut guard = tracker.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Drives one raw response through extraction and validation.
fn process_raw<T>(
    raw_text: &str,
    tracker: &mut StageTracker,
    validate: impl FnOnce(Map<String, Value>) -> Result<T, ParseFailure>,
) -> Result<T, ParseFailure> {
    tracker.advance(Stage::Extracting);
    let Some(payload) = extract_json(raw_text) else {
        tracker.advance(Stage::Failed);
        return Err(ParseFailure::NoJsonObject);
    };

    tracker.advance(Stage::Validating);
    match validate(payload) {
        Ok(value) => {
            tracker.advance(Stage::Normalized);
            Ok(value)
        }
        Err(reason) => {
            tracker.advance(Stage::Failed);
            Err(reason)
        }
    }
}

/// Single-attempt normalization of text already in hand.
pub fn normalize(
    raw_text: &str,
    schema: Schema,
    context: &RecordContext,
) -> Result<EvaluationRecord, ParseError> {
    let mut tracker = StageTracker::default();
    process_raw(raw_text, &mut tracker, |payload| {
        schema.validate(payload, context)
    })
    .map_err(|reason| ParseError {
        attempts: 1,
        reason,
        last_raw: raw_text.to_string(),
    })
}

/// Calls the model and validates its output, re-invoking the model on
/// unparsable output until `policy` is spent.
pub async fn generate_validated<T, V>(
    generator: &dyn TextGenerator,
    request: &ModelRequest,
    policy: &RetryPolicy,
    validate: V,
) -> Result<T, NormalizeError>
where
    V: Fn(Map<String, Value>) -> Result<T, ParseFailure> + Sync,
{
    let tracker = Mutex::new(StageTracker::default());
    let tracker = &tracker;
    let validate = &validate;

    let outcome = run_with_retry(policy, |_attempt| async move {
        with_tracker(tracker, StageTracker::rearm);
        let raw = generator
            .generate(&request.system, &request.parts)
            .await
            .map_err(|e| AttemptError::Fatal(AttemptFailure::Model(e)))?;

        with_tracker(tracker, |t| process_raw(&raw, t, validate)).map_err(|reason| {
            AttemptError::Retryable(AttemptFailure::Unparsable {
                reason,
                raw: raw.clone(),
            })
        })
    })
    .await;

    let attempts = with_tracker(tracker, |t| t.attempt());
    match outcome {
        Ok(value) => {
            info!("Model output normalized on attempt {attempts}");
            Ok(value)
        }
        Err(RetryError::Fatal(failure)) => Err(failure.into_normalize_error(attempts)),
        Err(RetryError::Exhausted { attempts, last }) => Err(last.into_normalize_error(attempts)),
    }
}

impl AttemptFailure {
    fn into_normalize_error(self, attempts: u32) -> NormalizeError {
        match self {
            AttemptFailure::Model(e) => NormalizeError::ModelInvocation(e),
            AttemptFailure::Unparsable { reason, raw } => NormalizeError::Parse(ParseError {
                attempts,
                reason,
                last_raw: raw,
            }),
        }
    }
}

/// Full pipeline for an assessment: model call, extraction, schema validation,
/// bounded retry.
pub async fn normalize_with_retry(
    generator: &dyn TextGenerator,
    request: &ModelRequest,
    schema: Schema,
    context: &RecordContext,
    policy: &RetryPolicy,
) -> Result<EvaluationRecord, NormalizeError> {
    generate_validated(generator, request, policy, |payload| {
        schema.validate(payload, context)
    })
    .await
}

/// Same retry discipline for payloads that map straight onto a serde type.
pub async fn generate_json<T: DeserializeOwned>(
    generator: &dyn TextGenerator,
    request: &ModelRequest,
    policy: &RetryPolicy,
) -> Result<T, NormalizeError> {
    generate_validated(generator, request, policy, |payload| {
        serde_json::from_value(Value::Object(payload)).map_err(|e| ParseFailure::Shape(e.to_string()))
    })
    .await
}
