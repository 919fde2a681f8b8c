use std::sync::Arc;

use crate::content::uploads::UploadStore;
use crate::llm_client::TextGenerator;
use crate::normalizer::RetryPolicy;
use crate::store::{ChatStore, RecordStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Model behind every assessment. Default: `LlmClient`.
    pub llm: Arc<dyn TextGenerator>,
    pub store: Arc<dyn RecordStore>,
    /// Coaching conversations. Default: `PgChatStore`.
    pub chats: Arc<dyn ChatStore>,
    /// Originals of uploaded essays. Default: `S3UploadStore`.
    pub uploads: Arc<dyn UploadStore>,
    /// Applied to every normalization; built from `NORMALIZE_*` settings.
    pub retry_policy: RetryPolicy,
}
