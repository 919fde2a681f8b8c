pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::assessment::handlers as assessment;
use crate::chat::handlers as chat;
use crate::content::handlers as content;
use crate::performance::handlers as performance;
use crate::state::AppState;

/// Largest accepted upload (scanned essays can be a few MB).
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Uploads
        .route(
            "/api/v1/uploads",
            post(content::handle_upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // Assessments
        .route("/api/v1/analysis", post(assessment::handle_writing_profile))
        .route(
            "/api/v1/essays/suggestions",
            post(assessment::handle_essay_suggestions),
        )
        .route(
            "/api/v1/essays/legacy-suggestions",
            post(assessment::handle_legacy_suggestions),
        )
        .route("/api/v1/self-tests", post(assessment::handle_self_test))
        .route(
            "/api/v1/evaluations/normalize",
            post(assessment::handle_raw_reply),
        )
        .route(
            "/api/v1/practice-tasks",
            post(assessment::handle_practice_task),
        )
        // Coaching chat
        .route(
            "/api/v1/chat",
            post(chat::handle_chat).get(chat::handle_chat_history),
        )
        // History
        .route(
            "/api/v1/performance",
            get(performance::handle_performance),
        )
        .with_state(state)
}
