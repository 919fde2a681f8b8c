use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::chat::{chat_history, run_chat, ChatHistory, ChatReply, ChatRequest};
use crate::errors::AppError;
use crate::models::user::{require_username, validate_username};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub username: Option<String>,
}

/// POST /api/v1/chat
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    let username = validate_username(request.username.as_deref())?;
    let reply = run_chat(&state, username, &request).await?;
    Ok(Json(reply))
}

/// GET /api/v1/chat?username=
pub async fn handle_chat_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ChatHistory>, AppError> {
    let username = require_username(params.username.as_deref())?;
    Ok(Json(chat_history(&state, username).await?))
}
