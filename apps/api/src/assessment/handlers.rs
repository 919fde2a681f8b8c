//! Axum route handlers for the assessment API.

use axum::{extract::State, Json};

use crate::assessment::practice::{generate_practice_task, PracticeTask, PracticeTaskRequest};
use crate::assessment::service::{
    run_essay_suggestions, run_legacy_suggestions, run_raw_reply, run_self_test,
    run_writing_profile, AssessmentOutcome, RawReplyRequest, SelfTestRequest, SuggestionRequest,
    WritingProfileRequest,
};
use crate::errors::AppError;
use crate::models::user::validate_username;
use crate::state::AppState;

/// POST /api/v1/analysis
///
/// Builds a writing profile from one or more essays.
pub async fn handle_writing_profile(
    State(state): State<AppState>,
    Json(request): Json<WritingProfileRequest>,
) -> Result<Json<AssessmentOutcome>, AppError> {
    let username = validate_username(request.username.as_deref())?;
    let outcome = run_writing_profile(&state, username, &request.essays).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/essays/suggestions
pub async fn handle_essay_suggestions(
    State(state): State<AppState>,
    Json(request): Json<SuggestionRequest>,
) -> Result<Json<AssessmentOutcome>, AppError> {
    let username = validate_username(request.username.as_deref())?;
    let outcome = run_essay_suggestions(&state, username, &request.essay).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/essays/legacy-suggestions
///
/// Seven-lens 0-10 scoring kept for students with older history.
pub async fn handle_legacy_suggestions(
    State(state): State<AppState>,
    Json(request): Json<SuggestionRequest>,
) -> Result<Json<AssessmentOutcome>, AppError> {
    let username = validate_username(request.username.as_deref())?;
    let outcome = run_legacy_suggestions(&state, username, &request.essay).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/self-tests
pub async fn handle_self_test(
    State(state): State<AppState>,
    Json(request): Json<SelfTestRequest>,
) -> Result<Json<AssessmentOutcome>, AppError> {
    let username = validate_username(request.username.as_deref())?;
    let outcome = run_self_test(
        &state,
        username,
        request.part,
        request.essay_type.as_deref(),
        &request.essay,
    )
    .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/evaluations/normalize
///
/// Re-runs normalization on a reply the caller already has, such as the
/// `raw_text` returned with a parse error. Single attempt, no model call.
pub async fn handle_raw_reply(
    State(state): State<AppState>,
    Json(request): Json<RawReplyRequest>,
) -> Result<Json<AssessmentOutcome>, AppError> {
    let username = validate_username(request.username.as_deref())?;
    let outcome = run_raw_reply(&state, username, &request).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/practice-tasks
pub async fn handle_practice_task(
    State(state): State<AppState>,
    Json(request): Json<PracticeTaskRequest>,
) -> Result<Json<PracticeTask>, AppError> {
    let task = generate_practice_task(&state, request.part, request.essay_type.as_deref()).await?;
    Ok(Json(task))
}
