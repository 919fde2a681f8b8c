use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::user::require_username;
use crate::normalizer::Schema;
use crate::performance::{average_by_type, scores_over_time, ScorePoint, TypeAverage};
use crate::state::AppState;
use crate::store::{RecordFilter, SortOrder, StoredRecord};

#[derive(Deserialize)]
pub struct UsernameQuery {
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PerformanceResponse {
    pub username: String,
    /// Four-lens and legacy suggestion records, newest first.
    pub suggestions: Vec<StoredRecord>,
    pub scores_over_time: Vec<ScorePoint>,
    pub latest_profile: Option<StoredRecord>,
    /// Newest first.
    pub self_tests: Vec<StoredRecord>,
    pub self_test_scores_over_time: Vec<ScorePoint>,
    /// Present once enough self-tests exist.
    pub average_by_type: Option<BTreeMap<String, TypeAverage>>,
}

async fn find_newest_first(
    state: &AppState,
    username: &str,
    kind: Schema,
) -> Result<Vec<StoredRecord>, AppError> {
    let filter = RecordFilter::for_user(username, kind);
    Ok(state.store.find(&filter, SortOrder::NewestFirst).await?)
}

/// GET /api/v1/performance?username=
pub async fn handle_performance(
    State(state): State<AppState>,
    Query(params): Query<UsernameQuery>,
) -> Result<Json<PerformanceResponse>, AppError> {
    let username = require_username(params.username.as_deref())?;

    let mut suggestions = find_newest_first(&state, &username, Schema::FourLens).await?;
    suggestions.extend(find_newest_first(&state, &username, Schema::LegacyTenPoint).await?);
    suggestions.sort_by(|a, b| b.record.metadata.created_at.cmp(&a.record.metadata.created_at));

    let latest_profile = state
        .store
        .latest(&RecordFilter::for_user(&username, Schema::WritingProfile))
        .await?;
    let self_tests = find_newest_first(&state, &username, Schema::SelfTest).await?;

    Ok(Json(PerformanceResponse {
        scores_over_time: scores_over_time(&suggestions),
        self_test_scores_over_time: scores_over_time(&self_tests),
        average_by_type: average_by_type(&self_tests),
        username,
        suggestions,
        latest_profile,
        self_tests,
    }))
}
