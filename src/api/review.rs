//! Review API endpoints
//!
//! Staff moderation queue:
//! - GET /api/v1/review/pending - Items awaiting review (filterable)
//! - GET /api/v1/review/statistics - Counts by kind and status
//! - GET /api/v1/review/{kind}/{id} - One item in review shape
//! - POST /api/v1/review/{kind}/{id}/approve
//! - POST /api/v1/review/{kind}/{id}/reject

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page, list_params, parse_filter, parse_target};
use crate::api::middleware::{client_ip, ApiError, AppState, AuthenticatedUser};
use crate::models::{Content, ContentFilter, PagedResult, ReviewStatistics, ReviewStatus};
use crate::services::{ReviewDecision, ReviewItem};

/// Query for GET /review/pending
#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Defaults to `pending`
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Body for approve and reject
#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    pub review_notes: Option<String>,
}

/// Build the review router; callers layer admin auth on top
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pending", get(list_queue))
        .route("/statistics", get(statistics))
        .route("/{kind}/{id}", get(detail))
        .route("/{kind}/{id}/approve", post(approve))
        .route("/{kind}/{id}/reject", post(reject))
}

/// Approve may be sent without a body
fn parse_review_body(body: &Bytes) -> Result<ReviewRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReviewRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::validation_error(format!("Invalid review body: {}", e)))
}

/// GET /api/v1/review/pending
async fn list_queue(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<QueueQuery>,
) -> Result<Json<PagedResult<ReviewItem>>, ApiError> {
    let filter = ContentFilter {
        kind: parse_filter("type", query.kind.as_deref())?,
        status: Some(parse_filter("status", query.status.as_deref())?.unwrap_or(ReviewStatus::Pending)),
        owner_id: None,
    };
    let params = list_params(query.page, query.per_page);

    let result = state
        .review_coordinator
        .list(&user.actor(), &filter, &params)
        .await?;
    Ok(Json(result))
}

/// GET /api/v1/review/statistics
async fn statistics(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ReviewStatistics>, ApiError> {
    Ok(Json(state.review_coordinator.statistics(&user.actor()).await?))
}

/// GET /api/v1/review/{kind}/{id}
async fn detail(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<ReviewItem>, ApiError> {
    let (kind, id) = parse_target(&kind, &id)?;
    Ok(Json(state.review_coordinator.detail(&user.actor(), kind, &id).await?))
}

async fn decide(
    state: AppState,
    user: AuthenticatedUser,
    headers: HeaderMap,
    kind: String,
    id: String,
    body: Bytes,
    decision: ReviewDecision,
) -> Result<Json<Content>, ApiError> {
    let (kind, id) = parse_target(&kind, &id)?;
    let request = parse_review_body(&body)?;

    let content = state
        .review_coordinator
        .review(
            kind,
            &id,
            decision,
            &user.actor(),
            request.review_notes.as_deref(),
            client_ip(&headers),
        )
        .await?;
    Ok(Json(content))
}

/// POST /api/v1/review/{kind}/{id}/approve
async fn approve(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Content>, ApiError> {
    decide(state, user, headers, kind, id, body, ReviewDecision::Approve).await
}

/// POST /api/v1/review/{kind}/{id}/reject
///
/// `review_notes` is required.
async fn reject(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Content>, ApiError> {
    decide(state, user, headers, kind, id, body, ReviewDecision::Reject).await
}
