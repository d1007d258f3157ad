//! Content API endpoints
//!
//! Owner-facing operations shared by every content kind:
//! - GET /api/v1/content/{kind}/{id} - Read one item (optional auth)
//! - GET /api/v1/content/mine - The caller's own items
//! - POST /api/v1/content/{kind} - Create
//! - PUT /api/v1/content/{kind}/{id} - Update
//! - DELETE /api/v1/content/{kind}/{id} - Soft delete
//! - POST /api/v1/content/{kind}/{id}/submit - Send to review
//! - POST /api/v1/content/schedule/{id}/poster - Deferred poster upload

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::api::common::{default_page, default_per_page, list_params, parse_filter, parse_kind, parse_target};
use crate::api::middleware::{client_ip, ApiError, AppState, AuthenticatedUser};
use crate::models::{Content, ContentId, ContentInput, ContentKind, PagedResult, ReviewStatus};

/// Query for GET /content/mine
#[derive(Debug, Deserialize)]
pub struct MineQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Routes readable without a session
pub fn public_router() -> Router<AppState> {
    Router::new().route("/{kind}/{id}", get(get_content))
}

/// Routes that need an authenticated caller
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/mine", get(list_mine))
        .route("/{kind}", post(create_content))
        .route("/{kind}/{id}", put(update_content).delete(delete_content))
        .route("/{kind}/{id}/submit", post(submit_content))
        .route("/{kind}/{id}/poster", post(upload_poster))
}

/// Split the optional `status` key off a create body
fn take_requested_status(body: &mut Value) -> Result<Option<ReviewStatus>, ApiError> {
    let Some(raw) = body.as_object_mut().and_then(|o| o.remove("status")) else {
        return Ok(None);
    };
    match raw {
        Value::Null => Ok(None),
        Value::String(s) => parse_filter("status", Some(&s)),
        other => Err(ApiError::validation_error(format!("Invalid status: {}", other))),
    }
}

fn parse_input(kind: ContentKind, body: Value) -> Result<ContentInput, ApiError> {
    ContentInput::from_json(kind, body)
        .map_err(|e| ApiError::validation_error(format!("Invalid {} body: {}", kind, e)))
}

/// GET /api/v1/content/{kind}/{id}
async fn get_content(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Content>, ApiError> {
    let (kind, id) = parse_target(&kind, &id)?;
    let actor = user.map(|u| u.actor());
    let content = state.content_service.get(kind, &id, actor.as_ref()).await?;
    Ok(Json(content))
}

/// GET /api/v1/content/mine
async fn list_mine(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<MineQuery>,
) -> Result<Json<PagedResult<Content>>, ApiError> {
    let kind = parse_filter("type", query.kind.as_deref())?;
    let status = parse_filter("status", query.status.as_deref())?;
    let params = list_params(query.page, query.per_page);

    let result = state
        .content_service
        .list_mine(&user.actor(), kind, status, &params)
        .await?;
    Ok(Json(result))
}

/// POST /api/v1/content/{kind}
///
/// The body is the kind's field set plus an optional `status`
/// (`draft` or `pending`).
async fn create_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(kind): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_kind(&kind)?;
    let requested = take_requested_status(&mut body)?;
    let input = parse_input(kind, body)?;

    let content = state
        .content_service
        .create(input, &user.actor(), requested, client_ip(&headers))
        .await?;
    Ok((StatusCode::CREATED, Json(content)))
}

/// PUT /api/v1/content/{kind}/{id}
async fn update_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Content>, ApiError> {
    let (kind, id) = parse_target(&kind, &id)?;
    let input = parse_input(kind, body)?;

    let content = state
        .content_service
        .update(kind, &id, input, &user.actor(), client_ip(&headers))
        .await?;
    Ok(Json(content))
}

/// DELETE /api/v1/content/{kind}/{id}
async fn delete_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let (kind, id) = parse_target(&kind, &id)?;
    state
        .content_service
        .delete(kind, &id, &user.actor(), client_ip(&headers))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/content/{kind}/{id}/submit
async fn submit_content(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Content>, ApiError> {
    let (kind, id) = parse_target(&kind, &id)?;
    let content = state
        .content_service
        .submit(kind, &id, &user.actor(), client_ip(&headers))
        .await?;
    Ok(Json(content))
}

/// POST /api/v1/content/schedule/{id}/poster
///
/// Accepts multipart/form-data with a single file field named "file".
async fn upload_poster(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path((kind, id)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<Content>, ApiError> {
    let (kind, id) = parse_target(&kind, &id)?;
    let (ContentKind::Schedule, ContentId::Int(schedule_id)) = (kind, id) else {
        return Err(ApiError::not_found("Only schedules take a poster"));
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        let content = state
            .content_service
            .attach_deferred_poster(schedule_id, &data, &content_type, &user.actor(), client_ip(&headers))
            .await?;
        return Ok(Json(content));
    }

    Err(ApiError::validation_error("No file provided"))
}
