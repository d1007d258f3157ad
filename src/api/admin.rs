//! Admin API endpoints
//!
//! Handles HTTP requests for account management and the audit trail:
//! - GET /api/v1/admin/logs - Browse the audit log (admin+)
//! - GET /api/v1/admin/users - List accounts (admin+)
//! - POST /api/v1/admin/users/{id}/ban, /unban - Ban management (admin+)
//! - PUT /api/v1/admin/users/{id}/role - Role changes (super admin)

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::auth::UserResponse;
use crate::api::common::{default_page, default_per_page, list_params, parse_filter};
use crate::api::middleware::{client_ip, ApiError, AppState, AuthenticatedUser};
use crate::models::{AdminLogEntry, AdminLogFilter, PagedResult, Role};

/// Query for GET /admin/logs
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub operator_id: Option<i64>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Request for PUT /admin/users/{id}/role
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

/// Request for POST /admin/users/{id}/ban
#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub reason: Option<String>,
}

/// Routes open to admins and above
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/logs", get(list_logs))
        .route("/users", get(list_users))
        .route("/users/{id}/ban", post(ban_user))
        .route("/users/{id}/unban", post(unban_user))
}

/// Routes reserved for super admins
pub fn super_admin_router() -> Router<AppState> {
    Router::new().route("/users/{id}/role", put(change_role))
}

/// GET /api/v1/admin/logs
async fn list_logs(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<LogQuery>,
) -> Result<Json<PagedResult<AdminLogEntry>>, ApiError> {
    let filter = AdminLogFilter {
        action: parse_filter("action", query.action.as_deref())?,
        resource_type: parse_filter("resource_type", query.resource_type.as_deref())?,
        operator_id: query.operator_id,
        ..Default::default()
    };
    let params = list_params(query.page, query.per_page);

    let logs = state.audit.list(&filter, &params).await.map_err(|e| {
        tracing::error!("Failed to list admin logs: {:#}", e);
        ApiError::internal_error("Failed to list admin logs")
    })?;
    Ok(Json(logs))
}

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<UserResponse>>, ApiError> {
    let params = list_params(query.page, query.per_page);
    let users = state.user_service.list_users(&user.actor(), &params).await?;
    Ok(Json(users.map(UserResponse::from)))
}

/// PUT /api/v1/admin/users/{id}/role
async fn change_role(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state
        .user_service
        .change_role(&user.actor(), id, body.role, client_ip(&headers))
        .await?;
    Ok(Json(updated.into()))
}

/// POST /api/v1/admin/users/{id}/ban
///
/// Revokes every session of the target.
async fn ban_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<UserResponse>, ApiError> {
    let reason = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        serde_json::from_slice::<BanRequest>(&body)
            .map_err(|e| ApiError::validation_error(format!("Invalid ban body: {}", e)))?
            .reason
    };
    let updated = state
        .user_service
        .set_banned(&user.actor(), id, true, reason, client_ip(&headers))
        .await?;
    Ok(Json(updated.into()))
}

/// POST /api/v1/admin/users/{id}/unban
async fn unban_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state
        .user_service
        .set_banned(&user.actor(), id, false, None, client_ip(&headers))
        .await?;
    Ok(Json(updated.into()))
}
