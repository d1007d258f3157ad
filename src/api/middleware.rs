//! API middleware
//!
//! Contains middleware for:
//! - Authentication (session token validation)
//! - Authorization (role gates for staff routes)
//!
//! Also home to the shared [`AppState`], the JSON error body and the
//! mapping from service errors onto it.

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::repositories::{
    SqlxAdminLogRepository, SqlxContentRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Actor, Role, User};
use crate::services::{
    has_permission, AuditLogger, ContentService, LocalObjectStorage, ModerationError,
    PermissionPolicy, ReviewCoordinator, SchedulePosterPublisher, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub content_service: Arc<ContentService>,
    pub review_coordinator: Arc<ReviewCoordinator>,
    pub audit: Arc<AuditLogger>,
    /// Lifetime of the session cookie
    pub session_days: i64,
}

impl AppState {
    /// Wire every service against `pool` using `config`
    pub fn new(pool: DynDatabasePool, config: &Config) -> Self {
        let policy = PermissionPolicy::from_config(&config.moderation);
        let storage = LocalObjectStorage::from_config(&config.storage).boxed();

        let audit = Arc::new(AuditLogger::new(
            pool.clone(),
            SqlxAdminLogRepository::boxed(pool.clone()),
        ));
        let user_service = UserService::new(
            pool.clone(),
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            audit.clone(),
        )
        .with_session_expiration(config.auth.session_expiration_days)
        .with_policy(policy.clone());

        let content_repo = SqlxContentRepository::boxed(pool.clone());
        let content_service = ContentService::new(
            content_repo.clone(),
            storage.clone(),
            policy.clone(),
            config.storage.clone(),
        );
        let poster = SchedulePosterPublisher::new(storage, config.storage.default_poster_url.clone());
        let review_coordinator = ReviewCoordinator::new(content_repo, policy)
            .with_side_effect(Arc::new(poster))
            .with_publish_timeout(Duration::from_secs(config.storage.publish_timeout_secs));

        Self {
            pool,
            user_service: Arc::new(user_service),
            content_service: Arc::new(content_service),
            review_coordinator: Arc::new(review_coordinator),
            audit,
            session_days: config.auth.session_expiration_days,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn actor(&self) -> Actor {
        self.0.actor()
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "INVALID_TRANSITION" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "USER_BANNED" => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<ModerationError> for ApiError {
    fn from(e: ModerationError) -> Self {
        match e {
            ModerationError::NotFound { .. } => ApiError::not_found(e.to_string()),
            // Never say which rule failed
            ModerationError::Forbidden => ApiError::forbidden("Permission denied"),
            ModerationError::InvalidTransition { .. } => ApiError::new("INVALID_TRANSITION", e.to_string()),
            ModerationError::ValidationError(msg) => ApiError::validation_error(msg),
            ModerationError::SideEffectFailure(msg) => {
                tracing::error!("Publish side effect failed: {}", msg);
                ApiError::new("SIDE_EFFECT_FAILURE", "Publishing failed, the item was left unchanged")
            }
            ModerationError::InternalError(err) => {
                tracing::error!("Internal error: {:#}", err);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::Banned => ApiError::new("USER_BANNED", "Account is banned"),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => {
                ApiError::with_details("CONFLICT", msg, serde_json::json!({}))
            }
            UserServiceError::Forbidden => ApiError::forbidden("Permission denied"),
            UserServiceError::NotFound(id) => ApiError::not_found(format!("User not found: {}", id)),
            UserServiceError::InternalError(err) => {
                tracing::error!("Internal error: {:#}", err);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

/// Session token from `Authorization: Bearer` or the `session` cookie.
/// The bearer header wins when both are present.
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Client address recorded in audit entries: the first hop of
/// `X-Forwarded-For`, else `X-Real-IP`
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        if let Ok(Some(user)) = state.user_service.validate_session(&token).await {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
    }
    next.run(request).await
}

fn require_role(request: &Request, required: Role) -> Result<(), ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !has_permission(user.0.role, required) {
        return Err(ApiError::forbidden("Permission denied"));
    }
    Ok(())
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&request, Role::Admin)?;
    Ok(next.run(request).await)
}

/// Super admin authorization middleware
pub async fn require_super_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    require_role(&request, Role::SuperAdmin)?;
    Ok(next.run(request).await)
}
