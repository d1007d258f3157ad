//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/api/v1`:
//! - Auth endpoints (register, login, logout, me)
//! - Content endpoints (owner-facing lifecycle)
//! - Review endpoints (staff moderation queue)
//! - Admin endpoints (audit log, bans, roles)

pub mod admin;
pub mod auth;
pub mod common;
pub mod content;
pub mod middleware;
pub mod review;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Super admin routes
    let super_admin_routes = Router::new()
        .nest("/admin", admin::super_admin_router())
        .route_layer(axum_middleware::from_fn(middleware::require_super_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Staff routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .nest("/review", review::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/content", content::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes; a valid session is still picked up when present
    let public_routes = Router::new()
        .nest("/content", content::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    Router::new()
        .nest("/auth", auth::public_router())
        .merge(public_routes)
        .merge(super_admin_routes)
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let origin = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) if cors_origin != "*" => AllowOrigin::exact(origin),
        _ => {
            tracing::warn!("CORS origin {:?} not usable with credentials, mirroring request origin", cors_origin);
            AllowOrigin::mirror_request()
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{create_test_pool, migrations};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        _dir: TempDir,
    }

    async fn setup() -> TestApp {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().to_path_buf();
        config.storage.default_poster_url = Some("/static/default-poster.jpg".to_string());

        let state = AppState::new(pool, &config);
        TestApp {
            router: build_router(state, "http://localhost:3000"),
            _dir: dir,
        }
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, body)
        }

        async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.send(request).await
        }

        async fn register(&self, username: &str) -> String {
            let (status, body) = self
                .call(
                    "POST",
                    "/api/v1/auth/register",
                    None,
                    Some(json!({
                        "username": username,
                        "email": format!("{}@example.com", username),
                        "password": "secret-password"
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "register {}: {}", username, body);
            body["token"].as_str().unwrap().to_string()
        }

        /// root (super admin), mod (promoted to admin), fan (user)
        async fn staff(&self) -> (String, String, String) {
            let root = self.register("root").await;
            let moderator = self.register("mod").await;
            let fan = self.register("fan").await;
            let (status, _) = self
                .call("PUT", "/api/v1/admin/users/2/role", Some(&root), Some(json!({ "role": "admin" })))
                .await;
            assert_eq!(status, StatusCode::OK);
            (root, moderator, fan)
        }
    }

    fn video_body() -> Value {
        json!({ "title": "Encore", "bvid": "BV1xx411c7mD", "description": "<p>Live</p>" })
    }

    #[tokio::test]
    async fn test_register_and_me() {
        let app = setup().await;
        let root = app.register("root").await;
        let fan = app.register("fan").await;

        let (status, body) = app.call("GET", "/api/v1/auth/me", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "super_admin");

        let (_, body) = app.call("GET", "/api/v1/auth/me", Some(&fan), None).await;
        assert_eq!(body["role"], "user");
        assert!(body.get("password_hash").is_none());

        let (status, body) = app.call("GET", "/api/v1/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_login_logout_and_cookie_auth() {
        let app = setup().await;
        app.register("fan").await;

        let (status, body) = app
            .call(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "username_or_email": "fan@example.com", "password": "secret-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let request = Request::builder()
            .uri("/api/v1/auth/me")
            .header("cookie", format!("session={}", token))
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(request).await.0, StatusCode::OK);

        let (status, _) = app.call("POST", "/api/v1/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.call("GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .call(
                "POST",
                "/api/v1/auth/login",
                None,
                Some(json!({ "username_or_email": "fan", "password": "wrong" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_submit_review_publish_flow() {
        let app = setup().await;
        let (_root, moderator, fan) = app.staff().await;

        let (status, created) = app.call("POST", "/api/v1/content/video", Some(&fan), Some(video_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["review_status"], "draft");
        assert_eq!(created["is_published"], false);
        let id = created["id"].as_str().unwrap().to_string();

        // Drafts are private
        let (status, _) = app.call("GET", &format!("/api/v1/content/video/{}", id), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, submitted) = app
            .call("POST", &format!("/api/v1/content/video/{}/submit", id), Some(&fan), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(submitted["review_status"], "pending");

        let (status, queue) = app.call("GET", "/api/v1/review/pending?type=video", Some(&moderator), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(queue["total"], 1);
        assert_eq!(queue["items"][0]["type"], "video");
        assert_eq!(queue["items"][0]["description"], "Live");
        assert_eq!(queue["items"][0]["isPublished"], false);

        let (status, body) = app
            .call("POST", &format!("/api/v1/review/video/{}/approve", id), Some(&fan), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["message"], "Permission denied");

        let (status, approved) = app
            .call("POST", &format!("/api/v1/review/video/{}/approve", id), Some(&moderator), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["review_status"], "approved");
        assert_eq!(approved["reviewer_id"], 2);
        assert_eq!(approved["is_published"], true);

        let (status, body) = app
            .call("POST", &format!("/api/v1/review/video/{}/approve", id), Some(&moderator), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");

        let (status, public) = app.call("GET", &format!("/api/v1/content/video/{}", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(public["title"], "Encore");
        assert_eq!(public["is_published"], true);

        let (_, stats) = app.call("GET", "/api/v1/review/statistics", Some(&moderator), None).await;
        assert_eq!(stats["approved"], 1);
    }

    #[tokio::test]
    async fn test_reject_requires_notes() {
        let app = setup().await;
        let (_root, moderator, fan) = app.staff().await;

        let mut body = video_body();
        body["status"] = json!("pending");
        let (status, created) = app.call("POST", "/api/v1/content/video", Some(&fan), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["review_status"], "pending");
        let uri = format!("/api/v1/review/video/{}/reject", created["id"].as_str().unwrap());

        let (status, body) = app.call("POST", &uri, Some(&moderator), Some(json!({ "review_notes": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = app
            .call("POST", &uri, Some(&moderator), Some(json!({ "review_notes": "Wrong BV id" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["review_status"], "rejected");
        assert_eq!(body["review_notes"], "Wrong BV id");
    }

    #[tokio::test]
    async fn test_unknown_kind_and_bad_ids_are_not_found() {
        let app = setup().await;
        let (_root, moderator, _fan) = app.staff().await;

        for uri in [
            "/api/v1/content/podcast/1",
            "/api/v1/content/schedule/not-a-number",
            "/api/v1/content/video/missing",
        ] {
            let (status, _) = app.call("GET", uri, Some(&moderator), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        }
        let (status, _) = app
            .call("POST", "/api/v1/review/podcast/1/approve", Some(&moderator), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .call("POST", "/api/v1/review/schedule/abc/approve", Some(&moderator), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_schedule_poster_published_on_approve() {
        let app = setup().await;
        let (_root, moderator, fan) = app.staff().await;

        let schedule = json!({ "category": "演唱会", "date": "2025-05-20", "theme": "巡演", "city": "上海" });
        let (status, _) = app.call("POST", "/api/v1/content/schedule", Some(&fan), Some(schedule.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) = app.call("POST", "/api/v1/content/schedule", Some(&moderator), Some(schedule)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_i64().unwrap();

        let boundary = "fanpress-boundary";
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"poster.png\"\r\n\
             Content-Type: image/png\r\n\r\nPNGDATA\r\n--{b}--\r\n",
            b = boundary
        );
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/v1/content/schedule/{}/poster", id))
            .header("authorization", format!("Bearer {}", moderator))
            .header("content-type", format!("multipart/form-data; boundary={}", boundary))
            .body(Body::from(payload))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body["image"].is_null());
        assert!(body.get("pending_poster").is_none());

        let (status, _) = app
            .call("POST", &format!("/api/v1/content/schedule/{}/submit", id), Some(&moderator), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, approved) = app
            .call("POST", &format!("/api/v1/review/schedule/{}/approve", id), Some(&moderator), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let image = approved["image"].as_str().unwrap();
        assert!(image.starts_with("/uploads/schedules/演唱会/2025-05-20-巡演/schedule-"));
        assert!(image.ends_with(".png"));
        assert_eq!(approved["is_published"], true);
    }

    #[tokio::test]
    async fn test_admin_logs_and_bans() {
        let app = setup().await;
        let (root, moderator, fan) = app.staff().await;

        let (status, _) = app.call("GET", "/api/v1/admin/logs", Some(&fan), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call("PUT", "/api/v1/admin/users/3/role", Some(&moderator), Some(json!({ "role": "admin" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, banned) = app
            .call("POST", "/api/v1/admin/users/3/ban", Some(&moderator), Some(json!({ "reason": "spam" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(banned["status"], "banned");

        // Banning revoked the session
        let (status, _) = app.call("GET", "/api/v1/auth/me", Some(&fan), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.call("POST", "/api/v1/admin/users/1/ban", Some(&moderator), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, logs) = app.call("GET", "/api/v1/admin/logs?action=ban", Some(&root), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(logs["total"], 1);
        assert_eq!(logs["items"][0]["resource_id"], "3");

        let (status, _) = app.call("GET", "/api/v1/admin/logs?action=explode", Some(&root), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, unbanned) = app.call("POST", "/api/v1/admin/users/3/unban", Some(&moderator), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(unbanned["status"], "active");
    }

    #[tokio::test]
    async fn test_audit_ip_from_forwarded_header() {
        let app = setup().await;
        let (root, _moderator, fan) = app.staff().await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/content/video")
            .header("authorization", format!("Bearer {}", fan))
            .header("content-type", "application/json")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::from(video_body().to_string()))
            .unwrap();
        assert_eq!(app.send(request).await.0, StatusCode::CREATED);

        let (_, logs) = app.call("GET", "/api/v1/admin/logs?action=create", Some(&root), None).await;
        assert_eq!(logs["items"][0]["ip_address"], "203.0.113.7");
    }
}
