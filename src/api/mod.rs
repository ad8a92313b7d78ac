//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP endpoints:
//! - Public content and contact endpoints under /api/v1
//! - The login route
//! - The admin shell and admin API, behind the session guard

pub mod admin;
pub mod auth;
pub mod contact;
pub mod content;
pub mod middleware;
pub mod pages;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{AdminSession, ApiError, AppState, Workspace};

/// Multipart framing allowance on top of the configured file size
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the public API router
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(content::health))
        .route("/blogs", get(content::list_blogs))
        .route("/blogs/{slug}", get(content::get_blog))
        .route("/projects", get(content::list_projects))
        .route("/contact", post(contact::submit_contact))
}

/// Build the guarded admin router
pub fn build_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(pages::admin_shell))
        .route("/logout", post(auth::logout))
        .nest("/api", admin::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_session,
        ))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let server = &state.config.server;
    let origin = HeaderValue::from_str(&server.cors_origin).unwrap_or_else(|_| {
        tracing::warn!(
            origin = %server.cors_origin,
            "Invalid CORS origin, falling back to localhost"
        );
        HeaderValue::from_static("http://localhost:8080")
    });
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    let body_limit = state.config.upload.max_file_size as usize + MULTIPART_OVERHEAD;
    let login_path = server.login_path.clone();
    let admin_path = server.admin_path.clone();

    Router::new()
        .nest("/api/v1", build_api_router())
        .route(&login_path, get(auth::login_page).post(auth::login))
        .nest(&admin_path, build_admin_router(state.clone()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::remote::{MemoryStore, RemoteStore, StoreCall, StoreOp};
    use crate::services::{ContactService, MemoryMailer};
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct Harness {
        server: TestServer,
        store: MemoryStore,
        mailer: Arc<MemoryMailer>,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let mailer = Arc::new(MemoryMailer::default());
        let shared: Arc<dyn RemoteStore> = Arc::new(store.clone());
        let contact = ContactService::new(
            shared.clone(),
            Some(mailer.clone()),
            vec!["office@example.com".to_string()],
        );
        let state = AppState::new(Config::default(), shared, contact);
        let server = TestServer::new(build_router(state)).unwrap();
        Harness {
            server,
            store,
            mailer,
        }
    }

    fn cookie(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("session={}", token)).unwrap()
    }

    fn signed_in(h: &Harness) -> HeaderValue {
        let user_id = h.store.add_user("admin@example.com", "pw");
        cookie(&h.store.issue_session(&user_id).access_token)
    }

    fn location(response: &axum_test::TestResponse) -> Option<String> {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let response = h.server.get("/api/v1/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ok");
    }

    #[tokio::test]
    async fn test_admin_without_session_redirects_to_login() {
        let h = harness();

        for path in ["/admin", "/admin/api/blogs", "/admin/api/me"] {
            let response = h.server.get(path).await;
            assert_eq!(response.status_code(), StatusCode::SEE_OTHER, "{}", path);
            assert_eq!(location(&response).as_deref(), Some("/login"));
        }
        assert_eq!(h.store.count(StoreOp::SelectAll), 0);
    }

    #[tokio::test]
    async fn test_admin_with_rejected_user_redirects() {
        let h = harness();
        let user_id = h.store.add_user("admin@example.com", "pw");
        let session = h.store.issue_session(&user_id);
        h.store.deactivate_user(&user_id);

        let response = h
            .server
            .get("/admin")
            .add_header(header::COOKIE, cookie(&session.access_token))
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_login_page_redirects_when_signed_in() {
        let h = harness();
        let session = signed_in(&h);

        let response = h.server.get("/login").add_header(header::COOKIE, session).await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response).as_deref(), Some("/admin"));

        let response = h.server.get("/login").await;
        response.assert_status_ok();
        assert!(response.text().contains("Admin sign in"));
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_unlocks_admin() {
        let h = harness();
        h.store.add_user("admin@example.com", "pw");

        let response = h
            .server
            .post("/login")
            .json(&json!({"email": "admin@example.com", "password": "pw"}))
            .await;
        response.assert_status_ok();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(set_cookie.contains("HttpOnly"));
        let token = set_cookie
            .trim_start_matches("session=")
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let me = h
            .server
            .get("/admin/api/me")
            .add_header(header::COOKIE, cookie(&token))
            .await;
        me.assert_status_ok();
        assert_eq!(me.json::<Value>()["user"]["email"], "admin@example.com");
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let h = harness();
        h.store.add_user("admin@example.com", "pw");

        let response = h
            .server
            .post("/login")
            .json(&json!({"email": "admin@example.com", "password": "nope"}))
            .await;
        assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_blog_form_flow() {
        let h = harness();
        let session = signed_in(&h);

        h.server
            .post("/admin/api/blogs/form/create")
            .add_header(header::COOKIE, session.clone())
            .await
            .assert_status_ok();
        h.server
            .put("/admin/api/blogs/form")
            .add_header(header::COOKIE, session.clone())
            .json(&json!({"title": "Launch", "slug": "launch", "content": "<p>hi</p>"}))
            .await
            .assert_status_ok();
        let submitted = h
            .server
            .post("/admin/api/blogs/form/submit")
            .add_header(header::COOKIE, session.clone())
            .await;
        submitted.assert_status_ok();

        let list = h
            .server
            .get("/admin/api/blogs")
            .add_header(header::COOKIE, session.clone())
            .await
            .json::<Value>();
        assert_eq!(list["records"][0]["title"], "Launch");
        assert_eq!(list["records"][0]["slug"], "launch");
        assert_eq!(list["records"][0]["image_url"], Value::Null);

        let public = h.server.get("/api/v1/blogs/launch").await;
        public.assert_status_ok();
        assert_eq!(public.json::<Value>()["post"]["title"], "Launch");
    }

    #[tokio::test]
    async fn test_submit_validation_error_keeps_form_open() {
        let h = harness();
        let session = signed_in(&h);

        h.server
            .post("/admin/api/projects/form/create")
            .add_header(header::COOKIE, session.clone())
            .await
            .assert_status_ok();
        let response = h
            .server
            .post("/admin/api/projects/form/submit")
            .add_header(header::COOKIE, session.clone())
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

        let form = h
            .server
            .get("/admin/api/projects/form")
            .add_header(header::COOKIE, session)
            .await
            .json::<Value>();
        assert_eq!(form["state"]["mode"], "creating");
        assert_eq!(form["error"], "Title is required");
    }

    #[tokio::test]
    async fn test_open_twice_conflicts() {
        let h = harness();
        let session = signed_in(&h);

        for expected in [StatusCode::OK, StatusCode::CONFLICT] {
            let response = h
                .server
                .post("/admin/api/blogs/form/create")
                .add_header(header::COOKIE, session.clone())
                .await;
            assert_eq!(response.status_code(), expected);
        }
    }

    #[tokio::test]
    async fn test_image_attach_and_submit_uploads_first() {
        let h = harness();
        let session = signed_in(&h);

        h.server
            .post("/admin/api/projects/form/create")
            .add_header(header::COOKIE, session.clone())
            .await
            .assert_status_ok();
        h.server
            .put("/admin/api/projects/form")
            .add_header(header::COOKIE, session.clone())
            .json(&json!({"title": "Footbridge", "location": "Hull"}))
            .await
            .assert_status_ok();
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(vec![1u8, 2, 3]).file_name("bridge.png").mime_type("image/png"),
        );
        h.server
            .post("/admin/api/projects/form/image")
            .add_header(header::COOKIE, session.clone())
            .multipart(form)
            .await
            .assert_status_ok();
        h.store.clear_calls();

        let submitted = h
            .server
            .post("/admin/api/projects/form/submit")
            .add_header(header::COOKIE, session)
            .await;
        submitted.assert_status_ok();

        let ops: Vec<StoreOp> = h
            .store
            .calls()
            .iter()
            .map(StoreCall::op)
            .filter(|op| !matches!(op, StoreOp::GetSession | StoreOp::GetUser))
            .collect();
        assert_eq!(ops, vec![StoreOp::Upload, StoreOp::Insert]);
        let url = submitted.json::<Value>()["record"]["image_url"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(url.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_image_with_disallowed_type_is_rejected() {
        let h = harness();
        let session = signed_in(&h);

        h.server
            .post("/admin/api/blogs/form/create")
            .add_header(header::COOKIE, session.clone())
            .await
            .assert_status_ok();
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"%PDF".to_vec()).file_name("a.pdf").mime_type("application/pdf"),
        );
        let response = h
            .server
            .post("/admin/api/blogs/form/image")
            .add_header(header::COOKIE, session)
            .multipart(form)
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_project_with_external_image() {
        let h = harness();
        h.store.seed(
            "projects",
            vec![json!({
                "id": "p1",
                "title": "Footbridge",
                "location": "Hull",
                "image_url": "https://images.unsplash.com/photo-1.jpg",
                "created_at": "2024-01-01T00:00:00Z",
            })],
        );
        let session = signed_in(&h);

        let response = h
            .server
            .delete("/admin/api/projects/p1")
            .add_header(header::COOKIE, session.clone())
            .await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
        assert_eq!(h.store.count(StoreOp::Remove), 0);

        let list = h
            .server
            .get("/admin/api/projects")
            .add_header(header::COOKIE, session)
            .await
            .json::<Value>();
        assert_eq!(list["records"], json!([]));
    }

    #[tokio::test]
    async fn test_contact_submission_and_status_change() {
        let h = harness();

        let response = h
            .server
            .post("/api/v1/contact")
            .json(&json!({
                "name": "Ada",
                "email": "ada@example.com",
                "service": "Structural survey",
                "message": "Cracks above the lintel",
                "terms_accepted": true,
            }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["success"], true);
        assert_eq!(h.mailer.sent().len(), 1);

        let session = signed_in(&h);
        let list = h
            .server
            .get("/admin/api/contacts")
            .add_header(header::COOKIE, session.clone())
            .await
            .json::<Value>();
        let id = list["records"][0]["id"].as_str().unwrap().to_string();
        assert_eq!(list["records"][0]["status"], "pending");

        let updated = h
            .server
            .put(&format!("/admin/api/contacts/{}/status", id))
            .add_header(header::COOKIE, session)
            .json(&json!({"status": "responded"}))
            .await;
        updated.assert_status_ok();
        assert_eq!(updated.json::<Value>()["record"]["status"], "responded");
    }

    #[tokio::test]
    async fn test_contact_without_terms_is_rejected() {
        let h = harness();

        let response = h
            .server
            .post("/api/v1/contact")
            .json(&json!({
                "name": "Ada",
                "email": "ada@example.com",
                "service": "Survey",
                "message": "Hello",
                "terms_accepted": false,
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["success"], false);
        assert_eq!(h.store.count(StoreOp::Insert), 0);
    }

    #[tokio::test]
    async fn test_contact_with_unmailable_email_is_a_bad_request() {
        let h = harness();

        let response = h
            .server
            .post("/api/v1/contact")
            .json(&json!({
                "name": "Ada",
                "email": "ada lovelace@example.com",
                "service": "Survey",
                "message": "Hello",
                "terms_accepted": true,
            }))
            .await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["message"],
            "Please enter a valid email address"
        );
        assert!(h.store.rows("contact_requests").is_empty());
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_logout_unmounts_and_clears_cookie() {
        let h = harness();
        let session = signed_in(&h);
        h.server
            .get("/admin/api/blogs")
            .add_header(header::COOKIE, session.clone())
            .await
            .assert_status_ok();

        let response = h
            .server
            .post("/admin/logout")
            .add_header(header::COOKIE, session.clone())
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response).as_deref(), Some("/login"));
        assert!(response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|c| c.contains("Max-Age=0")));

        let after = h.server.get("/admin").add_header(header::COOKIE, session).await;
        assert_eq!(after.status_code(), StatusCode::SEE_OTHER);
    }
}
