//! Authentication API endpoints
//!
//! Handles:
//! - GET {login_path} - Login page, or a redirect to the admin area when signed in
//! - POST {login_path} - Password sign-in, sets the session cookie
//! - POST {admin_path}/logout - Sign out and unmount the workspace

use axum::{
    extract::{Extension, State},
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::middleware::{extract_session_token, AdminSession, ApiError, AppState};
use super::pages::LOGIN_PAGE;
use crate::remote::StoreError;
use crate::services::SessionGuard;

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    /// Where the client should go next
    pub redirect: String,
}

fn session_cookie(token: &str, max_age: i64) -> String {
    format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token, max_age
    )
}

const CLEAR_COOKIE: &str = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";

/// GET {login_path} - Login page
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = extract_session_token(&headers);
    let guard = SessionGuard::new(state.store.clone(), state.config.server.login_path.clone());

    if guard.current_user(token.as_deref()).await.is_some() {
        return Redirect::to(&state.config.server.admin_path).into_response();
    }
    Html(LOGIN_PAGE).into_response()
}

/// POST {login_path} - Sign in with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = input.email.trim();
    if email.is_empty() || input.password.is_empty() {
        return Err(ApiError::validation_error("Email and password are required"));
    }

    let session = state
        .store
        .sign_in(email, &input.password)
        .await
        .map_err(|e| match e {
            StoreError::InvalidCredentials => ApiError::unauthorized("Invalid email or password"),
            e => {
                tracing::error!(error = %e, "Sign-in failed");
                ApiError::internal_error("Sign-in is temporarily unavailable")
            }
        })?;
    tracing::info!(user = %session.user_id, "Admin signed in");

    let max_age = (session.expires_at - Utc::now()).num_seconds().max(0);
    let cookie = HeaderValue::from_str(&session_cookie(&session.access_token, max_age))
        .map_err(|_| ApiError::internal_error("Session token cannot be stored in a cookie"))?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, cookie);

    Ok((
        response_headers,
        Json(LoginResponse {
            user_id: session.user_id,
            expires_at: session.expires_at,
            redirect: state.config.server.admin_path.clone(),
        }),
    ))
}

/// POST {admin_path}/logout - Sign out
///
/// The workspace is unmounted and the cookie cleared even when the data
/// store cannot be reached.
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<AdminSession>,
) -> Response {
    if let Err(e) = state.store.sign_out(&session.access_token).await {
        tracing::warn!(error = %e, "Remote sign-out failed");
    }
    state.workspaces.close(&session.access_token).await;
    tracing::info!(user = %session.user.id, "Admin signed out");

    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, HeaderValue::from_static(CLEAR_COOKIE));
    (response_headers, Redirect::to(&state.config.server.login_path)).into_response()
}
