//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type every handler returns
//! - The session guard in front of the admin area
//! - The workspace extractor used by admin handlers

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::models::AdminUser;
use crate::remote::{RemoteStore, StoreError};
use crate::services::{
    AdminWorkspace, AssetError, ContactService, ContentService, FormError, GuardState,
    RedirectSlot, SessionGuard, SyncError, WorkspaceRegistry,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RemoteStore>,
    pub workspaces: Arc<WorkspaceRegistry>,
    pub content: Arc<ContentService>,
    pub contact: Arc<ContactService>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RemoteStore>, contact: ContactService) -> Self {
        let workspaces = WorkspaceRegistry::new(store.clone(), &config);
        let content = ContentService::new(
            store.clone(),
            std::time::Duration::from_secs(config.cache.ttl_seconds),
        );
        Self {
            config: Arc::new(config),
            store,
            workspaces: Arc::new(workspaces),
            content: Arc::new(content),
            contact: Arc::new(contact),
        }
    }
}

/// Signed-in admin attached to guarded requests
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub access_token: String,
    pub user: AdminUser,
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

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unauthorized => Self::unauthorized("Session is no longer valid"),
            StoreError::NotFound { .. } => Self::not_found(e.to_string()),
            e => {
                tracing::error!(error = %e, "Data store request failed");
                Self::internal_error(e.to_string())
            }
        }
    }
}

impl From<AssetError> for ApiError {
    fn from(e: AssetError) -> Self {
        if e.is_rejected_file() {
            Self::validation_error(e.to_string())
        } else {
            Self::internal_error(e.to_string())
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Validation(e) => Self::validation_error(e.to_string()),
            SyncError::Conflict(message) => Self::conflict(message),
            SyncError::NotFound { .. } => Self::not_found(e.to_string()),
            SyncError::Asset(e) => e.into(),
            SyncError::Store {
                source: StoreError::Unauthorized,
                ..
            } => Self::unauthorized("Session is no longer valid"),
            SyncError::Store { .. } => Self::internal_error(e.to_string()),
        }
    }
}

impl From<FormError> for ApiError {
    fn from(e: FormError) -> Self {
        match e {
            FormError::InvalidTransition { .. } => Self::conflict(e.to_string()),
            FormError::Sync(e) => e.into(),
        }
    }
}

/// Extract session token from request headers
///
/// A `Bearer` authorization header wins over the `session` cookie.
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

/// Session guard middleware
///
/// Lets the request through only for a confirmed admin session; everything
/// else is answered with a redirect to the login route.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_session_token(request.headers());
    let guard = SessionGuard::new(state.store.clone(), state.config.server.login_path.clone());
    let slot = RedirectSlot::default();

    match (guard.check_session(token.as_deref(), &slot).await, token) {
        (GuardState::Authenticated(user), Some(access_token)) => {
            request
                .extensions_mut()
                .insert(AdminSession { access_token, user });
            next.run(request).await
        }
        _ => {
            let target = slot
                .take()
                .unwrap_or_else(|| state.config.server.login_path.clone());
            tracing::debug!(path = %request.uri().path(), "Redirecting unauthenticated request");
            Redirect::to(&target).into_response()
        }
    }
}

/// The caller's mounted admin workspace
pub struct Workspace(pub Arc<AdminWorkspace>);

impl FromRequestParts<AppState> for Workspace {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<AdminSession>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        let workspace = state
            .workspaces
            .open(&session.access_token, session.user)
            .await;
        Ok(Self(workspace))
    }
}
