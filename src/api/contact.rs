//! Contact form endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::instrument;

use super::middleware::AppState;
use crate::models::NewContactRequest;
use crate::services::ContactError;

/// Response for form submission.
#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Submit a contact request.
///
/// POST /api/v1/contact
///
/// Stores the request and emails the office. Each failure cause is
/// reported with its own message.
#[instrument(skip(state, form), fields(service = %form.service))]
pub async fn submit_contact(
    State(state): State<AppState>,
    Json(form): Json<NewContactRequest>,
) -> impl IntoResponse {
    match state.contact.submit(form).await {
        Ok(request) => {
            tracing::info!(id = %request.id, "Contact request accepted");
            (
                StatusCode::OK,
                Json(ContactResponse {
                    success: true,
                    message: Some("Thank you, we will be in touch shortly.".to_string()),
                }),
            )
        }
        Err(ContactError::Validation(e)) => (
            StatusCode::BAD_REQUEST,
            Json(ContactResponse {
                success: false,
                message: Some(e.to_string()),
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Contact request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ContactResponse {
                    success: false,
                    message: Some(e.to_string()),
                }),
            )
        }
    }
}
