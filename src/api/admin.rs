//! Admin API endpoints
//!
//! Every route here sits behind the session guard and works on the caller's
//! mounted workspace. Blog posts and projects share one generic set of
//! handlers; contact requests only support status changes and deletion.

use axum::{
    extract::{Extension, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::middleware::{AdminSession, ApiError, AppState, Workspace};
use crate::models::{AdminUser, BlogPost, ContactRequest, ContactStatus, Project, Record, RecordId};
use crate::services::{AssetManager, Editable, FormSnapshot, ImageUpload, RecordSynchronizer};

/// Build the admin API router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .nest("/blogs", entity_router::<BlogPost>())
        .nest("/projects", entity_router::<Project>())
        .route("/contacts", get(list_contacts))
        .route("/contacts/{id}", delete(delete_contact))
        .route("/contacts/{id}/status", put(set_contact_status))
}

fn entity_router<E: Editable>() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records::<E>))
        .route("/{id}", delete(delete_record::<E>))
        .route("/form", get(form_snapshot::<E>).put(set_form_buffer::<E>))
        .route("/form/create", post(open_create::<E>))
        .route("/form/edit/{id}", post(open_edit::<E>))
        .route("/form/image", post(attach_image::<E>).delete(clear_image::<E>))
        .route("/form/submit", post(submit_form::<E>))
        .route("/form/cancel", post(cancel_form::<E>))
}

/// Local records plus the last load error, if any
#[derive(Debug, Serialize)]
pub struct RecordList<R> {
    pub records: Vec<R>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Re-fetch from the data store before answering
    #[serde(default)]
    pub reload: bool,
}

#[derive(Debug, Serialize)]
pub struct RecordResponse<R> {
    pub record: R,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: AdminUser,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ContactStatus,
}

async fn list_from<R: Record>(
    sync: &RecordSynchronizer<R>,
    reload: bool,
) -> Json<RecordList<R>> {
    if reload {
        // The failure is kept on the synchronizer and returned below
        let _ = sync.load_all().await;
    }
    Json(RecordList {
        records: sync.records(),
        error: sync.error(),
    })
}

/// GET /admin/api/me
async fn me(Extension(session): Extension<AdminSession>) -> Json<MeResponse> {
    Json(MeResponse { user: session.user })
}

/// GET /admin/api/{entity}
async fn list_records<E: Editable>(
    Workspace(ws): Workspace,
    Query(query): Query<ListQuery>,
) -> Json<RecordList<E>> {
    list_from(E::synchronizer(&ws), query.reload).await
}

/// DELETE /admin/api/{entity}/{id}
async fn delete_record<E: Editable>(
    State(state): State<AppState>,
    Workspace(ws): Workspace,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    E::synchronizer(&ws).delete(&RecordId::new(id)).await?;
    state.content.invalidate().await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/api/{entity}/form
async fn form_snapshot<E: Editable>(Workspace(ws): Workspace) -> Json<FormSnapshot<E::Draft>> {
    Json(E::form(&ws).lock().await.snapshot())
}

/// POST /admin/api/{entity}/form/create
async fn open_create<E: Editable>(
    Workspace(ws): Workspace,
) -> Result<Json<FormSnapshot<E::Draft>>, ApiError> {
    let mut form = E::form(&ws).lock().await;
    form.open_create()?;
    Ok(Json(form.snapshot()))
}

/// POST /admin/api/{entity}/form/edit/{id}
async fn open_edit<E: Editable>(
    Workspace(ws): Workspace,
    Path(id): Path<String>,
) -> Result<Json<FormSnapshot<E::Draft>>, ApiError> {
    let id = RecordId::new(id);
    let record = E::synchronizer(&ws)
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("{} {} not found", E::LABEL, id)))?;

    let mut form = E::form(&ws).lock().await;
    form.open_edit(&record)?;
    Ok(Json(form.snapshot()))
}

/// PUT /admin/api/{entity}/form
async fn set_form_buffer<E: Editable>(
    Workspace(ws): Workspace,
    Json(draft): Json<E::Draft>,
) -> Result<Json<FormSnapshot<E::Draft>>, ApiError> {
    let mut form = E::form(&ws).lock().await;
    form.set_buffer(draft)?;
    Ok(Json(form.snapshot()))
}

/// POST /admin/api/{entity}/form/image
///
/// Accepts one multipart `file` field. The file is checked here and uploaded
/// on submit.
async fn attach_image<E: Editable>(
    State(state): State<AppState>,
    Workspace(ws): Workspace,
    mut multipart: Multipart,
) -> Result<Json<FormSnapshot<E::Draft>>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        upload = Some(ImageUpload {
            filename,
            content_type,
            data: data.to_vec(),
        });
        break;
    }

    let file = upload.ok_or_else(|| ApiError::validation_error("No file provided"))?;
    AssetManager::check(&state.config.upload, &file)?;

    let mut form = E::form(&ws).lock().await;
    form.attach_image(file)?;
    Ok(Json(form.snapshot()))
}

/// DELETE /admin/api/{entity}/form/image
async fn clear_image<E: Editable>(
    Workspace(ws): Workspace,
) -> Result<Json<FormSnapshot<E::Draft>>, ApiError> {
    let mut form = E::form(&ws).lock().await;
    form.clear_image()?;
    Ok(Json(form.snapshot()))
}

/// POST /admin/api/{entity}/form/submit
async fn submit_form<E: Editable>(
    State(state): State<AppState>,
    Workspace(ws): Workspace,
) -> Result<Json<RecordResponse<E>>, ApiError> {
    let record = {
        let mut form = E::form(&ws).lock().await;
        form.submit(E::synchronizer(&ws)).await?
    };
    state.content.invalidate().await;
    Ok(Json(RecordResponse { record }))
}

/// POST /admin/api/{entity}/form/cancel
async fn cancel_form<E: Editable>(Workspace(ws): Workspace) -> Json<FormSnapshot<E::Draft>> {
    let mut form = E::form(&ws).lock().await;
    form.cancel();
    Json(form.snapshot())
}

/// GET /admin/api/contacts
async fn list_contacts(
    Workspace(ws): Workspace,
    Query(query): Query<ListQuery>,
) -> Json<RecordList<ContactRequest>> {
    list_from(&ws.contacts, query.reload).await
}

/// PUT /admin/api/contacts/{id}/status
async fn set_contact_status(
    Workspace(ws): Workspace,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<RecordResponse<ContactRequest>>, ApiError> {
    let record = ws
        .contacts
        .set_status(&RecordId::new(id), update.status)
        .await?;
    Ok(Json(RecordResponse { record }))
}

/// DELETE /admin/api/contacts/{id}
async fn delete_contact(
    Workspace(ws): Workspace,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    ws.contacts.delete(&RecordId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
