//! Record synchronizer
//!
//! Keeps a local, newest-first mirror of one table in step with the data
//! store. Local state only changes after the store confirms a write, and only
//! while the owning workspace is still mounted.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::assets::{AssetError, AssetManager, ImageUpload};
use crate::models::{
    sort_newest_first, ContactRequest, ContactStatus, Draft, Record, RecordId, ValidationError,
};
use crate::remote::{OrderBy, RemoteStore, StoreError};

/// Shared flag telling in-flight operations whether their results still matter
#[derive(Debug, Clone)]
pub struct MountFlag(Arc<AtomicBool>);

impl Default for MountFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl MountFlag {
    /// A flag in the mounted state
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_mounted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn unmount(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What an update does with the record's image
#[derive(Debug, Clone, Copy)]
pub enum ImageChange<'a> {
    /// Keep the draft's reference, or the stored one when the draft has none
    Keep,
    /// Upload this file and point the record at it
    Replace(&'a ImageUpload),
    /// Drop the reference
    Clear,
}

/// Synchronizer errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Conflict(String),

    #[error("{label} {id} not found")]
    NotFound { label: &'static str, id: RecordId },

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Failed to {action} {label}: {source}")]
    Store {
        action: &'static str,
        label: &'static str,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    fn store(action: &'static str, label: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::NotFound { id, .. } => Self::NotFound {
                label,
                id: RecordId::new(id),
            },
            source => Self::Store {
                action,
                label,
                source,
            },
        }
    }
}

/// Fetch a whole table as typed records, newest first
pub(crate) async fn fetch_all<R: Record>(store: &dyn RemoteStore) -> Result<Vec<R>, StoreError> {
    let rows = store.select_all(R::TABLE, OrderBy::newest_first()).await?;
    let mut records = rows
        .into_iter()
        .map(R::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    sort_newest_first(&mut records);
    Ok(records)
}

/// Local mirror of one table
pub struct RecordSynchronizer<R: Record> {
    store: Arc<dyn RemoteStore>,
    assets: Arc<AssetManager>,
    mount: MountFlag,
    records: RwLock<Vec<R>>,
    error: RwLock<Option<String>>,
}

impl<R: Record> RecordSynchronizer<R> {
    pub fn new(store: Arc<dyn RemoteStore>, assets: Arc<AssetManager>, mount: MountFlag) -> Self {
        Self {
            store,
            assets,
            mount,
            records: RwLock::new(Vec::new()),
            error: RwLock::new(None),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<R>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<R>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }

    fn set_error(&self, message: Option<String>) {
        *self.error.write().unwrap_or_else(|e| e.into_inner()) = message;
    }

    /// Snapshot of the local records, newest first
    pub fn records(&self) -> Vec<R> {
        self.read().clone()
    }

    pub fn get(&self, id: &RecordId) -> Option<R> {
        self.read().iter().find(|r| r.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Message from the last failed load, if any
    pub fn error(&self) -> Option<String> {
        self.error.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the mirror with the store's current rows
    ///
    /// On failure the previous records stay in place and a generic message is
    /// kept for display.
    pub async fn load_all(&self) -> Result<usize, SyncError> {
        let records = match fetch_all::<R>(self.store.as_ref()).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(table = R::TABLE, error = %e, "Failed to load records");
                if self.mount.is_mounted() {
                    self.set_error(Some(format!(
                        "Could not load {}s. Please try again later.",
                        R::LABEL
                    )));
                }
                return Err(SyncError::store("load", R::LABEL, e));
            }
        };

        let count = records.len();
        if self.mount.is_mounted() {
            *self.write() = records;
            self.set_error(None);
        }
        tracing::debug!(table = R::TABLE, count, "Records loaded");
        Ok(count)
    }

    /// Create a record, uploading its image first when one is attached
    pub async fn create<D>(&self, mut draft: D, image: Option<&ImageUpload>) -> Result<R, SyncError>
    where
        D: Draft<Target = R>,
    {
        draft.normalize();
        draft.validate()?;
        let conflict = draft.conflict(&self.read(), None);
        if let Some(message) = conflict {
            return Err(SyncError::Conflict(message));
        }

        if let Some(file) = image {
            let url = self.assets.upload(file).await?;
            draft.set_image_url(Some(url));
        }

        let row = self
            .store
            .insert(R::TABLE, draft.to_row())
            .await
            .map_err(|e| SyncError::store("create", R::LABEL, e))?;
        let record = R::from_row(row).map_err(|e| SyncError::store("create", R::LABEL, e.into()))?;

        if self.mount.is_mounted() {
            self.write().insert(0, record.clone());
        } else {
            tracing::debug!(table = R::TABLE, "Workspace unmounted, create result discarded");
        }
        tracing::info!(table = R::TABLE, id = %record.id(), "Record created");
        Ok(record)
    }

    /// Update a record in place
    ///
    /// A replacement image is uploaded before the update is sent. Once the
    /// store accepts the update, the image the record no longer references is
    /// removed best-effort.
    pub async fn update<D>(
        &self,
        id: &RecordId,
        mut draft: D,
        image: ImageChange<'_>,
    ) -> Result<R, SyncError>
    where
        D: Draft<Target = R>,
    {
        let previous = self.get(id).ok_or_else(|| SyncError::NotFound {
            label: R::LABEL,
            id: id.clone(),
        })?;

        draft.normalize();
        match image {
            ImageChange::Clear => draft.set_image_url(None),
            ImageChange::Keep if draft.image_url().is_none() => {
                draft.set_image_url(previous.image_url().map(str::to_string))
            }
            _ => {}
        }
        draft.validate()?;
        let conflict = draft.conflict(&self.read(), Some(id));
        if let Some(message) = conflict {
            return Err(SyncError::Conflict(message));
        }

        if let ImageChange::Replace(file) = image {
            let url = self.assets.upload(file).await?;
            draft.set_image_url(Some(url));
        }

        let record = self.apply_patch(id, draft.to_row(), "update").await?;

        if let Some(old) = previous.image_url() {
            if record.image_url() != Some(old) {
                self.assets.discard(R::ASSETS, old).await;
            }
        }
        Ok(record)
    }

    /// Delete a record and, best-effort beforehand, its image
    pub async fn delete(&self, id: &RecordId) -> Result<(), SyncError> {
        let image = self
            .get(id)
            .and_then(|r| r.image_url().map(str::to_string));
        if let Some(url) = image {
            self.assets.discard(R::ASSETS, &url).await;
        }

        self.store
            .delete(R::TABLE, id)
            .await
            .map_err(|e| SyncError::store("delete", R::LABEL, e))?;

        if self.mount.is_mounted() {
            self.write().retain(|r| r.id() != id);
        }
        tracing::info!(table = R::TABLE, id = %id, "Record deleted");
        Ok(())
    }

    async fn apply_patch(
        &self,
        id: &RecordId,
        patch: Value,
        action: &'static str,
    ) -> Result<R, SyncError> {
        let row = self
            .store
            .update(R::TABLE, id, patch)
            .await
            .map_err(|e| SyncError::store(action, R::LABEL, e))?;
        let record = R::from_row(row).map_err(|e| SyncError::store(action, R::LABEL, e.into()))?;

        if self.mount.is_mounted() {
            if let Some(slot) = self.write().iter_mut().find(|r| r.id() == id) {
                *slot = record.clone();
            }
        }
        tracing::info!(table = R::TABLE, id = %id, action, "Record updated");
        Ok(record)
    }
}

impl RecordSynchronizer<ContactRequest> {
    /// Move a contact request to another status
    pub async fn set_status(
        &self,
        id: &RecordId,
        status: ContactStatus,
    ) -> Result<ContactRequest, SyncError> {
        self.apply_patch(id, json!({ "status": status }), "update status of")
            .await
    }
}
