//! Form controller for creating and editing records
//!
//! One controller per entity. States are `Closed`, `Creating` and
//! `Editing(id)`; a form opens only from `Closed`, and `cancel` returns to
//! `Closed` from anywhere.

use serde::Serialize;

use super::assets::ImageUpload;
use super::synchronizer::{ImageChange, RecordSynchronizer, SyncError};
use crate::models::{Draft, Record, RecordId};

/// Form state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "id", rename_all = "lowercase")]
pub enum FormState {
    Closed,
    Creating,
    Editing(RecordId),
}

impl FormState {
    fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Creating => "creating",
            Self::Editing(_) => "editing",
        }
    }
}

/// Form errors
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("Cannot {action} while the form is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// What the form currently shows
#[derive(Debug, Clone, Serialize)]
pub struct FormSnapshot<D> {
    pub state: FormState,
    pub buffer: D,
    /// Image shown next to the form: the existing reference while editing
    pub image_preview: Option<String>,
    /// Name of a picked file that has not been uploaded yet
    pub pending_image: Option<String>,
    pub error: Option<String>,
}

/// Modal form for one entity type
#[derive(Debug)]
pub struct FormController<D: Draft> {
    state: FormState,
    buffer: D,
    pending_image: Option<ImageUpload>,
    clear_image: bool,
    error: Option<String>,
}

impl<D: Draft> Default for FormController<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Draft> FormController<D> {
    pub fn new() -> Self {
        Self {
            state: FormState::Closed,
            buffer: D::default(),
            pending_image: None,
            clear_image: false,
            error: None,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn buffer(&self) -> &D {
        &self.buffer
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn snapshot(&self) -> FormSnapshot<D> {
        FormSnapshot {
            state: self.state.clone(),
            buffer: self.buffer.clone(),
            image_preview: self.buffer.image_url().map(str::to_string),
            pending_image: self.pending_image.as_ref().map(|f| f.filename.clone()),
            error: self.error.clone(),
        }
    }

    fn require_closed(&self, action: &'static str) -> Result<(), FormError> {
        if self.state != FormState::Closed {
            return Err(FormError::InvalidTransition {
                action,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    fn require_open(&self, action: &'static str) -> Result<(), FormError> {
        if self.state == FormState::Closed {
            return Err(FormError::InvalidTransition {
                action,
                state: self.state.name(),
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.state = FormState::Closed;
        self.buffer = D::default();
        self.pending_image = None;
        self.clear_image = false;
        self.error = None;
    }

    /// `Closed -> Creating` with an empty buffer
    pub fn open_create(&mut self) -> Result<(), FormError> {
        self.require_closed("open a new form")?;
        self.reset();
        self.state = FormState::Creating;
        Ok(())
    }

    /// `Closed -> Editing(id)` with the buffer filled from the record
    pub fn open_edit(&mut self, record: &D::Target) -> Result<(), FormError> {
        self.require_closed("open an edit form")?;
        self.reset();
        self.buffer = D::from_record(record);
        self.state = FormState::Editing(record.id().clone());
        Ok(())
    }

    /// Replace the field values, keeping the shown image unless the new
    /// buffer names one
    pub fn set_buffer(&mut self, mut draft: D) -> Result<(), FormError> {
        self.require_open("edit fields")?;
        if draft.image_url().is_none() && !self.clear_image {
            draft.set_image_url(self.buffer.image_url().map(str::to_string));
        }
        if draft.image_url().is_some() {
            self.clear_image = false;
        }
        self.buffer = draft;
        Ok(())
    }

    pub fn attach_image(&mut self, file: ImageUpload) -> Result<(), FormError> {
        self.require_open("attach an image")?;
        self.pending_image = Some(file);
        self.clear_image = false;
        Ok(())
    }

    /// Drop both the picked file and the existing image reference
    pub fn clear_image(&mut self) -> Result<(), FormError> {
        self.require_open("clear the image")?;
        self.pending_image = None;
        self.clear_image = true;
        self.buffer.set_image_url(None);
        Ok(())
    }

    /// Create or update through the synchronizer
    ///
    /// Success closes the form. Failure keeps it open with the buffer intact
    /// and the error recorded for display.
    pub async fn submit(
        &mut self,
        sync: &RecordSynchronizer<D::Target>,
    ) -> Result<D::Target, FormError> {
        let result = match &self.state {
            FormState::Closed => {
                return Err(FormError::InvalidTransition {
                    action: "submit",
                    state: "closed",
                })
            }
            FormState::Creating => {
                sync.create(self.buffer.clone(), self.pending_image.as_ref())
                    .await
            }
            FormState::Editing(id) => {
                let change = match (&self.pending_image, self.clear_image) {
                    (Some(file), _) => ImageChange::Replace(file),
                    (None, true) => ImageChange::Clear,
                    (None, false) => ImageChange::Keep,
                };
                sync.update(id, self.buffer.clone(), change).await
            }
        };

        match result {
            Ok(record) => {
                self.reset();
                Ok(record)
            }
            Err(e) => {
                tracing::warn!(error = %e, form = self.state.name(), "Form submit failed");
                self.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Any state -> `Closed`, discarding the buffer
    pub fn cancel(&mut self) {
        self.reset();
    }
}
