//! Contact request service
//!
//! Accepts submissions from the public contact form, stores them and notifies
//! the office by email.

use std::sync::Arc;

use super::email::{contact_notification, MailError, Mailer};
use crate::models::{ContactRequest, NewContactRequest, Record, ValidationError};
use crate::remote::{RemoteStore, StoreError};

/// Contact service errors
#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Contact notifications are not configured")]
    NotConfigured,

    #[error("Failed to save contact request: {0}")]
    Persistence(#[source] StoreError),

    #[error("Failed to send notification email: {0}")]
    Mail(#[source] MailError),
}

/// Contact service
pub struct ContactService {
    store: Arc<dyn RemoteStore>,
    mailer: Option<Arc<dyn Mailer>>,
    recipients: Vec<String>,
}

impl ContactService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        mailer: Option<Arc<dyn Mailer>>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            store,
            mailer,
            recipients,
        }
    }

    /// Validate, persist and announce a contact request
    ///
    /// Nothing reaches the store unless the input is valid and a mailer with
    /// at least one recipient is configured.
    pub async fn submit(&self, input: NewContactRequest) -> Result<ContactRequest, ContactError> {
        input.validate()?;

        let mailer = match &self.mailer {
            Some(mailer) if !self.recipients.is_empty() => mailer,
            _ => {
                tracing::error!("Contact request received but mail is not configured");
                return Err(ContactError::NotConfigured);
            }
        };

        let row = self
            .store
            .insert(ContactRequest::TABLE, input.to_row())
            .await
            .map_err(ContactError::Persistence)?;
        let request = ContactRequest::from_row(row)
            .map_err(|e| ContactError::Persistence(StoreError::MalformedRecord(e)))?;
        tracing::info!(id = %request.id, service = %request.service, "Contact request saved");

        let mail = contact_notification(&request, &self.recipients);
        mailer.send(&mail).await.map_err(ContactError::Mail)?;
        tracing::info!(
            id = %request.id,
            recipients = self.recipients.len(),
            "Contact notification sent"
        );

        Ok(request)
    }
}
