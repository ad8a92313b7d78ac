//! Remote data store
//!
//! The hosted backend owns authentication, the content tables and the image
//! bucket. Everything in the application talks to it through [`RemoteStore`]:
//! - [`HostedStore`] speaks the hosted REST/auth/storage HTTP API
//! - [`MemoryStore`] keeps everything in process (tests and demo mode)
//!
//! Handles are constructed explicitly from configuration and injected; there
//! is no process-wide client.

pub mod hosted;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::models::{AdminUser, RecordError, RecordId, Session};

pub use hosted::HostedStore;
pub use memory::{MemoryStore, StoreCall, StoreOp};

/// Errors reported by the remote data store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Credentials were rejected on sign-in
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// Token missing, expired or rejected
    #[error("Not authenticated")]
    Unauthorized,

    /// Keyed write matched no row
    #[error("{table} record {id} not found")]
    NotFound { table: String, id: String },

    /// A row did not fit its typed record
    #[error(transparent)]
    MalformedRecord(#[from] RecordError),

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Client could not be built from configuration
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

/// Sort order requested from a table select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub descending: bool,
}

impl OrderBy {
    /// Creation timestamp, newest first
    pub const fn newest_first() -> Self {
        Self {
            column: "created_at",
            descending: true,
        }
    }
}

/// Operations the application needs from the hosted backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Introspect an access token; `None` when it carries no live session
    async fn get_session(&self, access_token: &str) -> Result<Option<Session>, StoreError>;

    /// Ask the store which user the token belongs to
    async fn get_user(&self, access_token: &str) -> Result<AdminUser, StoreError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, StoreError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), StoreError>;

    async fn select_all(&self, table: &str, order: OrderBy) -> Result<Vec<Value>, StoreError>;

    /// Rows whose `column` equals `value`
    async fn select_eq(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Vec<Value>, StoreError>;

    /// Insert one row and return it as stored
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError>;

    /// Patch the row with `id` and return it as stored
    async fn update(&self, table: &str, id: &RecordId, patch: Value) -> Result<Value, StoreError>;

    async fn delete(&self, table: &str, id: &RecordId) -> Result<(), StoreError>;

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;

    /// Publicly resolvable URL of a stored object
    fn public_url(&self, bucket: &str, key: &str) -> String;

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Host serving this store's public object URLs
    fn storage_host(&self) -> Option<String>;

    /// Handle whose table and storage calls act on behalf of `access_token`
    fn authorized(&self, access_token: &str) -> Arc<dyn RemoteStore>;
}
