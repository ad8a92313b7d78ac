//! Record identity and the typed translation boundary
//!
//! Rows arrive from the data store as untyped JSON. Every entity maps them
//! through [`Record::from_row`], which either yields a typed record or a
//! [`RecordError`] naming the table and what was wrong.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque record identifier assigned by the data store
///
/// The store may hand out numeric or textual keys; both are kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Integer(i64),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(text) if text.trim().is_empty() => {
                Err(D::Error::custom("record id must not be empty"))
            }
            RawId::Text(text) => Ok(Self(text)),
            RawId::Integer(n) => Ok(Self(n.to_string())),
        }
    }
}

/// A row that could not be mapped into its typed record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed {table} record: {reason}")]
pub struct RecordError {
    pub table: &'static str,
    pub reason: String,
}

/// Draft input rejected before reaching the data store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Which stored assets a record delete is allowed to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetPolicy {
    /// The entity never carries an asset
    NoAssets,
    /// Only references hosted by our own storage are removed
    OwnStorageOnly,
}

/// A typed entity mirrored from one data store table
pub trait Record: fmt::Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table name in the data store
    const TABLE: &'static str;
    /// Human-readable label used in messages
    const LABEL: &'static str;
    const ASSETS: AssetPolicy;

    fn id(&self) -> &RecordId;

    fn created_at(&self) -> DateTime<Utc>;

    fn image_url(&self) -> Option<&str> {
        None
    }

    /// Checks beyond the row shape itself
    fn check(&self) -> Result<(), String> {
        Ok(())
    }

    /// Map an untyped store row into the typed record
    fn from_row(row: Value) -> Result<Self, RecordError> {
        let record: Self = serde_json::from_value(row).map_err(|e| RecordError {
            table: Self::TABLE,
            reason: e.to_string(),
        })?;
        record.check().map_err(|reason| RecordError {
            table: Self::TABLE,
            reason,
        })?;
        Ok(record)
    }
}

/// Edit buffer for a record that is created and updated through a form
pub trait Draft:
    fmt::Debug + Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Target: Record;

    /// Pre-populate the buffer from an existing record
    fn from_record(record: &Self::Target) -> Self;

    /// Trim input and derive any omitted fields
    fn normalize(&mut self) {}

    fn validate(&self) -> Result<(), ValidationError>;

    fn image_url(&self) -> Option<&str>;

    fn set_image_url(&mut self, url: Option<String>);

    /// Payload sent to the store on insert or update
    fn to_row(&self) -> Value;

    /// Uniqueness violated against the locally mirrored records, if any
    fn conflict(&self, _existing: &[Self::Target], _editing: Option<&RecordId>) -> Option<String> {
        None
    }
}

/// Newest first; a stable sort keeps store order among equal timestamps
pub fn sort_newest_first<R: Record>(records: &mut [R]) {
    records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
}
