//! Contact request model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::record::{AssetPolicy, Record, RecordId, ValidationError};

/// Contact request status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactStatus {
    #[default]
    Pending,
    Responded,
    Closed,
}

impl std::fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Responded => write!(f, "responded"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Contact request entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRequest {
    pub id: RecordId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    /// Requested service, free text
    pub service: String,
    pub message: String,
    pub terms_accepted: bool,
    #[serde(default)]
    pub status: ContactStatus,
    pub created_at: DateTime<Utc>,
}

impl Record for ContactRequest {
    const TABLE: &'static str = "contact_requests";
    const LABEL: &'static str = "contact request";
    const ASSETS: AssetPolicy = AssetPolicy::NoAssets;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Input accepted by the public contact endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl NewContactRequest {
    /// Reject the request unless every required field is present and the
    /// terms were accepted
    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing: Vec<&str> = [
            ("name", &self.name),
            ("email", &self.email),
            ("service", &self.service),
            ("message", &self.message),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if !missing.is_empty() {
            return Err(ValidationError(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        // Replies go to this address, so it must be one the mailer accepts
        if self.email.trim().parse::<lettre::Address>().is_err() {
            return Err(ValidationError("Please enter a valid email address".to_string()));
        }
        if !self.terms_accepted {
            return Err(ValidationError("The terms must be accepted".to_string()));
        }
        Ok(())
    }

    /// Insert payload; new requests always start out pending
    pub fn to_row(&self) -> Value {
        json!({
            "name": self.name.trim(),
            "email": self.email.trim().to_lowercase(),
            "phone": non_blank(&self.phone),
            "company": non_blank(&self.company),
            "service": self.service.trim(),
            "message": self.message.trim(),
            "terms_accepted": self.terms_accepted,
            "status": ContactStatus::Pending,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
