//! Project gallery model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::record::{AssetPolicy, Draft, Record, RecordId, ValidationError};

/// Project entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: RecordId,
    pub title: String,
    pub location: String,
    /// May point at our own storage or at an externally supplied URL
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for Project {
    const TABLE: &'static str = "projects";
    const LABEL: &'static str = "project";
    const ASSETS: AssetPolicy = AssetPolicy::OwnStorageOnly;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }
}

/// Form buffer for creating or editing a project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl ProjectDraft {
    pub fn new(title: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            location: location.into(),
            image_url: None,
        }
    }
}

impl Draft for ProjectDraft {
    type Target = Project;

    fn from_record(record: &Project) -> Self {
        Self {
            title: record.title.clone(),
            location: record.location.clone(),
            image_url: record.image_url.clone(),
        }
    }

    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.location = self.location.trim().to_string();
        if self.image_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            self.image_url = None;
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_empty() {
            return Err(ValidationError("Title is required".to_string()));
        }
        if self.location.is_empty() {
            return Err(ValidationError("Location is required".to_string()));
        }
        Ok(())
    }

    fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    fn set_image_url(&mut self, url: Option<String>) {
        self.image_url = url;
    }

    fn to_row(&self) -> Value {
        json!({
            "title": self.title,
            "location": self.location,
            "image_url": self.image_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row_accepts_external_image() {
        let row = json!({
            "id": "p-1",
            "title": "Harbour Bridge Retrofit",
            "location": "Hamburg",
            "image_url": "https://images.example.org/bridge.jpg",
            "created_at": "2023-11-02T08:30:00Z"
        });

        let project = Project::from_row(row).unwrap();
        assert_eq!(project.location, "Hamburg");
        assert_eq!(project.image_url(), Some("https://images.example.org/bridge.jpg"));
    }

    #[test]
    fn test_validate_requires_title_and_location() {
        let mut draft = ProjectDraft::new("  ", "Berlin");
        draft.normalize();
        assert!(draft.validate().is_err());

        let mut draft = ProjectDraft::new("Tower", " ");
        draft.normalize();
        assert!(draft.validate().is_err());

        let mut draft = ProjectDraft::new("Tower", "Berlin");
        draft.normalize();
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_normalize_clears_blank_image_url() {
        let mut draft = ProjectDraft {
            image_url: Some("   ".to_string()),
            ..ProjectDraft::new("Tower", "Berlin")
        };
        draft.normalize();
        assert!(draft.image_url.is_none());
    }
}
