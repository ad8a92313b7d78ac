//! Blog post model

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::record::{AssetPolicy, Draft, Record, RecordId, ValidationError};

static SLUG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug pattern is valid"));

/// Blog post entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: RecordId,
    pub title: String,
    /// Public lookup key, unique across posts
    pub slug: String,
    /// Rich HTML body
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for BlogPost {
    const TABLE: &'static str = "blogs";
    const LABEL: &'static str = "blog post";
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

    fn check(&self) -> Result<(), String> {
        if self.slug.trim().is_empty() {
            return Err("slug must not be empty".to_string());
        }
        Ok(())
    }
}

/// Form buffer for creating or editing a blog post
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlogDraft {
    #[serde(default)]
    pub title: String,
    /// Derived from the title when left blank
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl BlogDraft {
    pub fn new(
        title: impl Into<String>,
        slug: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            content: content.into(),
            image_url: None,
        }
    }
}

impl Draft for BlogDraft {
    type Target = BlogPost;

    fn from_record(record: &BlogPost) -> Self {
        Self {
            title: record.title.clone(),
            slug: record.slug.clone(),
            content: record.content.clone(),
            image_url: record.image_url.clone(),
        }
    }

    fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.slug = self.slug.trim().to_string();
        if self.slug.is_empty() {
            self.slug = generate_slug(&self.title);
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError("Title is required".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(ValidationError("Content is required".to_string()));
        }
        if !SLUG_PATTERN.is_match(&self.slug) {
            return Err(ValidationError(format!(
                "Slug '{}' must contain only lowercase letters, digits and single hyphens",
                self.slug
            )));
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
            "slug": self.slug,
            "content": self.content,
            "image_url": self.image_url,
        })
    }

    fn conflict(&self, existing: &[BlogPost], editing: Option<&RecordId>) -> Option<String> {
        existing
            .iter()
            .find(|post| post.slug == self.slug && Some(&post.id) != editing)
            .map(|_| format!("A blog post with slug '{}' already exists", self.slug))
    }
}

/// Generate a URL-safe slug from a title
///
/// Lowercases, maps every run of non-alphanumeric ASCII to a single hyphen,
/// drops non-ASCII characters and trims hyphens from both ends.
pub fn generate_slug(title: &str) -> String {
    let mut result = String::new();
    let mut prev_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            prev_hyphen = false;
        } else if c.is_ascii() {
            if !prev_hyphen && !result.is_empty() {
                result.push('-');
                prev_hyphen = true;
            }
        }
    }

    result.trim_end_matches('-').to_string()
}
