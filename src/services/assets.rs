//! Image asset lifecycle
//!
//! Images live in one bucket of the data store's object storage. A stored
//! object is addressed by its public URL; the object key is the URL's last
//! path segment.

use chrono::Utc;
use reqwest::Url;
use std::sync::Arc;

use crate::config::UploadConfig;
use crate::models::AssetPolicy;
use crate::remote::{RemoteStore, StoreError};

/// An image file picked in a form, not yet uploaded
#[derive(Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUpload")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Asset errors
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Invalid file type: {content_type}. Allowed types: {allowed:?}")]
    InvalidType {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("File too large. Maximum size: {max} bytes ({} MB)", max / 1024 / 1024)]
    TooLarge { max: u64 },

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Image upload failed: {0}")]
    Upload(#[source] StoreError),

    #[error("Image removal failed: {0}")]
    Remove(#[source] StoreError),

    #[error("Not a storage URL: {0}")]
    InvalidReference(String),
}

impl AssetError {
    /// Whether the file itself was rejected, as opposed to the store failing
    pub fn is_rejected_file(&self) -> bool {
        matches!(
            self,
            Self::InvalidType { .. } | Self::TooLarge { .. } | Self::Empty
        )
    }
}

/// Uploads and removes images in the configured bucket
pub struct AssetManager {
    store: Arc<dyn RemoteStore>,
    bucket: String,
    limits: UploadConfig,
}

impl AssetManager {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        bucket: impl Into<String>,
        limits: UploadConfig,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            limits,
        }
    }

    /// Check a file against the allowed types and size
    pub fn check(limits: &UploadConfig, file: &ImageUpload) -> Result<(), AssetError> {
        if !limits.is_type_allowed(&file.content_type) {
            return Err(AssetError::InvalidType {
                content_type: file.content_type.clone(),
                allowed: limits.allowed_types.clone(),
            });
        }
        if file.data.is_empty() {
            return Err(AssetError::Empty);
        }
        if file.data.len() as u64 > limits.max_file_size {
            return Err(AssetError::TooLarge {
                max: limits.max_file_size,
            });
        }
        Ok(())
    }

    /// Store the file and return its public URL
    pub async fn upload(&self, file: &ImageUpload) -> Result<String, AssetError> {
        Self::check(&self.limits, file)?;

        let key = storage_key(Utc::now().timestamp_millis(), &file.filename, &file.content_type);
        self.store
            .upload(&self.bucket, &key, file.data.clone(), &file.content_type)
            .await
            .map_err(AssetError::Upload)?;

        let url = self.store.public_url(&self.bucket, &key);
        tracing::debug!(key = %key, url = %url, "Image uploaded");
        Ok(url)
    }

    /// Delete the object a public URL points at
    pub async fn remove(&self, url: &str) -> Result<(), AssetError> {
        let key = key_from_url(url).ok_or_else(|| AssetError::InvalidReference(url.to_string()))?;
        self.store
            .remove(&self.bucket, &key)
            .await
            .map_err(AssetError::Remove)?;
        tracing::debug!(key = %key, "Image removed");
        Ok(())
    }

    /// Whether the URL is served by our own storage host
    pub fn is_own_asset(&self, url: &str) -> bool {
        let Some(own) = self.store.storage_host() else {
            return false;
        };
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.eq_ignore_ascii_case(&own)))
            .unwrap_or(false)
    }

    /// Whether a record with this policy may have `url` removed from storage
    ///
    /// Keys are only unique within our bucket, so a foreign URL is never
    /// mapped onto one of our objects.
    pub fn removable(&self, policy: AssetPolicy, url: &str) -> bool {
        match policy {
            AssetPolicy::NoAssets => false,
            AssetPolicy::OwnStorageOnly => self.is_own_asset(url),
        }
    }

    /// Best-effort removal; failures are logged and swallowed
    pub async fn discard(&self, policy: AssetPolicy, url: &str) {
        if !self.removable(policy, url) {
            tracing::debug!(url = %url, "Image not in own storage, leaving it");
            return;
        }
        if let Err(e) = self.remove(url).await {
            tracing::warn!(url = %url, error = %e, "Failed to remove image");
        }
    }
}

/// Object key for an upload: `{millis}.{ext}`
pub fn storage_key(millis: i64, filename: &str, content_type: &str) -> String {
    format!("{}.{}", millis, get_extension(filename, content_type))
}

fn get_extension(filename: &str, content_type: &str) -> String {
    if let Some((_, ext)) = filename.rsplit_once('.') {
        if !ext.is_empty() && ext.len() < 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_lowercase();
        }
    }

    match content_type {
        "image/jpeg" => "jpg".to_string(),
        "image/png" => "png".to_string(),
        "image/gif" => "gif".to_string(),
        "image/webp" => "webp".to_string(),
        "image/svg+xml" => "svg".to_string(),
        _ => "bin".to_string(),
    }
}

/// Trailing path segment of a URL, percent-decoded
fn key_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryStore, StoreCall, StoreOp};

    fn png(name: &str) -> ImageUpload {
        ImageUpload {
            filename: name.to_string(),
            content_type: "image/png".to_string(),
            data: vec![0x89, b'P', b'N', b'G'],
        }
    }

    fn setup() -> (MemoryStore, AssetManager) {
        let store = MemoryStore::new();
        let assets = AssetManager::new(Arc::new(store.clone()), "images", UploadConfig::default());
        (store, assets)
    }

    #[test]
    fn test_storage_key_uses_extension() {
        assert_eq!(storage_key(1700000000000, "Photo.JPG", "image/jpeg"), "1700000000000.jpg");
        assert_eq!(storage_key(1, "no-extension", "image/png"), "1.png");
        assert_eq!(storage_key(1, "weird.", "image/webp"), "1.webp");
        assert_eq!(storage_key(1, "blob", "application/x-unknown"), "1.bin");
    }

    #[test]
    fn test_key_from_url() {
        let url = "https://abc.example.co/storage/v1/object/public/images/17.png";
        assert_eq!(key_from_url(url).as_deref(), Some("17.png"));
        assert_eq!(
            key_from_url("https://x.example/a/b%20c.png").as_deref(),
            Some("b c.png")
        );
        assert_eq!(key_from_url("not a url"), None);
        assert_eq!(key_from_url("https://x.example/"), None);
    }

    #[tokio::test]
    async fn test_upload_stores_object_and_returns_public_url() {
        let (store, assets) = setup();

        let url = assets.upload(&png("a.png")).await.unwrap();
        let key = key_from_url(&url).unwrap();

        assert!(key.ends_with(".png"));
        assert!(store.has_object("images", &key));
        assert!(store.calls().contains(&StoreCall::Upload {
            bucket: "images".to_string(),
            key: key.clone(),
            content_type: "image/png".to_string(),
        }));
        assert!(assets.is_own_asset(&url));
    }

    #[tokio::test]
    async fn test_upload_rejects_disallowed_type_without_store_call() {
        let (store, assets) = setup();
        let file = ImageUpload {
            content_type: "application/pdf".to_string(),
            ..png("a.pdf")
        };

        let result = assets.upload(&file).await;
        assert!(matches!(result, Err(AssetError::InvalidType { .. })));
        assert_eq!(store.count(StoreOp::Upload), 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_file() {
        let store = MemoryStore::new();
        let limits = UploadConfig {
            max_file_size: 2,
            ..UploadConfig::default()
        };
        let assets = AssetManager::new(Arc::new(store.clone()), "images", limits);

        let result = assets.upload(&png("a.png")).await;
        assert!(matches!(result, Err(AssetError::TooLarge { max: 2 })));
    }

    #[tokio::test]
    async fn test_upload_failure_is_reported() {
        let (store, assets) = setup();
        store.fail(StoreOp::Upload);

        let result = assets.upload(&png("a.png")).await;
        assert!(matches!(result, Err(AssetError::Upload(_))));
    }

    #[tokio::test]
    async fn test_remove_uses_trailing_segment() {
        let (store, assets) = setup();
        let url = assets.upload(&png("a.png")).await.unwrap();
        let key = key_from_url(&url).unwrap();

        assets.remove(&url).await.unwrap();
        assert!(!store.has_object("images", &key));
        assert!(store.calls().contains(&StoreCall::Remove {
            bucket: "images".to_string(),
            key,
        }));
    }

    #[test]
    fn test_is_own_asset_compares_hosts() {
        let (_, assets) = setup();
        assert!(assets.is_own_asset(
            "http://storage.memory.local/storage/v1/object/public/images/1.png"
        ));
        assert!(!assets.is_own_asset("https://images.unsplash.com/photo-1.jpg"));
        assert!(!assets.is_own_asset("/relative/1.png"));
    }

    #[tokio::test]
    async fn test_discard_never_maps_foreign_url_onto_own_object() {
        let (store, assets) = setup();
        let own = assets.upload(&png("a.png")).await.unwrap();
        let key = key_from_url(&own).unwrap();
        let foreign = format!("https://cdn.example.org/uploads/{}", key);

        assets.discard(AssetPolicy::OwnStorageOnly, &foreign).await;
        assets.discard(AssetPolicy::NoAssets, &own).await;
        assert_eq!(store.count(StoreOp::Remove), 0);
        assert!(store.has_object("images", &key));

        assets.discard(AssetPolicy::OwnStorageOnly, &own).await;
        assert!(!store.has_object("images", &key));
    }

    #[tokio::test]
    async fn test_discard_swallows_failures() {
        let (store, assets) = setup();
        store.fail(StoreOp::Remove);

        assets
            .discard(AssetPolicy::OwnStorageOnly, "http://storage.memory.local/x/1.png")
            .await;
        assert_eq!(store.count(StoreOp::Remove), 1);
    }
}
