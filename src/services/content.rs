//! Public content service
//!
//! Read-only access to blog posts and projects for the public site, with a
//! short-lived in-memory cache in front of the data store.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::synchronizer::fetch_all;
use crate::models::{BlogPost, Project, Record};
use crate::remote::{RemoteStore, StoreError};

/// Newest-first listing of one table, cached as a whole
///
/// Every invalidation bumps `generation`; a listing fetched under an older
/// generation is returned to its caller but never cached.
struct ListingCache<R: Record> {
    entries: Cache<&'static str, Arc<Vec<R>>>,
    generation: AtomicU64,
}

impl<R: Record> ListingCache<R> {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            generation: AtomicU64::new(0),
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    async fn get_or_load(&self, store: &dyn RemoteStore) -> Result<Arc<Vec<R>>, StoreError> {
        if let Some(hit) = self.entries.get(R::TABLE).await {
            return Ok(hit);
        }
        let generation = self.generation();
        let records = Arc::new(fetch_all::<R>(store).await?);
        self.store_if_current(generation, records.clone()).await;
        Ok(records)
    }

    async fn store_if_current(&self, generation: u64, records: Arc<Vec<R>>) {
        if self.generation() != generation {
            tracing::debug!(table = R::TABLE, "Listing went stale while loading, not cached");
            return;
        }
        let count = records.len();
        self.entries.insert(R::TABLE, records).await;
        // An invalidation between the check and the insert
        if self.generation() != generation {
            self.entries.invalidate(R::TABLE).await;
            return;
        }
        tracing::debug!(table = R::TABLE, count, "Listing cached");
    }

    async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.entries.invalidate(R::TABLE).await;
    }
}

/// Content service for the public site
pub struct ContentService {
    store: Arc<dyn RemoteStore>,
    blogs: ListingCache<BlogPost>,
    projects: ListingCache<Project>,
}

impl ContentService {
    pub fn new(store: Arc<dyn RemoteStore>, ttl: Duration) -> Self {
        Self {
            store,
            blogs: ListingCache::new(ttl),
            projects: ListingCache::new(ttl),
        }
    }

    pub async fn list_blogs(&self) -> Result<Arc<Vec<BlogPost>>, StoreError> {
        self.blogs.get_or_load(self.store.as_ref()).await
    }

    pub async fn list_projects(&self) -> Result<Arc<Vec<Project>>, StoreError> {
        self.projects.get_or_load(self.store.as_ref()).await
    }

    /// Look up one blog post by slug, bypassing the cache
    pub async fn blog_by_slug(&self, slug: &str) -> Result<Option<BlogPost>, StoreError> {
        let rows = self.store.select_eq(BlogPost::TABLE, "slug", slug).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(BlogPost::from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Drop cached listings after an admin write
    pub async fn invalidate(&self) {
        self.blogs.invalidate().await;
        self.projects.invalidate().await;
    }
}
