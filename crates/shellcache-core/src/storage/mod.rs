//! Durable key-value storage behind the cache partitions.
//!
//! `CacheStorage` is the seam between the gateway and whatever actually
//! holds bytes: `MemoryStorage` for tests and ephemeral hosts,
//! `DiskStorage` for a persistent cache directory.
//!
//! Executors never see the storage directly. They receive a `Partition`
//! handle from the partition manager, which can read and write entries but
//! cannot create or delete partitions.

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CacheError;
use crate::http::{CachedResponse, Request};

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// A stored entry: a cached response, or a request pending replay when
/// `response` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub request: Request,
    pub response: Option<CachedResponse>,
    pub stored_at: DateTime<Utc>,
    pub attempts: u32,
}

impl CacheEntry {
    pub fn response(request: Request, response: CachedResponse) -> Self {
        Self {
            request,
            response: Some(response),
            stored_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn pending(request: Request) -> Self {
        Self {
            request,
            response: None,
            stored_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.response.is_none()
    }
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of every partition currently stored
    async fn names(&self) -> Result<Vec<String>, CacheError>;

    /// Create a partition. Creating an existing partition is a no-op.
    async fn create(&self, partition: &str) -> Result<(), CacheError>;

    /// Delete a partition and everything in it. Returns false if it did not exist.
    async fn remove(&self, partition: &str) -> Result<bool, CacheError>;

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Write an entry, replacing any previous entry under the same key.
    async fn put(&self, partition: &str, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    async fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError>;

    async fn keys(&self, partition: &str) -> Result<Vec<String>, CacheError>;
}

/// Read/write handle on one named partition.
/// Clone is cheap - the storage is shared behind an Arc.
#[derive(Clone)]
pub struct Partition {
    name: Arc<str>,
    storage: Arc<dyn CacheStorage>,
}

impl Partition {
    pub(crate) fn new(storage: Arc<dyn CacheStorage>, name: &str) -> Self {
        Self {
            name: Arc::from(name),
            storage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the stored response for a request. Pending requests do not match.
    pub async fn match_request(&self, request: &Request) -> Result<Option<CachedResponse>, CacheError> {
        let entry = self.storage.get(&self.name, &request.cache_key()).await?;
        Ok(entry.and_then(|e| e.response))
    }

    pub async fn put_response(&self, request: &Request, response: CachedResponse) -> Result<(), CacheError> {
        let key = request.cache_key();
        self.storage
            .put(&self.name, &key, CacheEntry::response(request.clone(), response))
            .await
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.storage.get(&self.name, key).await
    }

    pub async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.storage.put(&self.name, key, entry).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.storage.delete(&self.name, key).await
    }

    pub async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.storage.keys(&self.name).await
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition").field("name", &self.name).finish()
    }
}
