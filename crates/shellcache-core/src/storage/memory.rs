use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheEntry, CacheStorage};
use crate::error::CacheError;

type Entries = BTreeMap<String, CacheEntry>;

/// In-process partitions. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    partitions: RwLock<BTreeMap<String, Entries>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn names(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.partitions.read().await.keys().cloned().collect())
    }

    async fn create(&self, partition: &str) -> Result<(), CacheError> {
        self.partitions
            .write()
            .await
            .entry(partition.to_string())
            .or_default();
        Ok(())
    }

    async fn remove(&self, partition: &str) -> Result<bool, CacheError> {
        Ok(self.partitions.write().await.remove(partition).is_some())
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let partitions = self.partitions.read().await;
        let entries = partitions
            .get(partition)
            .ok_or_else(|| CacheError::PartitionMissing(partition.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, partition: &str, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let mut partitions = self.partitions.write().await;
        let entries = partitions
            .get_mut(partition)
            .ok_or_else(|| CacheError::PartitionMissing(partition.to_string()))?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
        let mut partitions = self.partitions.write().await;
        let entries = partitions
            .get_mut(partition)
            .ok_or_else(|| CacheError::PartitionMissing(partition.to_string()))?;
        Ok(entries.remove(key).is_some())
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
        let partitions = self.partitions.read().await;
        let entries = partitions
            .get(partition)
            .ok_or_else(|| CacheError::PartitionMissing(partition.to_string()))?;
        Ok(entries.keys().cloned().collect())
    }
}
