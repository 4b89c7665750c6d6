//! Cache partition lifecycle.
//!
//! The `PartitionManager` is the only component that creates or deletes
//! partitions. On install it precaches the static manifest; on activation
//! it deletes every partition that is not part of the current version set.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, GatewayError};
use crate::http::Request;
use crate::network::Network;
use crate::storage::{CacheStorage, Partition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    Static,
    Dynamic,
    Image,
}

impl PartitionKind {
    pub const ALL: [PartitionKind; 3] = [Self::Static, Self::Dynamic, Self::Image];

    fn prefix(&self) -> &'static str {
        match self {
            Self::Static => "static-cache",
            Self::Dynamic => "dynamic-cache",
            Self::Image => "image-cache",
        }
    }
}

/// Versioned partition name, e.g. `static-cache-v2`
pub fn partition_name(kind: PartitionKind, version: &str) -> String {
    format!("{}-v{}", kind.prefix(), version)
}

pub struct PartitionManager {
    config: Arc<CacheConfig>,
    storage: Arc<dyn CacheStorage>,
}

impl PartitionManager {
    pub fn new(config: Arc<CacheConfig>, storage: Arc<dyn CacheStorage>) -> Self {
        Self { config, storage }
    }

    /// Open a partition of the current version, creating it if needed.
    pub async fn open(&self, kind: PartitionKind) -> Result<Partition, CacheError> {
        let name = self.config.partition_name(kind);
        self.storage.create(name).await?;
        Ok(Partition::new(self.storage.clone(), name))
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.config.current_partitions().contains(&name)
    }

    /// Fetch every manifest path and store them in the static partition.
    ///
    /// All-or-nothing: every fetch must succeed with a 2xx before anything
    /// is written, so a partial shell is never marked cached.
    pub async fn precache(&self, network: &dyn Network) -> Result<usize, GatewayError> {
        let requests = self
            .config
            .manifest
            .iter()
            .map(|path| Ok(Request::get(self.config.resolve(path)?)))
            .collect::<Result<Vec<_>, GatewayError>>()?;

        let fetches = requests.iter().map(|request| async move {
            let response = network.fetch(request).await?;
            if !response.ok() {
                return Err(GatewayError::install(&request.url, response.status, &response.text()));
            }
            Ok::<_, GatewayError>((request, response))
        });
        let fetched = try_join_all(fetches).await?;

        let statics = self.open(PartitionKind::Static).await?;
        let mut written = Vec::with_capacity(fetched.len());
        for (request, response) in fetched {
            if let Err(e) = statics.put_response(request, response).await {
                self.discard(&statics, &written).await;
                return Err(e.into());
            }
            written.push(request.cache_key());
        }

        info!(partition = statics.name(), count = requests.len(), "Precached static manifest");
        Ok(requests.len())
    }

    /// Best-effort removal of a partially written manifest
    async fn discard(&self, statics: &Partition, keys: &[String]) {
        for key in keys {
            if let Err(e) = statics.delete(key).await {
                warn!(partition = statics.name(), key = %key, error = %e, "Failed to discard precached entry");
            }
        }
    }

    /// Delete every partition whose name is not in the current version set.
    ///
    /// Deletion failures are logged and skipped. Returns the names deleted.
    pub async fn purge_stale(&self) -> Result<Vec<String>, CacheError> {
        let stale: Vec<String> = self
            .storage
            .names()
            .await?
            .into_iter()
            .filter(|name| !self.is_current(name))
            .collect();

        let deletions = stale.iter().map(|name| async move {
            match self.storage.remove(name).await {
                Ok(_) => {
                    debug!(partition = %name, "Deleted stale partition");
                    Some(name.clone())
                }
                Err(e) => {
                    warn!(partition = %name, error = %e, "Failed to delete stale partition");
                    None
                }
            }
        });
        let deleted: Vec<String> = join_all(deletions).await.into_iter().flatten().collect();

        if !deleted.is_empty() {
            info!(count = deleted.len(), "Purged stale partitions");
        }
        Ok(deleted)
    }
}
