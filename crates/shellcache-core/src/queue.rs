//! Deferred mutation queue.
//!
//! Mutating API requests that fail are stored as pending entries in the
//! `dynamic` partition. On a background-sync signal every pending mutation
//! is replayed, oldest first. A mutation leaves the queue when the server
//! answers it, or when it has used up its retry budget or outlived its
//! maximum age under the `QueuePolicy`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::classify::is_deferrable_mutation;
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::http::Request;
use crate::network::{fetch_with_timeout, Network};
use crate::storage::{CacheEntry, Partition};

/// Outcome of one replay pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Delivered and removed from the queue
    pub replayed: usize,
    /// Still queued for the next signal
    pub failed: usize,
    /// Removed unreplayed by the retention policy
    pub dropped: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.replayed == 0 && self.failed == 0 && self.dropped == 0
    }
}

pub struct DeferredQueue {
    config: Arc<CacheConfig>,
    network: Arc<dyn Network>,
}

impl DeferredQueue {
    pub fn new(config: Arc<CacheConfig>, network: Arc<dyn Network>) -> Self {
        Self { config, network }
    }

    pub async fn enqueue(&self, partition: &Partition, request: &Request) -> Result<(), CacheError> {
        let key = request.cache_key();
        partition.put(&key, CacheEntry::pending(request.clone())).await?;
        info!(key = %key, "Queued mutation for background sync");
        Ok(())
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        let policy = &self.config.queue_policy;
        entry.attempts >= policy.max_attempts || now - entry.stored_at > policy.max_age
    }

    /// Queued mutations in the partition, oldest first
    async fn pending(&self, partition: &Partition) -> Result<Vec<(String, CacheEntry)>, CacheError> {
        let mut pending = Vec::new();
        for key in partition.keys().await? {
            match partition.get(&key).await {
                Ok(Some(entry)) if entry.is_pending() && is_deferrable_mutation(&entry.request, &self.config) => {
                    pending.push((key, entry));
                }
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable queue entry"),
            }
        }
        pending.sort_by_key(|(_, entry)| entry.stored_at);
        Ok(pending)
    }

    async fn retry_later(&self, partition: &Partition, key: &str, mut entry: CacheEntry) {
        entry.attempts += 1;
        if let Err(e) = partition.put(key, entry).await {
            warn!(key = %key, error = %e, "Failed to record replay attempt");
        }
    }

    /// Replay every queued mutation once. Storage errors on one entry are
    /// logged and the pass moves on to the next.
    ///
    /// A 5xx or transport failure keeps the mutation queued with its attempt
    /// count raised; any other status means the server has handled it.
    pub async fn replay(&self, partition: &Partition) -> Result<SyncReport, CacheError> {
        let mut report = SyncReport::default();
        let now = Utc::now();

        for (key, entry) in self.pending(partition).await? {
            if self.is_expired(&entry, now) {
                warn!(key = %key, attempts = entry.attempts, "Dropping expired queued mutation");
                match partition.delete(&key).await {
                    Ok(_) => report.dropped += 1,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to drop expired mutation");
                        report.failed += 1;
                    }
                }
                continue;
            }

            let result = fetch_with_timeout(
                self.network.as_ref(),
                &entry.request,
                self.config.network_timeout,
            )
            .await;

            match result {
                Ok(response) if response.status < 500 => match partition.delete(&key).await {
                    Ok(_) => {
                        debug!(key = %key, status = response.status, "Replayed queued mutation");
                        report.replayed += 1;
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Replayed mutation could not be removed from the queue");
                        report.failed += 1;
                    }
                },
                Ok(response) => {
                    warn!(key = %key, status = response.status, "Replay rejected by server, keeping queued");
                    self.retry_later(partition, &key, entry).await;
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Replay failed, keeping queued");
                    self.retry_later(partition, &key, entry).await;
                    report.failed += 1;
                }
            }
        }

        if !report.is_empty() {
            info!(
                replayed = report.replayed,
                failed = report.failed,
                dropped = report.dropped,
                "Background sync finished"
            );
        }
        Ok(report)
    }
}
