//! Caching strategies.
//!
//! Each executor resolves one request against one partition and the
//! network. Cache population after a network success is fire-and-forget:
//! it is spawned on the background tracker and never delays the response.
//! Concurrent writes to the same key race freely; the last write wins.
//!
//! Executors return `Err` only when neither source produced a response.
//! The gateway turns that into an offline fallback.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::NetworkError;
use crate::fallback;
use crate::http::{CachedResponse, Request};
use crate::network::{fetch_with_timeout, Network};
use crate::storage::Partition;
use crate::tasks::BackgroundTasks;

/// Accept header sent on image network fetches
const IMAGE_ACCEPT: &str = "image/webp,image/avif,image/apng,image/*,*/*;q=0.8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    CacheFirstImage,
    NetworkFirst,
    StaleWhileRevalidate,
}

pub struct Executors {
    network: Arc<dyn Network>,
    tasks: Arc<BackgroundTasks>,
}

/// Cache lookup where a storage error counts as a miss
async fn lookup(partition: &Partition, request: &Request) -> Option<CachedResponse> {
    match partition.match_request(request).await {
        Ok(hit) => hit,
        Err(e) => {
            warn!(partition = partition.name(), url = %request.url, error = %e, "Cache lookup failed");
            None
        }
    }
}

impl Executors {
    pub fn new(network: Arc<dyn Network>, tasks: Arc<BackgroundTasks>) -> Self {
        Self { network, tasks }
    }

    /// Write a successful response into the partition without waiting for it.
    fn store_in_background(&self, partition: &Partition, request: &Request, response: &CachedResponse) {
        if !response.ok() {
            return;
        }
        let partition = partition.clone();
        let request = request.clone();
        let response = response.clone();
        self.tasks.spawn(async move {
            if let Err(e) = partition.put_response(&request, response).await {
                warn!(partition = partition.name(), url = %request.url, error = %e, "Failed to populate cache");
            }
        });
    }

    /// A cached entry is authoritative; the network is contacted only on a miss.
    pub async fn cache_first(
        &self,
        request: &Request,
        partition: &Partition,
    ) -> Result<CachedResponse, NetworkError> {
        if let Some(cached) = lookup(partition, request).await {
            debug!(url = %request.url, partition = partition.name(), "Cache hit");
            return Ok(cached);
        }

        debug!(url = %request.url, partition = partition.name(), "Cache miss");
        let response = self.network.fetch(request).await?;
        self.store_in_background(partition, request, &response);
        Ok(response)
    }

    /// Cache-first for images. Never fails: a network failure yields the
    /// placeholder graphic, which is not cached.
    pub async fn cache_first_image(&self, request: &Request, partition: &Partition) -> CachedResponse {
        if let Some(cached) = lookup(partition, request).await {
            debug!(url = %request.url, "Image cache hit");
            return cached;
        }

        let network_request = request.clone().with_header("accept", IMAGE_ACCEPT);
        match self.network.fetch(&network_request).await {
            Ok(response) => {
                self.store_in_background(partition, request, &response);
                response
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Image fetch failed, serving placeholder");
                fallback::placeholder_image()
            }
        }
    }

    /// Race the network against `timeout`; fall back to the partition on
    /// failure or timeout.
    pub async fn network_first(
        &self,
        request: &Request,
        partition: &Partition,
        timeout: Duration,
    ) -> Result<CachedResponse, NetworkError> {
        match fetch_with_timeout(self.network.as_ref(), request, timeout).await {
            Ok(response) => {
                self.store_in_background(partition, request, &response);
                Ok(response)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network failed, trying cache");
                match lookup(partition, request).await {
                    Some(cached) => Ok(cached),
                    None => Err(e),
                }
            }
        }
    }

    /// Serve the cached copy at once while a background fetch refreshes the
    /// partition. Without a cached copy, wait for that fetch.
    pub async fn stale_while_revalidate(
        &self,
        request: &Request,
        partition: &Partition,
    ) -> Result<CachedResponse, NetworkError> {
        let (tx, rx) = oneshot::channel();
        {
            let network = self.network.clone();
            let partition = partition.clone();
            let request = request.clone();
            self.tasks.spawn(async move {
                let result = network.fetch(&request).await;
                if let Ok(ref response) = result {
                    if response.ok() {
                        if let Err(e) = partition.put_response(&request, response.clone()).await {
                            warn!(url = %request.url, error = %e, "Failed to store revalidated response");
                        }
                    }
                }
                // Receiver is gone when the cached copy was already served
                let _ = tx.send(result);
            });
        }

        if let Some(cached) = lookup(partition, request).await {
            debug!(url = %request.url, "Serving stale copy while revalidating");
            return Ok(cached);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Aborted),
        }
    }
}
