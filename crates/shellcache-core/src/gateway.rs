//! The caching gateway.
//!
//! `CachingGateway` exposes one method per host event: install, activate,
//! fetch, sync, push, notification click and control messages. The host
//! adapter binds these to its own event model; the gateway itself holds no
//! state between events other than what lives in the partitions.

use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[cfg(feature = "ts")]
use ts_rs::TS;

use crate::classify::{classify, intercepts, is_deferrable_mutation, ResourceClass};
use crate::config::{CacheConfig, SYNC_TAG};
use crate::error::{CacheError, GatewayError, Result};
use crate::fallback;
use crate::host::Host;
use crate::http::{CachedResponse, Request};
use crate::network::{fetch_with_timeout, Network};
use crate::partition::{PartitionKind, PartitionManager};
use crate::push::Notification;
use crate::queue::{DeferredQueue, SyncReport};
use crate::storage::{CacheStorage, Partition};
use crate::strategy::{Executors, Strategy};
use crate::tasks::BackgroundTasks;

/// Result of offering a request to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The gateway answered the request
    Responded(CachedResponse),
    /// Not intercepted; the host sends it to the network untouched
    Passthrough(Request),
}

/// Messages the application posts to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    PreloadResources { resources: Vec<String> },
    SkipWaiting,
}

impl ControlMessage {
    pub fn parse(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    pub stored: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageReply {
    Preloaded(PreloadReport),
    Acknowledged,
}

/// Strategy and partition for each resource class
fn route(class: ResourceClass) -> (Strategy, PartitionKind) {
    match class {
        ResourceClass::StaticAsset => (Strategy::CacheFirst, PartitionKind::Static),
        ResourceClass::Image => (Strategy::CacheFirstImage, PartitionKind::Image),
        ResourceClass::ApiCall => (Strategy::NetworkFirst, PartitionKind::Dynamic),
        ResourceClass::HtmlNavigation => (Strategy::StaleWhileRevalidate, PartitionKind::Dynamic),
        ResourceClass::Other => (Strategy::NetworkFirst, PartitionKind::Dynamic),
    }
}

pub struct CachingGateway {
    config: Arc<CacheConfig>,
    partitions: PartitionManager,
    executors: Executors,
    queue: DeferredQueue,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    tasks: Arc<BackgroundTasks>,
}

impl CachingGateway {
    pub fn new(
        config: CacheConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<dyn Host>,
    ) -> Self {
        let config = Arc::new(config);
        let tasks = Arc::new(BackgroundTasks::new());
        Self {
            partitions: PartitionManager::new(config.clone(), storage),
            executors: Executors::new(network.clone(), tasks.clone()),
            queue: DeferredQueue::new(config.clone(), network.clone()),
            config,
            network,
            host,
            tasks,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ===== Lifecycle =====

    /// Precache the static manifest and ask the host to activate at once.
    ///
    /// Fails if any manifest entry could not be fetched.
    pub async fn on_install(&self) -> Result<usize> {
        let (precached, skipped) = tokio::join!(self.install_partitions(), self.host.skip_waiting());

        if let Err(e) = skipped {
            warn!(error = %e, "Host refused skip-waiting");
        }
        match precached {
            Ok(count) => {
                info!(version = %self.config.version, count = count, "Install complete");
                Ok(count)
            }
            Err(e) => {
                error!(version = %self.config.version, error = %e, "Install failed");
                Err(e)
            }
        }
    }

    async fn install_partitions(&self) -> Result<usize> {
        let count = self.partitions.precache(self.network.as_ref()).await?;
        self.partitions.open(PartitionKind::Dynamic).await?;
        self.partitions.open(PartitionKind::Image).await?;
        Ok(count)
    }

    /// Purge partitions from other versions and take control of open clients.
    ///
    /// Never fails; storage errors are logged. Returns the purged names.
    pub async fn on_activate(&self) -> Vec<String> {
        let (purged, claimed) = tokio::join!(self.partitions.purge_stale(), self.host.claim_clients());

        if let Err(e) = claimed {
            warn!(error = %e, "Failed to claim clients");
        }
        match purged {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(error = %e, "Failed to list partitions during activation");
                Vec::new()
            }
        }
    }

    // ===== Fetch =====

    /// Offer a request to the gateway.
    pub async fn on_fetch(&self, request: Request) -> FetchOutcome {
        if is_deferrable_mutation(&request, &self.config) {
            return FetchOutcome::Responded(self.forward_mutation(&request).await);
        }
        if !intercepts(&request, &self.config) {
            debug!(method = %request.method, url = %request.url, "Passing request through");
            return FetchOutcome::Passthrough(request);
        }
        FetchOutcome::Responded(self.handle(&request).await)
    }

    /// Resolve an intercepted read. Always produces a response, degraded if
    /// neither cache nor network can serve it.
    pub async fn handle(&self, request: &Request) -> CachedResponse {
        let class = match classify(request, &self.config) {
            Ok(class) => class,
            Err(e) => {
                warn!(error = %e, "Failed to classify request");
                return fallback::request_timeout();
            }
        };

        match self.resolve(request, class).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, class = class.as_str(), error = %e, "Serving offline fallback");
                self.offline_fallback(request, class).await
            }
        }
    }

    async fn resolve(&self, request: &Request, class: ResourceClass) -> Result<CachedResponse> {
        let (strategy, kind) = route(class);
        debug!(url = %request.url, class = class.as_str(), strategy = ?strategy, "Routing request");

        let partition = self.partitions.open(kind).await?;
        let response = match strategy {
            Strategy::CacheFirst => self.executors.cache_first(request, &partition).await?,
            Strategy::CacheFirstImage => self.executors.cache_first_image(request, &partition).await,
            Strategy::NetworkFirst => {
                self.executors
                    .network_first(request, &partition, self.config.network_timeout)
                    .await?
            }
            Strategy::StaleWhileRevalidate => {
                self.executors.stale_while_revalidate(request, &partition).await?
            }
        };
        Ok(response)
    }

    async fn offline_fallback(&self, request: &Request, class: ResourceClass) -> CachedResponse {
        if class == ResourceClass::Image {
            return fallback::placeholder_image();
        }

        let statics = match self.partitions.open(PartitionKind::Static).await {
            Ok(statics) => Some(statics),
            Err(e) => {
                warn!(error = %e, "Static partition unavailable for fallback");
                None
            }
        };
        let offline_page = self.config.offline_page_url().ok();
        fallback::synthesize(request, statics.as_ref(), offline_page.as_deref()).await
    }

    /// Send a mutating API request; queue it for background sync if the
    /// network fails or times out.
    async fn forward_mutation(&self, request: &Request) -> CachedResponse {
        match fetch_with_timeout(self.network.as_ref(), request, self.config.network_timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!(method = %request.method, url = %request.url, error = %e, "Mutation failed, queueing");
                match self.queue_mutation(request).await {
                    Ok(()) => fallback::queued_mutation(),
                    Err(e) => {
                        warn!(url = %request.url, error = %e, "Failed to queue mutation");
                        fallback::request_timeout()
                    }
                }
            }
        }
    }

    async fn queue_mutation(&self, request: &Request) -> Result<(), CacheError> {
        let dynamic = self.partitions.open(PartitionKind::Dynamic).await?;
        self.queue.enqueue(&dynamic, request).await
    }

    // ===== Background sync =====

    /// Replay queued mutations. Only the `background-sync` tag is handled.
    pub async fn on_sync(&self, tag: &str) -> Result<SyncReport> {
        if tag != SYNC_TAG {
            debug!(tag = tag, "Ignoring unknown sync tag");
            return Ok(SyncReport::default());
        }
        let dynamic = self.partitions.open(PartitionKind::Dynamic).await?;
        Ok(self.queue.replay(&dynamic).await?)
    }

    // ===== Push =====

    pub async fn on_push(&self, data: Option<&[u8]>) -> Result<Notification> {
        let notification = Notification::from_push(data);
        self.host.show_notification(&notification).await?;
        Ok(notification)
    }

    /// Close the notification, then focus a client showing its URL or open one.
    pub async fn on_notification_click(&self, notification: &Notification) -> Result<()> {
        if let Err(e) = self.host.close_notification(notification).await {
            warn!(error = %e, "Failed to close notification");
        }
        let url = self.config.resolve(&notification.url)?;
        if !self.host.focus_client(&url).await? {
            self.host.open_window(&url).await?;
        }
        Ok(())
    }

    // ===== Messages =====

    pub async fn on_message(&self, message: ControlMessage) -> Result<MessageReply> {
        match message {
            ControlMessage::PreloadResources { resources } => {
                Ok(MessageReply::Preloaded(self.preload(&resources).await?))
            }
            ControlMessage::SkipWaiting => {
                self.host.skip_waiting().await?;
                Ok(MessageReply::Acknowledged)
            }
        }
    }

    /// Fetch each resource into the static partition. Individual failures
    /// are counted, not returned.
    async fn preload(&self, resources: &[String]) -> Result<PreloadReport, GatewayError> {
        let statics = self.partitions.open(PartitionKind::Static).await?;
        let results = join_all(resources.iter().map(|r| self.preload_one(&statics, r))).await;

        let stored = results.iter().filter(|stored| **stored).count();
        let report = PreloadReport {
            stored,
            failed: results.len() - stored,
        };
        info!(stored = report.stored, failed = report.failed, "Preloaded resources");
        Ok(report)
    }

    async fn preload_one(&self, statics: &Partition, resource: &str) -> bool {
        let url = match self.config.resolve(resource) {
            Ok(url) => url,
            Err(e) => {
                warn!(resource = resource, error = %e, "Skipping invalid preload resource");
                return false;
            }
        };
        let request = Request::get(url);
        match self.network.fetch(&request).await {
            Ok(response) if response.ok() => match statics.put_response(&request, response).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(url = %request.url, error = %e, "Failed to store preloaded resource");
                    false
                }
            },
            Ok(response) => {
                warn!(url = %request.url, status = response.status, "Preload returned non-success status");
                false
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Preload fetch failed");
                false
            }
        }
    }

    /// Wait for outstanding cache writes and revalidations.
    /// Hosts call this before letting the process be torn down.
    pub async fn wait_until_idle(&self) {
        self.tasks.wait_until_idle().await;
    }
}
