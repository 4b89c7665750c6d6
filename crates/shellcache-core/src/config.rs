//! Gateway configuration.
//!
//! A `CacheConfig` is built once by the host and shared read-only by every
//! component. Partition names embed the version tag, so bumping the version
//! makes the next activation purge every partition of the previous build.

use std::time::Duration;

use reqwest::Url;

use crate::error::ClassifyError;
use crate::partition::{partition_name, PartitionKind};

// ============================================================================
// Constants
// ============================================================================

/// Network-first race timeout in milliseconds.
pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 8000;

/// Tag carried by the background-sync signal that triggers mutation replay.
pub const SYNC_TAG: &str = "background-sync";

/// Paths precached on install when the host does not supply its own manifest.
const DEFAULT_MANIFEST: &[&str] = &["/", "/index.html", "/manifest.json", "/offline.html"];

const DEFAULT_OFFLINE_PAGE: &str = "/offline.html";

const DEFAULT_API_MARKER: &str = "/api/";

const DEFAULT_BACKING_STORE_HOSTS: &[&str] = &["supabase.co"];

/// Font and CDN hosts whose GET requests are intercepted despite being cross-origin.
const DEFAULT_TRUSTED_HOSTS: &[&str] = &[
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "cdn.jsdelivr.net",
];

/// Replay attempts before a queued mutation is dropped.
const DEFAULT_MAX_REPLAY_ATTEMPTS: u32 = 5;

/// Age in hours after which a queued mutation is dropped unreplayed.
const DEFAULT_MAX_QUEUE_AGE_HOURS: i64 = 24;

/// Retention policy for the deferred mutation queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    pub max_attempts: u32,
    pub max_age: chrono::Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_REPLAY_ATTEMPTS,
            max_age: chrono::Duration::hours(DEFAULT_MAX_QUEUE_AGE_HOURS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub version: String,
    pub origin: Url,
    pub static_name: String,
    pub dynamic_name: String,
    pub image_name: String,
    pub manifest: Vec<String>,
    pub offline_page: String,
    pub api_marker: String,
    pub backing_store_hosts: Vec<String>,
    pub trusted_hosts: Vec<String>,
    pub network_timeout: Duration,
    pub queue_policy: QueuePolicy,
}

impl CacheConfig {
    pub fn new(origin: &str, version: &str) -> Result<Self, ClassifyError> {
        let origin = Url::parse(origin).map_err(|e| ClassifyError::InvalidUrl {
            url: origin.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            version: version.to_string(),
            origin,
            static_name: partition_name(PartitionKind::Static, version),
            dynamic_name: partition_name(PartitionKind::Dynamic, version),
            image_name: partition_name(PartitionKind::Image, version),
            manifest: DEFAULT_MANIFEST.iter().map(|p| p.to_string()).collect(),
            offline_page: DEFAULT_OFFLINE_PAGE.to_string(),
            api_marker: DEFAULT_API_MARKER.to_string(),
            backing_store_hosts: DEFAULT_BACKING_STORE_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            trusted_hosts: DEFAULT_TRUSTED_HOSTS.iter().map(|h| h.to_string()).collect(),
            network_timeout: Duration::from_millis(DEFAULT_NETWORK_TIMEOUT_MS),
            queue_policy: QueuePolicy::default(),
        })
    }

    pub fn with_manifest<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.manifest = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_offline_page(mut self, path: impl Into<String>) -> Self {
        self.offline_page = path.into();
        self
    }

    pub fn with_api_marker(mut self, marker: impl Into<String>) -> Self {
        self.api_marker = marker.into();
        self
    }

    /// Add a backing-store host. Requests to it are API calls and are trusted.
    pub fn with_backing_store_host(mut self, host: impl Into<String>) -> Self {
        self.backing_store_hosts.push(host.into());
        self
    }

    pub fn with_trusted_host(mut self, host: impl Into<String>) -> Self {
        self.trusted_hosts.push(host.into());
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn with_queue_policy(mut self, policy: QueuePolicy) -> Self {
        self.queue_policy = policy;
        self
    }

    pub fn partition_name(&self, kind: PartitionKind) -> &str {
        match kind {
            PartitionKind::Static => &self.static_name,
            PartitionKind::Dynamic => &self.dynamic_name,
            PartitionKind::Image => &self.image_name,
        }
    }

    /// The partition names that survive activation
    pub fn current_partitions(&self) -> [&str; 3] {
        [&self.static_name, &self.dynamic_name, &self.image_name]
    }

    /// Resolve a path or URL against the origin.
    pub fn resolve(&self, path: &str) -> Result<String, ClassifyError> {
        self.origin
            .join(path)
            .map(String::from)
            .map_err(|e| ClassifyError::InvalidUrl {
                url: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// Absolute URL of the offline fallback page
    pub fn offline_page_url(&self) -> Result<String, ClassifyError> {
        self.resolve(&self.offline_page)
    }
}
