//! shellcache - an offline-first HTTP caching gateway.
//!
//! The gateway sits between an application and the network. Every read it
//! intercepts is classified by resource type and resolved through one of
//! three caching strategies over three versioned cache partitions:
//!
//! - `static` partition: app shell and build assets, cache-first
//! - `image` partition: images, cache-first with a placeholder fallback
//! - `dynamic` partition: API calls (network-first with a timeout) and
//!   HTML navigations (stale-while-revalidate)
//!
//! When neither cache nor network can answer, a degraded substitute
//! response is synthesized instead of an error. Mutating API requests that
//! fail are queued in the `dynamic` partition and replayed on the next
//! background-sync signal.
//!
//! The host runtime (browser bridge, CLI, test harness) drives the gateway
//! through [`CachingGateway`] event methods and supplies the [`Network`],
//! [`CacheStorage`] and [`Host`] implementations.

pub mod classify;
pub mod config;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod host;
pub mod http;
pub mod network;
pub mod partition;
pub mod push;
pub mod queue;
pub mod storage;
pub mod strategy;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{classify, ResourceClass};
pub use config::{CacheConfig, QueuePolicy};
pub use error::{CacheError, ClassifyError, GatewayError, HostError, NetworkError, Result};
pub use gateway::{CachingGateway, ControlMessage, FetchOutcome, MessageReply, PreloadReport};
pub use host::Host;
pub use http::{CachedResponse, Method, Request};
pub use network::{HttpNetwork, Network};
pub use partition::{PartitionKind, PartitionManager};
pub use push::{Notification, NotificationAction, PushPayload};
pub use queue::SyncReport;
pub use storage::{CacheEntry, CacheStorage, DiskStorage, MemoryStorage, Partition};
