//! Signals the gateway sends back to its host runtime.

use async_trait::async_trait;

use crate::error::HostError;
use crate::push::Notification;

/// Runtime operations outside the cache: lifecycle signals, notifications
/// and application windows. A browser bridge maps these onto the service
/// worker globals; the CLI host prints them.
#[async_trait]
pub trait Host: Send + Sync {
    /// Take over without waiting for existing instances to close
    async fn skip_waiting(&self) -> Result<(), HostError>;

    /// Start controlling every open application instance immediately
    async fn claim_clients(&self) -> Result<(), HostError>;

    async fn show_notification(&self, notification: &Notification) -> Result<(), HostError>;

    async fn close_notification(&self, notification: &Notification) -> Result<(), HostError>;

    /// Focus an open instance already showing `url`. Returns false if none is open.
    async fn focus_client(&self, url: &str) -> Result<bool, HostError>;

    async fn open_window(&self, url: &str) -> Result<(), HostError>;
}
