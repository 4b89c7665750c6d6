//! Terminal host: prints the gateway's host signals instead of acting on a browser.

use async_trait::async_trait;
use shellcache_core::{Host, HostError, Notification};
use tracing::info;

pub struct TerminalHost;

#[async_trait]
impl Host for TerminalHost {
    async fn skip_waiting(&self) -> Result<(), HostError> {
        info!("skip-waiting requested");
        Ok(())
    }

    async fn claim_clients(&self) -> Result<(), HostError> {
        info!("clients claimed");
        Ok(())
    }

    async fn show_notification(&self, notification: &Notification) -> Result<(), HostError> {
        println!("[notification] {}", notification.title);
        if !notification.body.is_empty() {
            println!("  {}", notification.body);
        }
        for action in &notification.actions {
            println!("  ({}) {}", action.action, action.title);
        }
        println!("  -> {}", notification.url);
        Ok(())
    }

    async fn close_notification(&self, _notification: &Notification) -> Result<(), HostError> {
        Ok(())
    }

    // No windows in a terminal, so nothing is ever focused
    async fn focus_client(&self, _url: &str) -> Result<bool, HostError> {
        Ok(false)
    }

    async fn open_window(&self, url: &str) -> Result<(), HostError> {
        println!("open {url}");
        Ok(())
    }
}
