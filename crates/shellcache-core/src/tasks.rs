//! Tracking for fire-and-forget work.
//!
//! Cache population and revalidation run after the response has already
//! been handed back. The host must not tear the process down while such
//! work is outstanding, so every spawned task is kept here until
//! `wait_until_idle` has seen it finish.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of tasks not yet observed as finished
    pub fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Wait for every task spawned so far, including tasks spawned while waiting.
    pub async fn wait_until_idle(&self) {
        loop {
            let batch: Vec<_> = {
                let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
                handles.drain(..).collect()
            };
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background task failed");
                }
            }
        }
    }
}
