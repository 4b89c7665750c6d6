//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{CacheError, HostError, NetworkError};
use crate::host::Host;
use crate::http::{CachedResponse, Request};
use crate::network::Network;
use crate::push::Notification;
use crate::storage::{CacheEntry, CacheStorage, MemoryStorage};

#[derive(Clone)]
enum Script {
    Respond(u16, String),
    Fail,
    Hang,
    Gate(Arc<Notify>, u16, String),
}

/// Network answering from a per-URL script. Unscripted URLs fail as offline.
#[derive(Default)]
pub struct ScriptedNetwork {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<Request>>,
    offline: Mutex<bool>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, url: &str, script: Script) {
        self.scripts.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.script(url, Script::Respond(status, body.to_string()));
    }

    pub fn fail(&self, url: &str) {
        self.script(url, Script::Fail);
    }

    pub fn hang(&self, url: &str) {
        self.script(url, Script::Hang);
    }

    /// Respond only after the returned handle is notified
    pub fn gate(&self, url: &str, status: u16, body: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.script(url, Script::Gate(notify.clone(), status, body.to_string()));
        notify
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self, url: &str) -> Option<Request> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.url == url)
            .cloned()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse, NetworkError> {
        self.requests.lock().unwrap().push(request.clone());
        if *self.offline.lock().unwrap() {
            return Err(NetworkError::Offline(request.url.clone()));
        }

        let script = self.scripts.lock().unwrap().get(&request.url).cloned();
        match script {
            Some(Script::Respond(status, body)) => Ok(CachedResponse::new(status).with_body(body)),
            Some(Script::Gate(notify, status, body)) => {
                notify.notified().await;
                Ok(CachedResponse::new(status).with_body(body))
            }
            Some(Script::Hang) => std::future::pending().await,
            Some(Script::Fail) | None => Err(NetworkError::Offline(request.url.clone())),
        }
    }
}

/// Host that records every call as a short event string
#[derive(Default)]
pub struct RecordingHost {
    events: Mutex<Vec<String>>,
    focus_result: Mutex<bool>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_focus_result(&self, focused: bool) {
        *self.focus_result.lock().unwrap() = focused;
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn skip_waiting(&self) -> Result<(), HostError> {
        self.record("skip_waiting".to_string());
        Ok(())
    }

    async fn claim_clients(&self) -> Result<(), HostError> {
        self.record("claim_clients".to_string());
        Ok(())
    }

    async fn show_notification(&self, notification: &Notification) -> Result<(), HostError> {
        self.record(format!("show:{}", notification.title));
        Ok(())
    }

    async fn close_notification(&self, notification: &Notification) -> Result<(), HostError> {
        self.record(format!("close:{}", notification.title));
        Ok(())
    }

    async fn focus_client(&self, url: &str) -> Result<bool, HostError> {
        self.record(format!("focus:{url}"));
        Ok(*self.focus_result.lock().unwrap())
    }

    async fn open_window(&self, url: &str) -> Result<(), HostError> {
        self.record(format!("open:{url}"));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    Create,
    Remove,
    Put,
    Delete,
}

/// In-memory storage that fails chosen operations. The target is a
/// partition name for `Create`/`Remove` and an entry key for `Put`/`Delete`.
#[derive(Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    broken: Mutex<HashSet<(StorageOp, String)>>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn break_op(&self, op: StorageOp, target: &str) {
        self.broken.lock().unwrap().insert((op, target.to_string()));
    }

    fn check(&self, op: StorageOp, target: &str) -> Result<(), CacheError> {
        if self.broken.lock().unwrap().contains(&(op, target.to_string())) {
            return Err(CacheError::Io {
                path: target.into(),
                source: io::Error::new(io::ErrorKind::Other, "injected failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn names(&self) -> Result<Vec<String>, CacheError> {
        self.inner.names().await
    }

    async fn create(&self, partition: &str) -> Result<(), CacheError> {
        self.check(StorageOp::Create, partition)?;
        self.inner.create(partition).await
    }

    async fn remove(&self, partition: &str) -> Result<bool, CacheError> {
        self.check(StorageOp::Remove, partition)?;
        self.inner.remove(partition).await
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.inner.get(partition, key).await
    }

    async fn put(&self, partition: &str, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.check(StorageOp::Put, key)?;
        self.inner.put(partition, key, entry).await
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError> {
        self.check(StorageOp::Delete, key)?;
        self.inner.delete(partition, key).await
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>, CacheError> {
        self.inner.keys(partition).await
    }
}
