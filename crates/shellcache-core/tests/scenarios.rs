//! End-to-end scenarios driven through the public gateway API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use shellcache_core::{
    CacheConfig, CacheStorage, CachedResponse, CachingGateway, DiskStorage, FetchOutcome, Host,
    HostError, MemoryStorage, Method, Network, NetworkError, Notification, Request,
};

/// Network that serves canned bodies, can be switched off, or hang forever
#[derive(Default)]
struct FakeNetwork {
    routes: Mutex<HashMap<String, (u16, String)>>,
    offline: Mutex<bool>,
    hanging: Mutex<bool>,
    calls: Mutex<usize>,
}

impl FakeNetwork {
    fn route(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
    }

    fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    fn set_hanging(&self, hanging: bool) {
        *self.hanging.lock().unwrap() = hanging;
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse, NetworkError> {
        *self.calls.lock().unwrap() += 1;
        if *self.hanging.lock().unwrap() {
            return std::future::pending().await;
        }
        if *self.offline.lock().unwrap() {
            return Err(NetworkError::Offline(request.url.clone()));
        }
        let route = self.routes.lock().unwrap().get(&request.url).cloned();
        match route {
            Some((status, body)) => Ok(CachedResponse::new(status).with_body(body)),
            None => Ok(CachedResponse::new(404)),
        }
    }
}

struct QuietHost;

#[async_trait]
impl Host for QuietHost {
    async fn skip_waiting(&self) -> Result<(), HostError> {
        Ok(())
    }

    async fn claim_clients(&self) -> Result<(), HostError> {
        Ok(())
    }

    async fn show_notification(&self, _notification: &Notification) -> Result<(), HostError> {
        Ok(())
    }

    async fn close_notification(&self, _notification: &Notification) -> Result<(), HostError> {
        Ok(())
    }

    async fn focus_client(&self, _url: &str) -> Result<bool, HostError> {
        Ok(false)
    }

    async fn open_window(&self, _url: &str) -> Result<(), HostError> {
        Ok(())
    }
}

fn gateway(version: &str, storage: Arc<dyn CacheStorage>, network: Arc<FakeNetwork>) -> CachingGateway {
    let config = CacheConfig::new("https://app.test", version).unwrap();
    CachingGateway::new(config, storage, network, Arc::new(QuietHost))
}

fn body_of(outcome: FetchOutcome) -> CachedResponse {
    match outcome {
        FetchOutcome::Responded(response) => response,
        FetchOutcome::Passthrough(request) => panic!("{} was not intercepted", request.url),
    }
}

#[tokio::test]
async fn static_asset_survives_going_offline_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(DiskStorage::new(dir.path().to_path_buf()).unwrap());
    let network = Arc::new(FakeNetwork::default());
    network.route("https://app.test/app.js", 200, "console.log(1)");
    let gw = gateway("1", storage.clone(), network.clone());

    let first = body_of(gw.on_fetch(Request::get("https://app.test/app.js")).await);
    assert_eq!(first.body, b"console.log(1)");
    gw.wait_until_idle().await;

    network.set_offline(true);
    let second = body_of(gw.on_fetch(Request::get("https://app.test/app.js")).await);
    assert_eq!(second.body, b"console.log(1)");
    assert_eq!(network.calls(), 1);

    // A fresh gateway over the same directory still has it
    let reopened = gateway("1", Arc::new(DiskStorage::new(dir.path().to_path_buf()).unwrap()), network.clone());
    let third = body_of(reopened.on_fetch(Request::get("https://app.test/app.js")).await);
    assert_eq!(third.body, b"console.log(1)");
}

#[tokio::test(start_paused = true)]
async fn hanging_api_falls_back_to_cache_within_timeout() {
    let network = Arc::new(FakeNetwork::default());
    network.route("https://app.test/api/items", 200, "[\"prior\"]");
    let gw = gateway("1", Arc::new(MemoryStorage::new()), network.clone());

    let fresh = gw.handle(&Request::get("https://app.test/api/items")).await;
    assert_eq!(fresh.body, b"[\"prior\"]");
    gw.wait_until_idle().await;

    network.set_hanging(true);
    let started = tokio::time::Instant::now();
    let resp = gw.handle(&Request::get("https://app.test/api/items")).await;
    let elapsed = started.elapsed();

    assert_eq!(resp.body, b"[\"prior\"]");
    assert!(elapsed >= Duration::from_millis(8000));
    assert!(elapsed < Duration::from_millis(8100));
}

#[tokio::test(start_paused = true)]
async fn hanging_api_without_cache_gets_408() {
    let network = Arc::new(FakeNetwork::default());
    network.set_hanging(true);
    let gw = gateway("1", Arc::new(MemoryStorage::new()), network);

    let started = tokio::time::Instant::now();
    let resp = gw.handle(&Request::get("https://app.test/api/items")).await;
    assert_eq!(resp.status, 408);
    assert!(started.elapsed() < Duration::from_millis(8100));
}

#[tokio::test]
async fn upgrade_evicts_previous_version() {
    let storage = Arc::new(MemoryStorage::new());
    let network = Arc::new(FakeNetwork::default());
    for path in ["/", "/index.html", "/manifest.json", "/offline.html"] {
        network.route(&format!("https://app.test{path}"), 200, "shell");
    }

    let v1 = gateway("1", storage.clone(), network.clone());
    v1.on_install().await.unwrap();
    v1.on_activate().await;

    let v2 = gateway("2", storage.clone(), network.clone());
    v2.on_install().await.unwrap();
    let purged = v2.on_activate().await;

    let mut purged = purged;
    purged.sort();
    assert_eq!(purged, vec!["dynamic-cache-v1", "image-cache-v1", "static-cache-v1"]);
    assert_eq!(
        storage.names().await.unwrap(),
        vec!["dynamic-cache-v2", "image-cache-v2", "static-cache-v2"]
    );
}

#[tokio::test]
async fn every_class_degrades_to_a_response() {
    let network = Arc::new(FakeNetwork::default());
    network.set_offline(true);
    let gw = gateway("1", Arc::new(MemoryStorage::new()), network);

    let cases = [
        Request::get("https://app.test/app.css"),
        Request::get("https://app.test/api/items"),
        Request::get("https://app.test/data.bin"),
        Request::get("https://abc.supabase.co/rest/v1/posts"),
    ];
    for request in cases {
        let resp = body_of(gw.on_fetch(request).await);
        assert_eq!(resp.status, 408);
    }

    let image = body_of(gw.on_fetch(Request::get("https://app.test/cat.webp")).await);
    assert_eq!(image.content_type(), Some("image/svg+xml"));

    let page = body_of(
        gw.on_fetch(Request::get("https://app.test/blogs").with_header("accept", "text/html"))
            .await,
    );
    assert_eq!(page.status, 200);
    assert_eq!(page.content_type(), Some("text/html; charset=utf-8"));
}

#[tokio::test]
async fn queued_mutation_replays_once() {
    let network = Arc::new(FakeNetwork::default());
    let gw = gateway("1", Arc::new(MemoryStorage::new()), network.clone());

    network.set_offline(true);
    let post = Request::new(Method::Post, "https://app.test/api/comments").with_body("{\"text\":\"hi\"}");
    let resp = body_of(gw.on_fetch(post).await);
    assert_eq!(resp.status, 408);

    network.set_offline(false);
    network.route("https://app.test/api/comments", 201, "{}");
    let first = gw.on_sync("background-sync").await.unwrap();
    assert_eq!(first.replayed, 1);

    let calls = network.calls();
    let second = gw.on_sync("background-sync").await.unwrap();
    assert!(second.is_empty());
    assert_eq!(network.calls(), calls);
}
