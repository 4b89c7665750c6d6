//! Network access for the strategies.
//!
//! `Network` is the seam the strategies fetch through; `HttpNetwork` is the
//! reqwest-backed implementation hosts use outside of tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::debug;

use crate::error::NetworkError;
use crate::http::{CachedResponse, Headers, Request};

/// Transport-level request timeout in seconds.
/// Only Network-First races a shorter timer; other strategies run to completion.
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Any HTTP status is a successful fetch; only
    /// transport failures are errors.
    async fn fetch(&self, request: &Request) -> Result<CachedResponse, NetworkError>;
}

/// Race a fetch against a timer. Dropping the losing fetch future cancels
/// the in-flight request.
pub async fn fetch_with_timeout(
    network: &dyn Network,
    request: &Request,
    timeout: Duration,
) -> Result<CachedResponse, NetworkError> {
    match tokio::time::timeout(timeout, network.fetch(request)).await {
        Ok(result) => result,
        Err(_) => {
            debug!(url = %request.url, timeout_ms = timeout.as_millis() as u64, "Network fetch timed out");
            Err(NetworkError::Timeout(timeout))
        }
    }
}

/// Network implementation over reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    fn build_headers(request: &Request) -> Result<header::HeaderMap, NetworkError> {
        let mut headers = header::HeaderMap::new();
        for (name, value) in &request.headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NetworkError::InvalidRequest(format!("header {}: {}", name, e)))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| NetworkError::InvalidRequest(format!("header {}: {}", name, e)))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn collect_headers(map: &header::HeaderMap) -> Headers {
        map.iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<CachedResponse, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .headers(Self::build_headers(request)?);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = Self::collect_headers(response.headers());
        let body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status = status, bytes = body.len(), "Network fetch complete");
        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::testing::ScriptedNetwork;

    #[test]
    fn test_build_headers_rejects_invalid_values() {
        let req = Request::get("https://app.test/").with_header("x-bad", "line\nbreak");
        assert!(matches!(
            HttpNetwork::build_headers(&req),
            Err(NetworkError::InvalidRequest(_))
        ));

        let req = Request::new(Method::Post, "https://app.test/").with_header("Accept", "text/html");
        let headers = HttpNetwork::build_headers(&req).unwrap();
        assert_eq!(headers.get("accept").unwrap(), "text/html");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_timeout_fires() {
        let network = ScriptedNetwork::new();
        network.hang("https://app.test/api/slow");

        let start = tokio::time::Instant::now();
        let result = fetch_with_timeout(
            &network,
            &Request::get("https://app.test/api/slow"),
            Duration::from_millis(8000),
        )
        .await;

        assert!(matches!(result, Err(NetworkError::Timeout(_))));
        assert!(start.elapsed() >= Duration::from_millis(8000));
        assert!(start.elapsed() < Duration::from_millis(8100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_with_timeout_passes_through_fast_response() {
        let network = ScriptedNetwork::new();
        network.respond("https://app.test/api/items", 200, "[1]");

        let result = fetch_with_timeout(
            &network,
            &Request::get("https://app.test/api/items"),
            Duration::from_millis(8000),
        )
        .await
        .unwrap();
        assert_eq!(result.body, b"[1]");
    }
}
