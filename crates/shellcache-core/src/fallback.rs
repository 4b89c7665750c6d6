//! Offline fallback responses.
//!
//! Used whenever neither the cache nor the network produced a response.
//! Nothing here fails: the caller always gets a well-formed response, and
//! every synthesized response carries `x-shellcache-fallback` so the
//! application can tell it apart from real content.

use tracing::{debug, warn};

use crate::http::{CachedResponse, Request};
use crate::storage::Partition;

/// Header marking a synthesized response
pub const FALLBACK_HEADER: &str = "x-shellcache-fallback";

/// Header marking a mutation that was queued for background sync
pub const QUEUED_HEADER: &str = "x-shellcache-queued";

const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Offline</title>
  <style>
    body { font-family: system-ui, sans-serif; display: flex; align-items: center;
           justify-content: center; min-height: 100vh; margin: 0; background: #f9fafb; color: #111827; }
    main { text-align: center; padding: 2rem; }
  </style>
</head>
<body>
  <main>
    <h1>You are offline</h1>
    <p>This page is not available offline. Check your connection and try again.</p>
  </main>
</body>
</html>
"#;

const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200"><rect width="200" height="200" fill="#f3f4f6"/><text x="100" y="100" font-family="sans-serif" font-size="14" fill="#9ca3af" text-anchor="middle" dominant-baseline="middle">Image unavailable</text></svg>"##;

const TIMEOUT_TEXT: &str = "Network request failed and no cached response is available";

const QUEUED_TEXT: &str = "Network request failed; the request was queued for background sync";

/// Minimal inline HTML page announcing offline status
pub fn offline_document() -> CachedResponse {
    CachedResponse::new(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_header(FALLBACK_HEADER, "offline-page")
        .with_body(OFFLINE_HTML)
}

/// Labeled placeholder graphic. `no-cache` keeps it from being stored as
/// if it were the real image.
pub fn placeholder_image() -> CachedResponse {
    CachedResponse::new(200)
        .with_header("content-type", "image/svg+xml")
        .with_header("cache-control", "no-cache")
        .with_header(FALLBACK_HEADER, "placeholder-image")
        .with_body(PLACEHOLDER_SVG)
}

/// 408 response for data requests that could not be served
pub fn request_timeout() -> CachedResponse {
    CachedResponse::new(408)
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_header(FALLBACK_HEADER, "timeout")
        .with_body(TIMEOUT_TEXT)
}

/// 408 response for a mutation that was stored for later replay
pub fn queued_mutation() -> CachedResponse {
    CachedResponse::new(408)
        .with_header("content-type", "text/plain; charset=utf-8")
        .with_header(FALLBACK_HEADER, "queued")
        .with_header(QUEUED_HEADER, "1")
        .with_body(QUEUED_TEXT)
}

/// Pick a substitute response for a request that could not be served.
///
/// HTML requests get the precached offline page when `statics` holds it,
/// otherwise the inline document. Everything else gets a 408.
pub async fn synthesize(
    request: &Request,
    statics: Option<&Partition>,
    offline_page_url: Option<&str>,
) -> CachedResponse {
    if !request.accepts_html() {
        return request_timeout();
    }

    if let (Some(statics), Some(url)) = (statics, offline_page_url) {
        match statics.match_request(&Request::get(url)).await {
            Ok(Some(page)) => {
                debug!(url = %request.url, "Serving cached offline page");
                return page;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to read cached offline page"),
        }
    }
    offline_document()
}
