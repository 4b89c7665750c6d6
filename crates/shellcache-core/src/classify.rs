//! Request classification and the interception filter.
//!
//! `classify` is a pure function of the request and configuration. The
//! checks run in a fixed precedence order and the first match wins:
//!
//! 1. static asset (script, stylesheet or font extension)
//! 2. image (image extension, or an Accept header that only wants images)
//! 3. API call (path contains the API marker, or the host is a backing store)
//! 4. HTML navigation (Accept header includes `text/html`)
//! 5. other

use reqwest::Url;

use crate::config::CacheConfig;
use crate::error::ClassifyError;
use crate::http::{Method, Request};

const STATIC_EXTENSIONS: &[&str] = &["js", "mjs", "css", "woff", "woff2", "ttf", "otf", "eot"];

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "bmp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    StaticAsset,
    Image,
    ApiCall,
    HtmlNavigation,
    Other,
}

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StaticAsset => "static-asset",
            Self::Image => "image",
            Self::ApiCall => "api-call",
            Self::HtmlNavigation => "html-navigation",
            Self::Other => "other",
        }
    }
}

pub(crate) fn parse_url(url: &str) -> Result<Url, ClassifyError> {
    Url::parse(url).map_err(|e| ClassifyError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Lowercased extension of the last path segment, if any
fn extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Exact host or any subdomain of it. Substring containment is not enough:
/// `supabase.co.attacker.test` must not match `supabase.co`.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let pattern = pattern.to_ascii_lowercase();
    host == pattern
        || host
            .strip_suffix(pattern.as_str())
            .map(|prefix| prefix.ends_with('.'))
            .unwrap_or(false)
}

fn is_backing_store(url: &Url, config: &CacheConfig) -> bool {
    match url.host_str() {
        Some(host) => config
            .backing_store_hosts
            .iter()
            .any(|pattern| host_matches(host, pattern)),
        None => false,
    }
}

pub fn classify(request: &Request, config: &CacheConfig) -> Result<ResourceClass, ClassifyError> {
    let url = parse_url(&request.url)?;
    let ext = extension(&url);
    let ext = ext.as_deref();

    if ext.map(|e| STATIC_EXTENSIONS.contains(&e)).unwrap_or(false) {
        return Ok(ResourceClass::StaticAsset);
    }

    let wants_image = request
        .header("accept")
        .map(|accept| accept.starts_with("image/"))
        .unwrap_or(false);
    if wants_image || ext.map(|e| IMAGE_EXTENSIONS.contains(&e)).unwrap_or(false) {
        return Ok(ResourceClass::Image);
    }

    if url.path().contains(config.api_marker.as_str()) || is_backing_store(&url, config) {
        return Ok(ResourceClass::ApiCall);
    }

    if request.accepts_html() {
        return Ok(ResourceClass::HtmlNavigation);
    }

    Ok(ResourceClass::Other)
}

/// Same origin as the application, or an https URL on a trusted host.
pub fn is_trusted_origin(url: &Url, config: &CacheConfig) -> bool {
    if url.origin() == config.origin.origin() {
        return true;
    }
    if url.scheme() != "https" {
        return false;
    }
    match url.host_str() {
        Some(host) => config
            .trusted_hosts
            .iter()
            .chain(config.backing_store_hosts.iter())
            .any(|pattern| host_matches(host, pattern)),
        None => false,
    }
}

/// Whether reads for this request are handled by the gateway at all.
///
/// Only GET requests from a trusted origin are intercepted. A GET whose URL
/// does not parse is intercepted too, so it is answered by the fallback
/// instead of reaching the network.
pub fn intercepts(request: &Request, config: &CacheConfig) -> bool {
    if request.method != Method::Get {
        return false;
    }
    match parse_url(&request.url) {
        Ok(url) => is_trusted_origin(&url, config),
        Err(_) => true,
    }
}

/// Whether this is a mutating API request that gets queued when it fails
pub fn is_deferrable_mutation(request: &Request, config: &CacheConfig) -> bool {
    if !request.method.is_mutating() {
        return false;
    }
    let trusted = parse_url(&request.url)
        .map(|url| is_trusted_origin(&url, config))
        .unwrap_or(false);
    trusted && matches!(classify(request, config), Ok(ResourceClass::ApiCall))
}
