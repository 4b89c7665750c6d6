//! Host-agnostic request and response types.
//!
//! These are the values that flow between the host, the strategies and the
//! partitions. Header names are stored lowercase so lookups are
//! case-insensitive without a dedicated header map type.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

pub type Headers = BTreeMap<String, String>;

/// Number of hex characters of the body digest appended to request keys
const BODY_DIGEST_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }

    /// Parse a method name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            "OPTIONS" => Some(Self::Options),
            _ => None,
        }
    }

    /// Methods that change server state and are eligible for deferred replay
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch | Self::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    pub url: String,
    #[serde(default, deserialize_with = "lowercase_headers")]
    pub headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

/// Hosts may send header names in any case
fn lowercase_headers<'de, D>(deserializer: D) -> Result<Headers, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Headers::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect())
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// True when the Accept header asks for an HTML document
    pub fn accepts_html(&self) -> bool {
        self.header("accept")
            .map(|accept| accept.contains("text/html"))
            .unwrap_or(false)
    }

    /// Identity of this request inside a partition.
    ///
    /// `METHOD URL`, plus a short body digest when a body is present so two
    /// different payloads sent to the same endpoint get distinct keys.
    pub fn cache_key(&self) -> String {
        match self.body {
            Some(ref body) => {
                let digest = hex::encode(Sha256::digest(body));
                format!("{} {}#{}", self.method, self.url, &digest[..BODY_DIGEST_LEN])
            }
            None => format!("{} {}", self.method, self.url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// 2xx responses are the only ones written to a partition
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn status_text(&self) -> &'static str {
        status_text_for(self.status)
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn status_text_for(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_name() {
        assert_eq!(Method::from_name("get"), Some(Method::Get));
        assert_eq!(Method::from_name("Post"), Some(Method::Post));
        assert_eq!(Method::from_name("TRACE"), None);
    }

    #[test]
    fn test_method_is_mutating() {
        assert!(Method::Post.is_mutating());
        assert!(Method::Delete.is_mutating());
        assert!(!Method::Get.is_mutating());
        assert!(!Method::Head.is_mutating());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let req = Request::get("https://app.test/").with_header("Accept", "text/html");
        assert_eq!(req.header("accept"), Some("text/html"));
        assert_eq!(req.header("ACCEPT"), Some("text/html"));
        assert!(req.accepts_html());
    }

    #[test]
    fn test_deserialized_header_names_are_lowercased() {
        let req: Request = serde_json::from_str(
            r#"{"method":"GET","url":"https://app.test/about","headers":{"Accept":"text/html","X-Trace":"1"}}"#,
        )
        .unwrap();
        assert!(req.accepts_html());
        assert_eq!(req.headers.get("x-trace").map(String::as_str), Some("1"));
        assert!(!req.headers.contains_key("Accept"));
    }

    #[test]
    fn test_cache_key_without_body() {
        let req = Request::get("https://app.test/app.js").with_header("accept", "*/*");
        assert_eq!(req.cache_key(), "GET https://app.test/app.js");
    }

    #[test]
    fn test_cache_key_distinguishes_bodies() {
        let a = Request::new(Method::Post, "https://app.test/api/items").with_body("{\"a\":1}");
        let b = Request::new(Method::Post, "https://app.test/api/items").with_body("{\"a\":2}");
        assert_ne!(a.cache_key(), b.cache_key());
        assert!(a.cache_key().starts_with("POST https://app.test/api/items#"));
        assert_eq!(a.cache_key().len(), "POST https://app.test/api/items#".len() + 16);
    }

    #[test]
    fn test_response_ok_range() {
        assert!(CachedResponse::new(200).ok());
        assert!(CachedResponse::new(204).ok());
        assert!(!CachedResponse::new(304).ok());
        assert!(!CachedResponse::new(408).ok());
        assert_eq!(CachedResponse::new(408).status_text(), "Request Timeout");
    }
}
