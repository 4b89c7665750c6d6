use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Offline: {0}")]
    Offline(String),

    #[error("Background fetch was cancelled")]
    Aborted,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Partition not found: {0}")]
    PartitionMissing(String),

    #[error("Invalid partition name: {0}")]
    InvalidPartitionName(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CacheError::Io { path, source }
    }
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Error, Debug)]
#[error("Host operation failed: {0}")]
pub struct HostError(pub String);

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Failed to precache {url}: status {status}: {body}")]
    Install { url: String, status: u16, body: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

impl GatewayError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn install(url: &str, status: u16, body: &str) -> Self {
        GatewayError::Install {
            url: url.to_string(),
            status,
            body: Self::truncate_body(body),
        }
    }
}

pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_error_truncates_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let err = GatewayError::install("https://app.test/", 500, &body);
        let msg = err.to_string();
        assert!(msg.contains("truncated, 520 total bytes"));
        assert!(msg.starts_with("Failed to precache https://app.test/: status 500"));
    }

    #[test]
    fn test_install_error_keeps_short_body() {
        let err = GatewayError::install("https://app.test/", 404, "not found");
        assert_eq!(
            err.to_string(),
            "Failed to precache https://app.test/: status 404: not found"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = NetworkError::Timeout(Duration::from_millis(8000));
        assert_eq!(err.to_string(), "Request timed out after 8000ms");
    }
}
