//! Push messages and the notifications they produce.
//!
//! Payload shape: `{ title, body, tag?, actions?, data?: { url } }`. The
//! notification remembers the URL to open when it is clicked; the site root
//! is used when the payload does not carry one.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[cfg(feature = "ts")]
use ts_rs::TS;

const DEFAULT_TITLE: &str = "New notification";
const DEFAULT_URL: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct PushData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PushData>,
}

/// A notification ready for the host to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: Option<String>,
    pub actions: Vec<NotificationAction>,
    /// Opened or focused when the notification is clicked
    pub url: String,
}

impl From<PushPayload> for Notification {
    fn from(payload: PushPayload) -> Self {
        let url = payload
            .data
            .and_then(|d| d.url)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        Self {
            title: payload.title,
            body: payload.body,
            tag: payload.tag,
            actions: payload.actions,
            url,
        }
    }
}

impl Notification {
    /// Build a notification from raw push data.
    ///
    /// A missing payload gets a generic title; a payload that is not valid
    /// JSON is shown as the notification body.
    pub fn from_push(data: Option<&[u8]>) -> Self {
        let data = match data {
            Some(data) if !data.is_empty() => data,
            _ => return Self::plain(String::new()),
        };

        match serde_json::from_slice::<PushPayload>(data) {
            Ok(payload) => payload.into(),
            Err(e) => {
                warn!(error = %e, "Push payload is not valid JSON, showing as text");
                Self::plain(String::from_utf8_lossy(data).into_owned())
            }
        }
    }

    fn plain(body: String) -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            body,
            tag: None,
            actions: Vec::new(),
            url: DEFAULT_URL.to_string(),
        }
    }
}
