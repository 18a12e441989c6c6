//! Wire types for the Mastodon REST and streaming APIs.
//!
//! Servers attach many more fields than we read; everything here is
//! deny-nothing serde so payloads from different fediverse software
//! (Mastodon, Pleroma, GoToSocial) decode as long as the fields we
//! rely on are present.

use mastomend_core::{Account, NotificationKind, Status, Visibility};
use serde::{Deserialize, Serialize};

/// Notification payload carried by `event: notification` frames.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiNotification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub account: Account,
    #[serde(default)]
    pub status: Option<Status>,
}

/// Body for `POST /api/v1/statuses`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct PostStatusRequest<'a> {
    pub status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<&'a str>,
    pub visibility: &'a str,
}

impl<'a> PostStatusRequest<'a> {
    pub fn reply(body: &'a str, in_reply_to_id: &'a str, visibility: Visibility) -> Self {
        Self {
            status: body,
            in_reply_to_id: Some(in_reply_to_id),
            visibility: visibility.as_str(),
        }
    }
}

/// Subset of the status returned by a successful post.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PostedStatus {
    pub id: String,
}

/// Error body most servers return alongside non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    pub error: String,
}

/// Extracts a human-readable message from an error response body,
/// falling back to the raw text when it is not the usual JSON shape.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string())
}
