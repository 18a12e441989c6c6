//! Timeline trait and stream events, the abstraction over the server's
//! streaming API.
//!
//! A [`Timeline`] connects the bot to a Mastodon-compatible streaming
//! endpoint and yields [`StreamEvent`]s. The implementation owns the
//! connection, reconnects on drops, and only surfaces errors the caller can
//! act on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::status::{Account, Status};

/// One event delivered over the streaming connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StreamEvent {
    /// A new status appeared on the watched timeline.
    Update(Status),

    /// Something happened to the bot's own account (a mention, a follow).
    /// `status` is present for mention notifications.
    Notification {
        kind: NotificationKind,
        account: Account,
        status: Option<Status>,
    },

    /// A status was deleted; only the id is delivered.
    Delete { status_id: String },
}

impl StreamEvent {
    /// Short name for logging and metrics.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Update(_) => "update",
            StreamEvent::Notification { .. } => "notification",
            StreamEvent::Delete { .. } => "delete",
        }
    }

    /// The status this event carries, if any.
    pub fn status(&self) -> Option<&Status> {
        match self {
            StreamEvent::Update(status) => Some(status),
            StreamEvent::Notification { status, .. } => status.as_ref(),
            StreamEvent::Delete { .. } => None,
        }
    }
}

/// Kinds of account notifications a server can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Mention,
    Follow,
    Favourite,
    Reblog,
    #[serde(other)]
    Other,
}

/// The streaming side of the social network.
///
/// Implementations handle the transport (SSE framing, heartbeats,
/// reconnection with backoff) internally. The receiver yields events until
/// the timeline is stopped or a fatal error is delivered; after a fatal
/// error no further events follow.
#[async_trait]
pub trait Timeline: Send + Sync {
    /// Human-readable name of the watched timeline (e.g. "public").
    fn name(&self) -> &str;

    /// Open the stream and start delivering events.
    async fn subscribe(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamEvent, StreamError>>,
        StreamError,
    >;

    /// Stop the stream gracefully.
    async fn stop(&self) -> std::result::Result<(), StreamError> {
        Ok(())
    }
}
