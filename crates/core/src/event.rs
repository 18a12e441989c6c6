//! Bot lifecycle events, decoupled communication between bounded contexts.
//!
//! The orchestrator publishes an event at each significant step. Observers
//! (the session summary, tests) subscribe and filter for what they care
//! about without being wired into the reply pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All bot lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotEvent {
    /// The stream connection is up and delivering events
    StreamConnected {
        timeline: String,
        timestamp: DateTime<Utc>,
    },

    /// A status arrived on the watched timeline
    StatusSeen {
        status_id: String,
        author: String,
        timestamp: DateTime<Utc>,
    },

    /// The policy declined a status
    ReplySkipped {
        status_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A reply was posted successfully
    ReplyPublished {
        status_id: String,
        posted_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Generation failed and the status was dropped
    CompletionFailed {
        status_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Posting failed and the status was dropped
    PublishFailed {
        status_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for bot events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Slow consumers
/// miss events rather than stalling the pipeline.
pub struct EventBus {
    sender: broadcast::Sender<Arc<BotEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: BotEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BotEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
