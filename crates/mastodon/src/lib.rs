//! Mastodon client for mastomend.
//!
//! One [`MastodonClient`] serves both halves of the bot's conversation
//! with the server: it implements [`mastomend_core::Timeline`] by
//! holding a server-sent-events connection to the streaming API open
//! (reconnecting with capped backoff when it drops), and implements
//! [`mastomend_core::Publisher`] for credential verification and
//! posting replies through the REST API.
//!
//! The API surface is the plain Mastodon v1 API, so any server that
//! speaks it (Pleroma, GoToSocial, ...) works unchanged.

mod api;
mod publish;
mod stream;

use std::time::Duration;

use mastomend_config::StreamConfig;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

/// HTTP client for a single Mastodon-compatible server.
///
/// Cloneable handles are cheap; the underlying connection pool is
/// shared. Dropping every handle does not stop a running stream
/// task, use [`MastodonClient::shutdown`] for that.
#[derive(Clone)]
pub struct MastodonClient {
    client: Client,
    base_url: String,
    access_token: String,
    stream: StreamConfig,
    cancel: CancellationToken,
}

impl MastodonClient {
    /// Creates a client for `base_url` authenticating with `access_token`.
    ///
    /// `base_url` must not carry a trailing slash; credential loading
    /// already normalizes this.
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        stream: StreamConfig,
    ) -> Self {
        // No overall timeout: the streaming connection is expected to
        // stay open for hours. REST calls set per-request timeouts.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            access_token: access_token.into(),
            stream,
            cancel: CancellationToken::new(),
        }
    }

    /// Signals the streaming task (if any) to close its connection
    /// and exit. Safe to call more than once.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for MastodonClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonClient")
            .field("base_url", &self.base_url)
            .field("access_token", &"[REDACTED]")
            .field("timeline", &self.stream.timeline)
            .finish()
    }
}
