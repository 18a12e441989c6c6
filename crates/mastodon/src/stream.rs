//! Streaming-API side of [`MastodonClient`].
//!
//! Holds a server-sent-events connection to `/api/v1/streaming/...`
//! open and converts its frames into [`StreamEvent`]s. Failed connects
//! (the first one included) and dropped connections are retried with
//! doubling backoff; only a rejected access token ends the stream for
//! good.

use async_trait::async_trait;
use futures::StreamExt;
use mastomend_core::{Status, StreamError, StreamEvent, Timeline};
use reqwest::{StatusCode, header};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::MastodonClient;
use crate::api::{ApiNotification, error_message};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maps a configured timeline name onto its streaming endpoint.
fn streaming_path(timeline: &str) -> &'static str {
    match timeline {
        "public" => "/api/v1/streaming/public",
        "public:local" => "/api/v1/streaming/public/local",
        "user" => "/api/v1/streaming/user",
        other => {
            warn!(timeline = %other, "Unknown timeline, watching the public feed");
            "/api/v1/streaming/public"
        }
    }
}

#[async_trait]
impl Timeline for MastodonClient {
    fn name(&self) -> &str {
        &self.stream.timeline
    }

    async fn subscribe(
        &self,
    ) -> Result<mpsc::Receiver<Result<StreamEvent, StreamError>>, StreamError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let client = self.clone();
        let cancel = self.cancel.child_token();

        // Connecting happens inside the task, so a server that is briefly
        // down at startup gets retried exactly like one that drops later.
        tokio::spawn(async move {
            client.run_stream(tx, cancel).await;
        });

        Ok(rx)
    }

    async fn stop(&self) -> Result<(), StreamError> {
        self.shutdown();
        Ok(())
    }
}

impl MastodonClient {
    async fn open_stream(&self) -> Result<reqwest::Response, StreamError> {
        let url = self.api_url(streaming_path(&self.stream.timeline));
        debug!(url = %url, "Opening streaming connection");

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.bearer())
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::AuthRejected(error_message(&body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Streaming endpoint refused the connection");
            return Err(StreamError::Connect(format!(
                "HTTP {status}: {}",
                error_message(&body)
            )));
        }

        Ok(response)
    }

    /// Connection loop driving one subscription. Connect failures and
    /// dropped connections are retried silently with doubling, capped
    /// backoff; a rejected token is delivered to the receiver and ends
    /// the task.
    async fn run_stream(
        self,
        tx: mpsc::Sender<Result<StreamEvent, StreamError>>,
        cancel: CancellationToken,
    ) {
        let cap = Duration::from_secs(self.stream.reconnect_max_secs.max(1));
        let mut backoff = INITIAL_BACKOFF;
        let mut connected_before = false;

        loop {
            let response = match self.open_stream().await {
                Ok(response) => {
                    if connected_before {
                        info!(timeline = %self.stream.timeline, "Reconnected to streaming API");
                    } else {
                        info!(timeline = %self.stream.timeline, "Connected to streaming API");
                        connected_before = true;
                    }
                    response
                }
                Err(error) if error.is_fatal() => {
                    warn!(error = %error, "Streaming authentication revoked");
                    let _ = tx.send(Err(error)).await;
                    return;
                }
                Err(error) => {
                    warn!(error = %error, delay_secs = backoff.as_secs(), "Connect failed");
                    if !sleep_or_cancel(backoff, &cancel).await {
                        return;
                    }
                    backoff = (backoff * 2).min(cap);
                    continue;
                }
            };

            // A connection that made it this far is healthy.
            backoff = INITIAL_BACKOFF;

            if !self.read_events(response, &tx, &cancel).await {
                return;
            }

            warn!(delay_secs = backoff.as_secs(), "Stream dropped, reconnecting");
            if !sleep_or_cancel(backoff, &cancel).await {
                return;
            }
            backoff = (backoff * 2).min(cap);
        }
    }

    /// Reads one connection until it drops. Returns `false` when the
    /// task should end (cancelled or receiver gone), `true` to
    /// reconnect.
    async fn read_events(
        &self,
        response: reqwest::Response,
        tx: &mpsc::Sender<Result<StreamEvent, StreamError>>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut bytes = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut assembler = EventAssembler::default();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Streaming task stopped");
                    return false;
                }
                chunk = bytes.next() => chunk,
            };

            match chunk {
                None => {
                    warn!("Server closed the streaming connection");
                    return true;
                }
                Some(Err(error)) => {
                    warn!(error = %error, "Streaming connection interrupted");
                    return true;
                }
                Some(Ok(chunk)) => {
                    for line in lines.push_chunk(&chunk) {
                        let Some(frame) = assembler.push_line(&line) else {
                            continue;
                        };
                        let Some(event) = parse_frame(&frame.event, &frame.data) else {
                            continue;
                        };
                        if tx.send(Ok(event)).await.is_err() {
                            debug!("Event receiver dropped, closing stream");
                            return false;
                        }
                    }
                }
            }
        }
    }
}

/// Splits the response byte stream into lines. Chunks end wherever the
/// network cut them, so decoding waits until a full line is buffered;
/// a UTF-8 sequence split across two reads comes through intact.
#[derive(Debug, Default)]
struct LineBuffer {
    bytes: Vec<u8>,
}

impl LineBuffer {
    /// Appends a chunk and returns every line it completed, newline and
    /// trailing carriage return removed.
    fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(end) = self.bytes.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.bytes.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// One complete server-sent event, fields joined.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawFrame {
    event: String,
    data: String,
}

/// Incremental SSE frame assembly. Mastodon frames are an `event:`
/// line, a `data:` line, and a blank terminator; comment lines
/// (`:thump` heartbeats) arrive between frames.
#[derive(Debug, Default)]
struct EventAssembler {
    event: Option<String>,
    data: Vec<String>,
}

impl EventAssembler {
    /// Feeds one line; the completed frame comes back on the blank
    /// line that terminates it.
    fn push_line(&mut self, line: &str) -> Option<RawFrame> {
        if line.is_empty() {
            if self.data.is_empty() {
                self.event = None;
                return None;
            }
            let frame = RawFrame {
                event: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: self.data.join("\n"),
            };
            self.data.clear();
            return Some(frame);
        }

        if line.starts_with(':') {
            trace!(comment = %line, "Stream heartbeat");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // "id" and "retry" are legal SSE fields we have no use for.
            _ => {}
        }
        None
    }
}

/// Converts a raw frame into a [`StreamEvent`]. Frames we cannot
/// decode are logged and dropped; the stream keeps running.
fn parse_frame(event: &str, data: &str) -> Option<StreamEvent> {
    match event {
        "update" => match serde_json::from_str::<Status>(data) {
            Ok(status) => Some(StreamEvent::Update(status)),
            Err(error) => {
                warn!(error = %error, "Dropping undecodable update frame");
                None
            }
        },
        "notification" => match serde_json::from_str::<ApiNotification>(data) {
            Ok(notification) => Some(StreamEvent::Notification {
                kind: notification.kind,
                account: notification.account,
                status: notification.status,
            }),
            Err(error) => {
                warn!(error = %error, "Dropping undecodable notification frame");
                None
            }
        },
        // Delete frames carry the bare status id, not JSON. Some
        // servers quote it; accept both.
        "delete" => {
            let raw = data.trim();
            let status_id = serde_json::from_str::<String>(raw)
                .unwrap_or_else(|_| raw.to_string());
            if status_id.is_empty() {
                None
            } else {
                Some(StreamEvent::Delete { status_id })
            }
        }
        other => {
            trace!(event = %other, "Ignoring stream event");
            None
        }
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
