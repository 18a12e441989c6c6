//! Error types for the mastomend domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; fatal and retryable
//! classification lives with the error so callers never match on strings.

use thiserror::Error;

/// The top-level error type for all mastomend operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Stream errors ---
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    // --- Completion errors ---
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    // --- Publish errors ---
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error must stop the bot rather than be retried or dropped.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Stream(e) => e.is_fatal(),
            Error::Completion(e) => e.is_fatal(),
            Error::Publish(e) => e.is_fatal(),
            Error::Config { .. } => true,
            Error::Serialization(_) => false,
            Error::Internal(_) => false,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from the streaming connection to the social network.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("Access token rejected by the server: {0}")]
    AuthRejected(String),

    #[error("Failed to open stream connection: {0}")]
    Connect(String),

    #[error("Stream connection interrupted: {0}")]
    Interrupted(String),

    #[error("Malformed stream event: {0}")]
    InvalidEvent(String),
}

impl StreamError {
    /// Only a rejected token stops the stream for good; everything else
    /// is handled by the reconnect loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StreamError::AuthRejected(_))
    }
}

/// Errors from the LLM completion API.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by the completion API")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid completion request: {0}")]
    InvalidRequest(String),

    #[error("Completion request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl CompletionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CompletionError::AuthenticationFailed(_))
    }

    /// Whether a retry may succeed. `Timeout` is retryable but the retry
    /// policy only grants it a single extra attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::RateLimited { .. }
            | CompletionError::Timeout(_)
            | CompletionError::Network(_) => true,
            CompletionError::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

/// Errors from posting a status back to the social network.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by the server")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Reply target not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl PublishError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PublishError::AuthenticationFailed(_))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::RateLimited { .. } | PublishError::Network(_) => true,
            PublishError::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}
