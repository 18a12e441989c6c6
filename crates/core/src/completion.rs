//! Provider trait, the abstraction over LLM completion backends.
//!
//! A Provider turns a prompt into generated text. The orchestrator calls
//! `generate()` without knowing which backend is behind it, which keeps the
//! reply pipeline testable with scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

/// One completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g. "gemini-1.5-flash")
    pub model: String,

    /// The user-facing prompt text
    pub prompt: String,

    /// Optional system instruction fixing the bot's persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Cap on generated tokens
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_output_tokens() -> u32 {
    256
}

impl CompletionRequest {
    /// A request with default generation parameters.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub text: String,

    /// Which model actually responded
    pub model: String,
}

/// The core Provider trait.
///
/// A call either yields text or a [`CompletionError`]; retries are the
/// caller's concern (see the retry wrapper in the providers crate) so
/// implementations stay single-shot.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g. "gemini").
    fn name(&self) -> &str;

    /// Send one request and get the completed text.
    async fn generate(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, CompletionError>;

    /// Health check: can we reach the backend with the configured key?
    async fn health_check(&self) -> std::result::Result<bool, CompletionError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req = CompletionRequest::new("gemini-1.5-flash", "hello");
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(req.max_output_tokens, 256);
        assert!(req.system.is_none());
    }

    #[test]
    fn request_with_system_instruction() {
        let req = CompletionRequest::new("gemini-1.5-flash", "hello")
            .with_system("You are a supportive listener.");
        assert_eq!(req.system.as_deref(), Some("You are a supportive listener."));
    }

    #[test]
    fn request_serializes_without_empty_system() {
        let req = CompletionRequest::new("gemini-1.5-flash", "hello");
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("system"));
    }
}
