//! Google Gemini completion backend.
//!
//! Speaks the `generateContent` REST API: one POST per completion,
//! API key in the `x-goog-api-key` header, generation parameters in
//! the body. Safety blocks are surfaced as [`CompletionError::InvalidRequest`]
//! so the caller drops the reply instead of retrying or posting a
//! placeholder.

use async_trait::async_trait;
use mastomend_config::LlmConfig;
use mastomend_core::{Completion, CompletionError, CompletionRequest, Provider};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini REST client. One instance per configured API key.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        request: CompletionRequest,
    ) -> Result<Completion, CompletionError> {
        let url = self.generate_url(&request.model);
        let body = GenerateRequest::from_request(&request);

        debug!(
            model = %request.model,
            prompt_chars = request.prompt.chars().count(),
            "Requesting completion"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout(e.to_string())
                } else {
                    CompletionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(CompletionError::RateLimited { retry_after_secs });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::AuthenticationFailed(error_message(&body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            warn!(status = %status, body = %body, "Completion API returned error");

            // Gemini reports a revoked or malformed key as 400
            // INVALID_ARGUMENT rather than 401.
            if status == StatusCode::BAD_REQUEST {
                if message.contains("API key") {
                    return Err(CompletionError::AuthenticationFailed(message));
                }
                return Err(CompletionError::InvalidRequest(message));
            }
            return Err(CompletionError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let payload: GenerateResponse =
            response.json().await.map_err(|e| CompletionError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let text = extract_text(payload)?;
        Ok(Completion {
            text,
            model: request.model,
        })
    }

    /// Fetches the configured model's metadata, which exercises both
    /// reachability and the API key.
    async fn health_check(&self) -> Result<bool, CompletionError> {
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

/// Pulls the generated text out of a response, refusing blocked or
/// empty generations.
fn extract_text(response: GenerateResponse) -> Result<String, CompletionError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(CompletionError::InvalidRequest(format!(
            "Prompt blocked: {reason}"
        )));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(CompletionError::InvalidRequest(
            "No candidates in response".into(),
        ));
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if matches!(reason, "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST") {
            return Err(CompletionError::InvalidRequest(format!(
                "Generation blocked: {reason}"
            )));
        }
    }

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(CompletionError::InvalidRequest("Empty completion".into()));
    }
    Ok(text)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

// Wire types. Gemini is camelCase throughout; parts may carry
// non-text payloads we ignore.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    generation_config: ApiGenerationConfig,
}

impl GenerateRequest {
    fn from_request(request: &CompletionRequest) -> Self {
        Self {
            contents: vec![ApiContent::text(&request.prompt)],
            system_instruction: request.system.as_deref().map(ApiContent::text),
            generation_config: ApiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}

impl ApiContent {
    fn text(text: &str) -> Self {
        Self {
            parts: vec![ApiPart {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
