//! REST side of [`MastodonClient`]: credential verification and
//! posting replies.

use async_trait::async_trait;
use mastomend_core::{Account, OutboundReply, PostedId, PublishError, Publisher};
use reqwest::header::{self, HeaderMap};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

use crate::MastodonClient;
use crate::api::{PostStatusRequest, PostedStatus, error_message};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[async_trait]
impl Publisher for MastodonClient {
    async fn verify_credentials(&self) -> Result<Account, PublishError> {
        let url = self.api_url("/api/v1/accounts/verify_credentials");
        debug!(url = %url, "Verifying credentials");

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.bearer())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Credential verification failed");
            return Err(map_error(status, &headers, &body));
        }

        response
            .json::<Account>()
            .await
            .map_err(|e| PublishError::ApiError {
                status_code: 200,
                message: format!("Failed to parse account: {e}"),
            })
    }

    async fn post_reply(&self, reply: &OutboundReply) -> Result<PostedId, PublishError> {
        let url = self.api_url("/api/v1/statuses");
        let request =
            PostStatusRequest::reply(&reply.body, &reply.in_reply_to_id, reply.visibility);

        debug!(
            in_reply_to_id = %reply.in_reply_to_id,
            visibility = %reply.visibility,
            chars = reply.body.chars().count(),
            "Posting reply"
        );

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, self.bearer())
            // The key is derived from the target status, so resending
            // after an ambiguous network failure cannot double-post.
            .header(IDEMPOTENCY_HEADER, idempotency_key(reply))
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(|e| PublishError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Posting reply failed");
            return Err(map_error(status, &headers, &body));
        }

        let posted = response
            .json::<PostedStatus>()
            .await
            .map_err(|e| PublishError::ApiError {
                status_code: 200,
                message: format!("Failed to parse posted status: {e}"),
            })?;

        debug!(posted_id = %posted.id, "Reply posted");
        Ok(PostedId(posted.id))
    }
}

fn idempotency_key(reply: &OutboundReply) -> String {
    format!("mastomend-{}", reply.in_reply_to_id)
}

fn map_error(status: StatusCode, headers: &HeaderMap, body: &str) -> PublishError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return PublishError::RateLimited {
            retry_after_secs: parse_retry_after(headers),
        };
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return PublishError::AuthenticationFailed(error_message(body));
    }
    if status == StatusCode::NOT_FOUND {
        return PublishError::NotFound(error_message(body));
    }
    PublishError::ApiError {
        status_code: status.as_u16(),
        message: error_message(body),
    }
}

/// Extracts the server's rate-limit hint. `Retry-After` carries plain
/// seconds; `X-RateLimit-Reset` carries an RFC 3339 timestamp.
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    if let Some(value) = headers.get("retry-after").and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.trim().parse::<u64>() {
            return Some(secs);
        }
    }

    let reset = headers.get("x-ratelimit-reset")?.to_str().ok()?;
    let when = chrono::DateTime::parse_from_rfc3339(reset.trim()).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now()).num_seconds();
    Some(delta.max(0) as u64)
}
