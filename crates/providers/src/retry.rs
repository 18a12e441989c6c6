//! Bounded retry around any [`Provider`].
//!
//! Transient failures (rate limits, network errors, 5xx) are retried
//! with doubling backoff, honoring the server's retry-after hint, up
//! to the backoff cap. Timeouts get a single extra attempt so a slow model
//! cannot stall the reply pipeline. Invalid requests and rejected
//! keys are returned immediately.

use async_trait::async_trait;
use mastomend_core::{Completion, CompletionError, CompletionRequest, Provider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(30);
const TIMEOUT_EXTRA_ATTEMPTS: u32 = 1;

/// A provider that retries another provider's transient failures.
pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    max_retries: u32,
    base_delay: Duration,
}

impl RetryProvider {
    /// Wraps `inner`, allowing up to `max_retries` additional attempts
    /// after the first.
    pub fn new(inner: Arc<dyn Provider>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Overrides the first retry delay. Tests use millisecond delays.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn delay_for(&self, error: &CompletionError, attempt: u32) -> Duration {
        if let CompletionError::RateLimited {
            retry_after_secs: Some(secs),
        } = error
        {
            // Server hints obey the same cap as computed backoff.
            return Duration::from_secs(*secs)
                .max(self.base_delay)
                .min(MAX_BACKOFF);
        }
        let factor = 1u32 << attempt.min(5);
        (self.base_delay * factor).min(MAX_BACKOFF)
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        request: CompletionRequest,
    ) -> Result<Completion, CompletionError> {
        let mut attempt: u32 = 0;

        loop {
            match self.inner.generate(request.clone()).await {
                Ok(completion) => {
                    if attempt > 0 {
                        info!(
                            provider = %self.inner.name(),
                            attempts = attempt + 1,
                            "Completion succeeded after retry"
                        );
                    }
                    return Ok(completion);
                }
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    let budget = if matches!(error, CompletionError::Timeout(_)) {
                        TIMEOUT_EXTRA_ATTEMPTS
                    } else {
                        self.max_retries
                    };
                    if attempt >= budget {
                        warn!(
                            provider = %self.inner.name(),
                            error = %error,
                            attempts = attempt + 1,
                            "Completion retries exhausted"
                        );
                        return Err(error);
                    }

                    let delay = self.delay_for(&error, attempt);
                    warn!(
                        provider = %self.inner.name(),
                        error = %error,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Completion failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn health_check(&self) -> Result<bool, CompletionError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails with scripted errors until they run out, then succeeds.
    struct ScriptedProvider {
        errors: Mutex<Vec<CompletionError>>,
        call_count: Mutex<usize>,
    }

    impl ScriptedProvider {
        fn new(errors: Vec<CompletionError>) -> Self {
            Self {
                errors: Mutex::new(errors),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            request: CompletionRequest,
        ) -> Result<Completion, CompletionError> {
            *self.call_count.lock().unwrap() += 1;
            let mut errors = self.errors.lock().unwrap();
            if errors.is_empty() {
                Ok(Completion {
                    text: "here for you".into(),
                    model: request.model,
                })
            } else {
                Err(errors.remove(0))
            }
        }
    }

    fn fast(inner: Arc<dyn Provider>, max_retries: u32) -> RetryProvider {
        RetryProvider::new(inner, max_retries).with_base_delay(Duration::from_millis(1))
    }

    fn server_error() -> CompletionError {
        CompletionError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        }
    }

    #[tokio::test]
    async fn first_attempt_success_needs_no_retry() {
        let inner = Arc::new(ScriptedProvider::new(vec![]));
        let retry = fast(inner.clone(), 3);

        let completion = retry
            .generate(CompletionRequest::new("m", "hi"))
            .await
            .unwrap();
        assert_eq!(completion.text, "here for you");
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            server_error(),
            CompletionError::Network("reset by peer".into()),
        ]));
        let retry = fast(inner.clone(), 3);

        let result = retry.generate(CompletionRequest::new("m", "hi")).await;
        assert!(result.is_ok());
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_last_error() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            server_error(),
            server_error(),
            server_error(),
            server_error(),
        ]));
        let retry = fast(inner.clone(), 2);

        let result = retry.generate(CompletionRequest::new("m", "hi")).await;
        match result.unwrap_err() {
            CompletionError::ApiError { status_code, .. } => assert_eq!(status_code, 503),
            other => panic!("Expected ApiError, got: {other:?}"),
        }
        // First attempt plus two retries.
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn invalid_request_is_never_retried() {
        let inner = Arc::new(ScriptedProvider::new(vec![CompletionError::InvalidRequest(
            "Prompt blocked: SAFETY".into(),
        )]));
        let retry = fast(inner.clone(), 5);

        let result = retry.generate(CompletionRequest::new("m", "hi")).await;
        assert!(matches!(
            result.unwrap_err(),
            CompletionError::InvalidRequest(_)
        ));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn auth_failure_is_never_retried() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            CompletionError::AuthenticationFailed("bad key".into()),
        ]));
        let retry = fast(inner.clone(), 5);

        let result = retry.generate(CompletionRequest::new("m", "hi")).await;
        assert!(result.unwrap_err().is_fatal());
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_gets_exactly_one_extra_attempt() {
        let inner = Arc::new(ScriptedProvider::new(vec![
            CompletionError::Timeout("30s elapsed".into()),
            CompletionError::Timeout("30s elapsed".into()),
            CompletionError::Timeout("30s elapsed".into()),
        ]));
        let retry = fast(inner.clone(), 5);

        let result = retry.generate(CompletionRequest::new("m", "hi")).await;
        assert!(matches!(result.unwrap_err(), CompletionError::Timeout(_)));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn rate_limit_hint_wins_over_backoff() {
        let inner = Arc::new(ScriptedProvider::new(vec![]));
        let retry = fast(inner, 3);

        let hinted = retry.delay_for(
            &CompletionError::RateLimited {
                retry_after_secs: Some(7),
            },
            0,
        );
        assert_eq!(hinted, Duration::from_secs(7));

        let unhinted = retry.delay_for(
            &CompletionError::RateLimited {
                retry_after_secs: None,
            },
            2,
        );
        assert_eq!(unhinted, Duration::from_millis(4));
    }

    #[tokio::test]
    async fn backoff_doubles_and_caps() {
        let inner = Arc::new(ScriptedProvider::new(vec![]));
        let retry = RetryProvider::new(inner, 3);

        assert_eq!(retry.delay_for(&server_error(), 0), Duration::from_secs(1));
        assert_eq!(retry.delay_for(&server_error(), 1), Duration::from_secs(2));
        assert_eq!(retry.delay_for(&server_error(), 2), Duration::from_secs(4));
        assert_eq!(retry.delay_for(&server_error(), 10), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn oversized_rate_limit_hint_is_capped() {
        let inner = Arc::new(ScriptedProvider::new(vec![]));
        let retry = RetryProvider::new(inner, 3);

        let hinted = retry.delay_for(
            &CompletionError::RateLimited {
                retry_after_secs: Some(86_400),
            },
            0,
        );
        assert_eq!(hinted, MAX_BACKOFF);
    }

    #[tokio::test]
    async fn name_and_health_delegate_to_inner() {
        let inner = Arc::new(ScriptedProvider::new(vec![]));
        let retry = fast(inner, 0);

        assert_eq!(retry.name(), "scripted");
        assert!(retry.health_check().await.unwrap());
    }
}
