//! Provider-agnostic text generation with request logging and retry.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use super::error::is_retryable;
use super::{AiClient, AiClientMetadata, RequestLog};

/// Bounded exponential backoff for transient provider failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries attempted after the first failure.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Returns the delay to wait before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Text-generation capability used by the analysis pipeline.
///
/// Wraps the selected provider so the orchestrator never sees provider
/// details. Constructed once per run and shared by reference.
pub struct GenerationClient {
    ai_client: Box<dyn AiClient>,
    retry: RetryPolicy,
    request_log: Option<RequestLog>,
}

impl GenerationClient {
    /// Creates a client around a provider with the default retry policy.
    pub fn new(ai_client: Box<dyn AiClient>) -> Self {
        Self {
            ai_client,
            retry: RetryPolicy::default(),
            request_log: None,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Enables raw request logging.
    #[must_use]
    pub fn with_request_log(mut self, request_log: RequestLog) -> Self {
        self.request_log = Some(request_log);
        self
    }

    /// Returns metadata of the underlying provider.
    pub fn metadata(&self) -> AiClientMetadata {
        self.ai_client.get_metadata()
    }

    /// Generates text for a `(system, user)` prompt pair.
    ///
    /// Retryable failures are retried with exponential backoff until the
    /// policy is exhausted; any other failure is returned immediately.
    pub async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if let Some(log) = &self.request_log {
            let model = self.ai_client.get_metadata().model;
            if let Err(e) = log.record(&model, system_prompt, user_prompt) {
                warn!("Failed to log request to {}: {e:#}", log.path().display());
            }
        }

        let mut attempt = 0;
        loop {
            match self.ai_client.send_request(system_prompt, user_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.retry.max_retries && is_retryable(&e) => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient text generation failure, retrying: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(attempts = attempt + 1, "Text generation failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ai::test_utils::FnAiClient;
    use crate::ai::ServiceError;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let mock = FnAiClient::new(|call, _, _| {
            if call < 2 {
                Err(ServiceError::NetworkError("connection reset".to_string()).into())
            } else {
                Ok("recovered".to_string())
            }
        });
        let calls = mock.prompt_handle();
        let client = GenerationClient::new(Box::new(mock)).with_retry_policy(fast_retry(3));

        let text = client.generate("sys", "user").await.unwrap();
        assert_eq!(text, "recovered");
        assert_eq!(calls.request_count(), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_returned_immediately() {
        let mock = FnAiClient::new(|_, _, _| {
            Err(ServiceError::ApiRequestFailed {
                status: 400,
                message: "prompt is too long".to_string(),
            }
            .into())
        });
        let calls = mock.prompt_handle();
        let client = GenerationClient::new(Box::new(mock)).with_retry_policy(fast_retry(3));

        let err = client.generate("sys", "user").await.unwrap_err();
        assert!(err.to_string().contains("prompt is too long"));
        assert_eq!(calls.request_count(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let mock = FnAiClient::new(|_, _, _| Err(ServiceError::RateLimitExceeded.into()));
        let calls = mock.prompt_handle();
        let client = GenerationClient::new(Box::new(mock)).with_retry_policy(fast_retry(2));

        assert!(client.generate("sys", "user").await.is_err());
        assert_eq!(calls.request_count(), 3);
    }

    #[tokio::test]
    async fn request_log_records_each_generate_call() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("requests.log");
        let client = GenerationClient::new(Box::new(FnAiClient::echo()))
            .with_retry_policy(RetryPolicy::none())
            .with_request_log(RequestLog::new(&log_path));

        client.generate("sys", "hello").await.unwrap();

        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert!(logged.contains("\"hello\""));
        assert!(logged.contains("\"mock-model\""));
    }
}
