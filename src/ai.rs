//! Text-generation service integration.
//!
//! The analysis pipeline only needs one capability from a language model:
//! turn a `(system prompt, user prompt)` pair into free-form text. The
//! [`AiClient`] trait captures that seam; provider implementations live in
//! the submodules and [`GenerationClient`] layers request logging and retry
//! on top of whichever provider is selected.

pub mod bedrock;
pub mod claude;
pub mod client;
pub mod error;
mod messages;
pub mod openai;
pub mod request_log;
#[cfg(test)]
pub(crate) mod test_utils;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};

pub use bedrock::BedrockAiClient;
pub use claude::ClaudeAiClient;
pub use client::{GenerationClient, RetryPolicy};
pub use error::ServiceError;
pub use openai::{ChatFlavor, OpenAiAiClient};
pub use request_log::RequestLog;

/// HTTP request timeout for AI API calls.
///
/// Set to 5 minutes to accommodate large prompts (whole source files plus the
/// project tree) while preventing indefinite hangs.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Response token limit used when none is configured.
pub const DEFAULT_MAX_TOKENS: i32 = 8192;

/// Metadata about an AI client implementation.
#[derive(Clone, Debug)]
pub struct AiClientMetadata {
    /// Service provider name.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Maximum token response length requested.
    pub max_response_length: usize,
}

/// Trait for AI service clients.
pub trait AiClient: Send + Sync {
    /// Sends a request to the AI service and returns the raw response.
    fn send_request<'a>(
        &'a self,
        system_prompt: &'a str,
        user_prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Returns metadata about the AI client implementation.
    fn get_metadata(&self) -> AiClientMetadata;
}

// ── Shared helpers for AI client implementations ────────────────────

/// Builds an HTTP client with the standard request timeout.
pub(crate) fn build_http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Strips a single trailing slash so endpoint paths can be appended.
pub(crate) fn trim_base_url(base_url: &str) -> &str {
    base_url.strip_suffix('/').unwrap_or(base_url)
}

/// Checks an HTTP response for error status and returns a structured error
/// if non-success.
///
/// On success, returns the response unchanged for further processing.
/// On failure, reads the error body and returns a [`ServiceError`] that
/// keeps the status code so callers can decide whether to retry.
pub(crate) async fn check_error_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_else(|e| {
        tracing::debug!("Failed to read error response body: {e}");
        String::new()
    });
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ServiceError::RateLimitExceeded.into());
    }
    Err(ServiceError::ApiRequestFailed {
        status: status.as_u16(),
        message: error_text,
    }
    .into())
}

/// Logs successful text extraction from an AI API response.
pub(crate) fn log_response_success(provider: &str, result: &Result<String>) {
    if let Ok(text) = result {
        tracing::debug!(
            response_len = text.len(),
            "Successfully extracted text content from {} API response",
            provider
        );
        tracing::debug!(
            response_content = %text,
            "{} API response content",
            provider
        );
    }
}
