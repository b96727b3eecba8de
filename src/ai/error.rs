//! Text-generation service errors.

use thiserror::Error;

/// Failures raised while talking to a text-generation provider.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// API key not found in environment variables or settings.
    #[error("API key not found. Set {0} environment variable")]
    ApiKeyNotFound(String),

    /// Provider returned a non-success HTTP status.
    #[error("API request failed: HTTP {status}: {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Response body returned by the provider.
        message: String,
    },

    /// Invalid response format from the provider.
    #[error("Invalid response format from API: {0}")]
    InvalidResponseFormat(String),

    /// Rate limit exceeded for the provider.
    #[error("Rate limit exceeded. Please try again later")]
    RateLimitExceeded,

    /// Network connectivity error.
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ServiceError {
    /// Returns whether the failure is transient and worth retrying.
    ///
    /// Transport failures, rate limiting and server-side (5xx) statuses are
    /// retryable. Malformed requests, authentication problems and
    /// unparseable responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::RateLimitExceeded => true,
            Self::ApiRequestFailed { status, .. } => *status >= 500,
            Self::ApiKeyNotFound(_) | Self::InvalidResponseFormat(_) => false,
        }
    }
}

/// Returns whether an error chain carries a retryable [`ServiceError`].
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ServiceError>())
        .is_some_and(ServiceError::is_retryable)
}
