//! Error types for the LLM subsystem.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// API key missing or rejected (HTTP 401). Fatal to the run.
    #[error("invalid API key: {0}")]
    InvalidApiKey(String),

    /// Access denied (HTTP 403). Fatal to the run.
    #[error("API access denied: {0}")]
    AccessDenied(String),

    /// Account quota exhausted. Fatal to the run.
    #[error("API quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Rate limit persisted through all retries
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// API error with a status code
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// The model's output could not be parsed as the expected JSON
    #[error("failed to parse model response: {0}")]
    Parse(String),

    /// The model returned no content
    #[error("model returned empty response")]
    EmptyResponse,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request exceeded its deadline
    #[error("request timed out after {seconds}s")]
    Timeout {
        /// Timeout duration in seconds
        seconds: u64,
    },
}

impl LlmError {
    /// Whether the error must terminate the whole run (auth/quota failures)
    /// rather than just fail the current URL.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidApiKey(_) | Self::AccessDenied(_) | Self::QuotaExceeded(_)
        )
    }

    /// Short failure tag recorded in outcome details.
    #[must_use]
    pub fn failure_tag(&self) -> &'static str {
        match self {
            Self::InvalidApiKey(_) => "invalid_api_key",
            Self::AccessDenied(_) => "api_access_denied",
            Self::QuotaExceeded(_) => "quota_exceeded",
            Self::RateLimitExceeded(_) => "rate_limit_exceeded",
            Self::Api { .. } => "api_error",
            Self::Parse(_) | Self::EmptyResponse => "parse_error",
            Self::Network(_) => "network",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Result type alias for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(LlmError::InvalidApiKey("401".into()).is_fatal());
        assert!(LlmError::QuotaExceeded("quota".into()).is_fatal());
        assert!(LlmError::AccessDenied("403".into()).is_fatal());
        assert!(!LlmError::RateLimitExceeded("429".into()).is_fatal());
        assert!(!LlmError::Timeout { seconds: 60 }.is_fatal());
    }

    #[test]
    fn test_failure_tags() {
        assert_eq!(
            LlmError::RateLimitExceeded("x".into()).failure_tag(),
            "rate_limit_exceeded"
        );
        assert_eq!(LlmError::EmptyResponse.failure_tag(), "parse_error");
    }
}
