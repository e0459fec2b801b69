//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Failures of one generation request
///
/// The workflow wraps these as generation errors of the stage that issued
/// the request; `is_retryable` decides whether a configured stage retry may
/// run the stage again.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The reply could not be used (prose where JSON was requested, no choices)
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown provider or missing API key; never retried
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Transient failures worth another attempt
    ///
    /// Server-side statuses (5xx), throttling, transport trouble and blank
    /// replies qualify. Client errors and unusable content do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiError { status, .. } => *status >= 500,
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) | Self::EmptyResponse => true,
            Self::InvalidResponse(_) | Self::Json(_) | Self::Config(_) => false,
        }
    }

    /// Server-requested wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> LlmError {
        LlmError::ApiError {
            status,
            message: "provider said no".to_string(),
        }
    }

    #[test]
    fn test_retryable_classification() {
        let cases = [
            (api(502), true),
            (api(429), false),
            (api(400), false),
            (LlmError::Timeout(Duration::from_secs(300)), true),
            (LlmError::EmptyResponse, true),
            (LlmError::InvalidResponse("verdict is prose".to_string()), false),
            (LlmError::Config("DEEPSEEK_API_KEY not set".to_string()), false),
        ];
        for (err, expected) in cases {
            assert_eq!(err.is_retryable(), expected, "{err}");
        }
    }

    #[test]
    fn test_rate_limit_carries_wait() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(42),
        };
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
        assert_eq!(api(503).retry_after(), None);
    }
}
