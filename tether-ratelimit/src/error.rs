//! Error types for rate limiting

use std::time::Duration;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Rate limiting errors
#[derive(Debug, Clone, Error)]
pub enum RateLimitError {
    /// Rate limit exceeded
    #[error("Rate limit exceeded for '{key}' ({category}). Retry after {retry_after:?}")]
    LimitExceeded {
        /// Endpoint key that was refused
        key: String,
        /// Category whose parameters the bucket uses
        category: String,
        /// Time to wait before retrying
        retry_after: Duration,
    },

    /// Configuration error
    #[error("Rate limit configuration error: {0}")]
    ConfigError(String),
}

impl RateLimitError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a limit exceeded error
    pub fn limit_exceeded(
        key: impl Into<String>,
        category: impl Into<String>,
        retry_after: Duration,
    ) -> Self {
        Self::LimitExceeded {
            key: key.into(),
            category: category.into(),
            retry_after,
        }
    }

    /// Check if this error is a rate limit exceeded error
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Get the retry-after duration if this is a limit exceeded error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::LimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
