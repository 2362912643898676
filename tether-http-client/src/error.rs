//! HTTP Client error types.

use std::time::Duration;
use tether_ratelimit::RateLimitError;
use thiserror::Error;

/// Result type for HTTP client operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// HTTP client errors.
#[derive(Debug, Clone, Error)]
pub enum HttpClientError {
    /// Request timed out.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network-level failure (connection refused, reset, DNS, ...).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// Circuit breaker is open, rejecting requests.
    #[error("Circuit breaker is open, request rejected")]
    CircuitOpen,

    /// Client-side rate limit refused the request.
    #[error("Rate limited on '{key}', retry after {retry_after:?}")]
    RateLimited {
        /// Endpoint key that was refused.
        key: String,
        /// Time to wait before retrying.
        retry_after: Duration,
    },

    /// Request was cancelled by the caller.
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request building error.
    #[error("Failed to build request: {0}")]
    RequestBuild(String),

    /// Response body could not be decoded into the requested type.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Interceptor error.
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl HttpClientError {
    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this is a transport error.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if the request never reached the network because of local admission control.
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, Self::CircuitOpen | Self::RateLimited { .. })
    }

    /// Get the HTTP status code if this is a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the retry-after hint if this is a rate limit error.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<RateLimitError> for HttpClientError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::LimitExceeded {
                key, retry_after, ..
            } => Self::RateLimited { key, retry_after },
            RateLimitError::ConfigError(message) => Self::Config(message),
        }
    }
}

impl From<url::ParseError> for HttpClientError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}
