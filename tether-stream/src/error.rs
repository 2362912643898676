//! Error types for stream operations.

use std::time::Duration;
use thiserror::Error;

/// Stream error type.
///
/// Errors raised inside the reconnect loop are delivered as
/// [`StreamEvent::Error`](crate::StreamEvent::Error) rather than returned, so
/// the type is `Clone`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// Connection could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// Protocol error reported by the transport
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Handshake or liveness deadline exceeded
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection has been disposed
    #[error("Connection disposed")]
    Disposed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<tungstenite::Error> for StreamError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::ConnectionClosed
            }
            tungstenite::Error::Io(e) => Self::Connection(e.to_string()),
            tungstenite::Error::Url(e) => Self::InvalidUrl(e.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for StreamError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
