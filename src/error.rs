//! Error types for loading configuration and assembling the layer.

use tether_http_client::HttpClientError;
use tether_stream::StreamError;
use thiserror::Error;

/// Errors raised while configuring or starting [`Tether`](crate::Tether).
#[derive(Error, Debug)]
pub enum TetherError {
    /// The configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text is not valid TOML for this layout.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// An environment override holds a value of the wrong type.
    #[error("Invalid value for {key}: {message}")]
    Env {
        /// Variable name
        key: String,
        /// What was wrong with it
        message: String,
    },

    /// A value is out of range.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The HTTP client rejected its configuration.
    #[error(transparent)]
    Http(#[from] HttpClientError),

    /// The stream connection rejected its configuration.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl From<toml::de::Error> for TetherError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Result type for configuration and assembly.
pub type Result<T> = std::result::Result<T, TetherError>;
