//! Composition root owning one client and one stream connection.

use crate::config::TetherConfig;
use crate::error::Result;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tether_http_client::HttpClient;
use tether_stream::{StreamConnection, StreamError};
use tracing::info;

/// Owns the HTTP client and the optional stream connection for an
/// application.
///
/// Construct one instance at startup and hand [`http`](Self::http) and
/// [`stream`](Self::stream) to the code that needs them. Call
/// [`dispose`](Self::dispose) on shutdown.
pub struct Tether {
    config: TetherConfig,
    http: HttpClient,
    stream: Option<Arc<StreamConnection>>,
    started: Mutex<bool>,
    disposed: AtomicBool,
}

impl Tether {
    /// Build the client and stream from a validated configuration. The
    /// stream is not started.
    pub fn new(config: TetherConfig) -> Result<Self> {
        config.validate()?;
        let http = HttpClient::new(config.http_config())?;
        let stream = config
            .stream_config()
            .map(StreamConnection::new)
            .transpose()?
            .map(Arc::new);
        Ok(Self::from_parts(config, http, stream))
    }

    /// Load configuration from an optional file plus the environment and
    /// build from it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::new(TetherConfig::load(path)?)
    }

    /// Assemble from parts built elsewhere, for example with test transports.
    pub fn from_parts(
        config: TetherConfig,
        http: HttpClient,
        stream: Option<Arc<StreamConnection>>,
    ) -> Self {
        Self {
            config,
            http,
            stream,
            started: Mutex::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Install the global log subscriber from the `[log]` section.
    ///
    /// Returns false if a subscriber was already installed elsewhere.
    pub fn init_logging(&self) -> bool {
        tether_log::init_with(self.config.log.clone()).is_ok()
    }

    /// Start the stream connection, if any. Must be called within a Tokio
    /// runtime. Calling it again is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut started = self.started.lock();
        if self.is_disposed() {
            return Err(StreamError::Disposed.into());
        }
        if !*started {
            if let Some(stream) = &self.stream {
                stream.start()?;
            }
            *started = true;
            info!(stream = self.stream.is_some(), "Tether started");
        }
        Ok(())
    }

    /// The loaded configuration.
    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    /// Handle to the shared HTTP client.
    pub fn http(&self) -> HttpClient {
        self.http.clone()
    }

    /// Handle to the shared stream connection, if configured.
    pub fn stream(&self) -> Option<Arc<StreamConnection>> {
        self.stream.clone()
    }

    /// Check if [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Dispose the stream connection and reset the client's protection
    /// state. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(stream) = &self.stream {
            stream.dispose().await;
        }
        self.http.reset_circuit_breaker();
        self.http.reset_rate_limiter();
        info!("Tether disposed");
    }
}

impl std::fmt::Debug for Tether {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tether")
            .field("http", &self.http)
            .field("stream", &self.stream)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
