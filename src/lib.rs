//! # Tether
//!
//! A resilient communication layer for applications talking to a remote
//! backend: a request/response HTTP client protected by client-side rate
//! limiting, a circuit breaker, timeouts and retries, plus a persistent
//! WebSocket connection with reconnection, outbound queueing and heartbeats.
//!
//! The pieces live in their own crates and are re-exported here:
//!
//! - [`ratelimit`]: token buckets grouped in categories
//! - [`http`]: the HTTP client, circuit breaker, retry and interceptors
//! - [`stream`]: the reconnecting stream connection
//! - [`log`]: `tracing` subscriber setup from `TETHER_*` variables
//!
//! [`Tether`] owns one instance of each and disposes them together.
//!
//! ```rust,no_run
//! use tether::{Tether, TetherConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TetherConfig::from_toml_str(
//!         r#"
//!         [http]
//!         base_url = "https://api.example.com"
//!
//!         [stream]
//!         url = "wss://stream.example.com/feed"
//!         "#,
//!     )?;
//!
//!     let tether = Tether::new(config)?;
//!     tether.init_logging();
//!     tether.start()?;
//!
//!     let profile = tether.http().get("/me").send().await?;
//!     println!("{}", profile.status());
//!
//!     if let Some(stream) = tether.stream() {
//!         stream.send_text("hello")?;
//!     }
//!
//!     tether.dispose().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
mod runtime;

pub use config::TetherConfig;
pub use error::{Result, TetherError};
pub use runtime::Tether;

pub use tether_http_client as http;
pub use tether_log as log;
pub use tether_ratelimit as ratelimit;
pub use tether_stream as stream;

pub use tether_http_client::{HttpClient, HttpClientConfig, HttpClientError};
pub use tether_ratelimit::{RateLimitConfig, RateLimiter};
pub use tether_stream::{StreamConfig, StreamConnection, StreamError, StreamEvent};
