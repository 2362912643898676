//! # Tether HTTP Client
//!
//! A request/response client that layers client-side rate limiting, a circuit
//! breaker, per-attempt timeouts, retry with exponential backoff, cancellation
//! and request/response interceptors over a pluggable transport.
//!
//! ## Features
//!
//! - **Rate Limiting**: Token buckets per logical path, grouped in categories
//! - **Circuit Breaker**: Fails fast while the target keeps failing
//! - **Retry with Backoff**: Timeouts and configurable status codes are retried
//! - **Cancellation**: A `CancellationToken` aborts the call and skips retries
//! - **Interceptors**: Ordered request/response transformation
//! - **Transport Seam**: `reqwest` by default, anything implementing [`Transport`] in tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether_http_client::{HttpClient, HttpClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(
//!         HttpClientConfig::builder()
//!             .base_url("https://api.example.com")
//!             .build(),
//!     )?;
//!
//!     let response = client.get("/users").send().await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## With Retry and Circuit Breaker
//!
//! ```rust,no_run
//! use tether_http_client::{HttpClient, HttpClientConfig, RetryConfig, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HttpClientConfig::builder()
//!         .base_url("https://api.example.com")
//!         .timeout(Duration::from_secs(30))
//!         .retry(RetryConfig::exponential(3, Duration::from_millis(100)))
//!         .circuit_breaker(CircuitBreakerConfig::new(5, 10, Duration::from_secs(30)))
//!         .build();
//!
//!     let client = HttpClient::new(config)?;
//!
//!     let response = client
//!         .post("/orders")
//!         .json(&serde_json::json!({"item": "widget", "quantity": 5}))
//!         .rate_category("upload")
//!         .send()
//!         .await?;
//!
//!     println!("{:?}", response.body());
//!     Ok(())
//! }
//! ```

mod circuit_breaker;
mod client;
mod config;
mod error;
mod interceptor;
mod request;
mod response;
mod retry;
pub mod transport;

pub use circuit_breaker::{
    next_state, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
    HalfOpenPolicy,
};
pub use client::{resolve_url, HttpClient};
pub use config::{HttpClientConfig, HttpClientConfigBuilder};
pub use error::{HttpClientError, Result};
pub use interceptor::{AuthInterceptor, LoggingInterceptor, RequestInterceptor, ResponseInterceptor};
pub use request::{RequestBody, RequestBuilder, RequestDescriptor};
pub use response::{Response, ResponseBody};
pub use retry::{BackoffStrategy, RetryConfig, RetryStrategy, DEFAULT_RETRY_STATUS_CODES};
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

// Re-export common types
pub use bytes::Bytes;
pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use tether_http_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::client::HttpClient;
    pub use crate::config::{HttpClientConfig, HttpClientConfigBuilder};
    pub use crate::error::{HttpClientError, Result};
    pub use crate::interceptor::{
        AuthInterceptor, LoggingInterceptor, RequestInterceptor, ResponseInterceptor,
    };
    pub use crate::request::{RequestBody, RequestBuilder, RequestDescriptor};
    pub use crate::response::{Response, ResponseBody};
    pub use crate::retry::{BackoffStrategy, RetryConfig, RetryStrategy};
    pub use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
    pub use tokio_util::sync::CancellationToken;
}
