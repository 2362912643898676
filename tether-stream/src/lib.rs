//! # Tether Stream
//!
//! A persistent WebSocket connection that survives network failures.
//!
//! ## Features
//!
//! - Automatic reconnection with capped exponential backoff
//! - Outbound queue while not connected, flushed in order on open
//! - Optional queue cap with a drop-oldest or drop-newest policy
//! - Ping/pong heartbeats with a stale-connection check
//! - Typed events for open, close, messages, errors and reconnects
//! - Pluggable [`Connector`] so sessions can be scripted in tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use tether_stream::{EventKind, StreamConfig, StreamConnection, StreamEvent};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamConfig::builder("wss://stream.example.com/feed")
//!         .reconnect_delay(Duration::from_secs(1), Duration::from_secs(30))
//!         .build();
//!
//!     let connection = StreamConnection::new(config)?;
//!     connection.on(EventKind::Message, |event| {
//!         if let StreamEvent::Message(message) = event {
//!             println!("received: {:?}", message.as_text());
//!         }
//!     });
//!     connection.start()?;
//!
//!     // Queued until the handshake completes
//!     connection.send_json(&serde_json::json!({"subscribe": "prices"}))?;
//!
//!     tokio::time::sleep(Duration::from_secs(10)).await;
//!     connection.dispose().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod config;
mod connection;
mod error;
mod event;
mod message;
mod queue;
mod state;
pub mod transport;

pub use config::{OverflowPolicy, StreamConfig, StreamConfigBuilder};
pub use connection::StreamConnection;
pub use error::{StreamError, StreamResult};
pub use event::{EventKind, EventRegistry, StreamEvent, Subscription};
pub use message::Message;
pub use queue::OutboundQueue;
pub use state::{ConnectionState, StreamStats};
pub use transport::{Connector, FrameSink, FrameStream, TungsteniteConnector};

// Re-export the raw frame type for custom connectors
pub use tungstenite::Message as RawMessage;
