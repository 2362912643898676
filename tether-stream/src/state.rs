//! Connection state and statistics.

use serde::Serialize;
use std::time::Duration;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Connection is being established
    Connecting,
    /// Connection is open and ready
    Open,
    /// Connection is closing
    Closing,
    /// Connection is closed, possibly waiting to reconnect
    Closed,
}

impl ConnectionState {
    /// Check if frames may be written.
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// Point-in-time view of a stream connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStats {
    /// Current state
    pub state: ConnectionState,
    /// Messages waiting for the connection to open
    pub queue_depth: usize,
    /// Consecutive failed attempts since the last successful open
    pub reconnect_attempts: u32,
    /// Handshakes attempted over the connection's lifetime
    pub connection_attempts: u64,
    /// Data frames written to the transport
    pub messages_sent: u64,
    /// Data frames received from the transport
    pub messages_received: u64,
    /// Time since the last ping was sent on the current session
    pub since_last_ping: Option<Duration>,
    /// Time since the last pong was received on the current session
    pub since_last_pong: Option<Duration>,
    /// Round trip of the last answered ping
    pub latency: Option<Duration>,
}
