//! Stream connection configuration.

use crate::error::{StreamError, StreamResult};
use std::time::Duration;

/// Which message to drop when a capped outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the message that has waited longest
    #[default]
    DropOldest,
    /// Drop the message being submitted
    DropNewest,
}

/// Stream connection configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Endpoint URL (`ws://` or `wss://`)
    pub url: String,
    /// Whether to reconnect after an unexpected close
    pub auto_reconnect: bool,
    /// Delay before the first reconnect attempt
    pub reconnect_base_delay: Duration,
    /// Upper bound for any reconnect delay
    pub reconnect_max_delay: Duration,
    /// Attempt count after which the delay stops doubling
    pub reconnect_cap_attempts: u32,
    /// Give up after this many consecutive failed attempts, `None` for never
    pub max_reconnect_attempts: Option<u32>,
    /// Deadline for each handshake
    pub connect_timeout: Duration,
    /// Deadline for writing a single frame
    pub write_timeout: Duration,
    /// Interval between ping frames while open
    pub ping_interval: Duration,
    /// Interval between liveness checks while open
    pub health_interval: Duration,
    /// Time without a pong after which the connection is considered dead
    pub stale_after: Duration,
    /// Maximum queued messages while not open, `None` for unbounded
    pub max_queue_size: Option<usize>,
    /// What to drop when the queue is full
    pub overflow_policy: OverflowPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auto_reconnect: true,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            reconnect_cap_attempts: 5,
            max_reconnect_attempts: None,
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            health_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(90),
            max_queue_size: None,
            overflow_policy: OverflowPolicy::DropOldest,
        }
    }
}

impl StreamConfig {
    /// Create a configuration for `url` with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a new configuration builder.
    pub fn builder(url: impl Into<String>) -> StreamConfigBuilder {
        StreamConfigBuilder {
            config: Self::new(url),
        }
    }

    /// Delay before reconnect attempt number `attempts + 1`:
    /// `base * 2^min(attempts, cap)`, bounded by the max delay.
    pub fn reconnect_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.min(self.reconnect_cap_attempts).min(31);
        self.reconnect_base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.reconnect_max_delay)
            .min(self.reconnect_max_delay)
    }

    /// Check the configuration for values the connection cannot work with.
    pub fn validate(&self) -> StreamResult<url::Url> {
        let url = url::Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(StreamError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }
        if self.ping_interval.is_zero() || self.health_interval.is_zero() {
            return Err(StreamError::Config(
                "ping and health intervals must be non-zero".into(),
            ));
        }
        if self.stale_after < self.ping_interval {
            return Err(StreamError::Config(
                "stale_after must be at least ping_interval".into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(StreamError::Config(
                "connect and write timeouts must be non-zero".into(),
            ));
        }
        if self.max_queue_size == Some(0) {
            return Err(StreamError::Config("max_queue_size must be at least 1".into()));
        }
        Ok(url)
    }
}

/// Builder for stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    /// Enable or disable automatic reconnection.
    pub fn auto_reconnect(mut self, enable: bool) -> Self {
        self.config.auto_reconnect = enable;
        self
    }

    /// Set the base and maximum reconnect delays.
    pub fn reconnect_delay(mut self, base: Duration, max: Duration) -> Self {
        self.config.reconnect_base_delay = base;
        self.config.reconnect_max_delay = max;
        self
    }

    /// Set the attempt count after which the delay stops growing.
    pub fn reconnect_cap_attempts(mut self, cap: u32) -> Self {
        self.config.reconnect_cap_attempts = cap;
        self
    }

    /// Stop reconnecting after `max` consecutive failed attempts.
    pub fn max_reconnect_attempts(mut self, max: u32) -> Self {
        self.config.max_reconnect_attempts = Some(max);
        self
    }

    /// Set the handshake deadline.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the deadline for writing one frame. A write that misses it ends
    /// the session and the frame is requeued.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    /// Set the ping interval.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    /// Set the liveness check interval and staleness threshold.
    pub fn health_check(mut self, interval: Duration, stale_after: Duration) -> Self {
        self.config.health_interval = interval;
        self.config.stale_after = stale_after;
        self
    }

    /// Cap the outbound queue.
    pub fn max_queue_size(mut self, size: usize, policy: OverflowPolicy) -> Self {
        self.config.max_queue_size = Some(size);
        self.config.overflow_policy = policy;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> StreamConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_delay_doubles_until_cap() {
        let config = StreamConfig::builder("ws://localhost")
            .reconnect_delay(Duration::from_millis(100), Duration::from_secs(60))
            .reconnect_cap_attempts(3)
            .build();

        assert_eq!(config.reconnect_delay(0), Duration::from_millis(100));
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(200));
        assert_eq!(config.reconnect_delay(3), Duration::from_millis(800));
        assert_eq!(config.reconnect_delay(10), Duration::from_millis(800));
    }

    #[test]
    fn test_reconnect_delay_bounded_by_max() {
        let config = StreamConfig::builder("ws://localhost")
            .reconnect_delay(Duration::from_secs(1), Duration::from_secs(5))
            .reconnect_cap_attempts(u32::MAX)
            .build();
        assert_eq!(config.reconnect_delay(2), Duration::from_secs(4));
        assert_eq!(config.reconnect_delay(3), Duration::from_secs(5));
        assert_eq!(config.reconnect_delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_validate() {
        assert!(StreamConfig::new("wss://example.com/stream").validate().is_ok());
        assert!(matches!(
            StreamConfig::new("https://example.com").validate(),
            Err(StreamError::InvalidUrl(_))
        ));
        assert!(matches!(
            StreamConfig::new("not a url").validate(),
            Err(StreamError::InvalidUrl(_))
        ));
        let zero_queue = StreamConfig::builder("ws://localhost")
            .max_queue_size(0, OverflowPolicy::DropNewest)
            .build();
        assert!(matches!(zero_queue.validate(), Err(StreamError::Config(_))));
        let zero_write = StreamConfig::builder("ws://localhost")
            .write_timeout(Duration::ZERO)
            .build();
        assert!(matches!(zero_write.validate(), Err(StreamError::Config(_))));
    }
}
