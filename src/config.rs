//! File and environment configuration for the whole layer.
//!
//! A TOML document with optional `[log]`, `[http]` and `[stream]` tables.
//! Durations are given in milliseconds. Every field has a default, so an
//! empty document is valid and yields an HTTP client with the default rate
//! limit categories, retry policy and circuit breaker, and no stream.
//!
//! ```toml
//! [log]
//! level = "debug"
//! format = "compact"
//!
//! [http]
//! base_url = "https://api.example.com"
//! timeout_ms = 5000
//!
//! [http.retry]
//! max_retries = 2
//! base_delay_ms = 250
//!
//! [http.rate_limit.categories]
//! default = { capacity = 60.0, refill_rate = 1.0 }
//! auth = { capacity = 5.0, refill_rate = 0.1 }
//!
//! [stream]
//! url = "wss://stream.example.com/feed"
//! max_queue_size = 500
//! ```
//!
//! Environment overrides are applied on top of the file:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TETHER_DEBUG` | `log.debug` |
//! | `TETHER_LOG_LEVEL` | `log.level` |
//! | `TETHER_LOG_FORMAT` | `log.format` |
//! | `TETHER_LOG_COLOR` | `log.color` |
//! | `TETHER_HTTP_BASE_URL` | `http.base_url` |
//! | `TETHER_HTTP_TIMEOUT_MS` | `http.timeout_ms` |
//! | `TETHER_HTTP_MAX_RETRIES` | `http.retry.max_retries` |
//! | `TETHER_CIRCUIT_BREAKER_ENABLED` | `http.circuit_breaker.enabled` |
//! | `TETHER_RATE_LIMIT_ENABLED` | `http.rate_limit.enabled` |
//! | `TETHER_STREAM_URL` | `stream.url` |
//! | `TETHER_STREAM_AUTO_RECONNECT` | `stream.auto_reconnect` |
//! | `TETHER_STREAM_MAX_QUEUE_SIZE` | `stream.max_queue_size` |

use crate::error::{Result, TetherError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tether_http_client::{
    BackoffStrategy, CircuitBreakerConfig, HalfOpenPolicy, HttpClientConfig, RetryConfig,
    DEFAULT_RETRY_STATUS_CODES,
};
use tether_log::{Format, Level, LogConfig};
use tether_ratelimit::{CategoryLimit, RateLimitConfig, DEFAULT_CATEGORY};
use tether_stream::{OverflowPolicy, StreamConfig};
use tracing::debug;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TetherConfig {
    /// Logging
    pub log: LogConfig,
    /// Request/response client
    pub http: HttpSection,
    /// Persistent stream; absent when the application does not stream
    pub stream: Option<StreamSection>,
}

/// `[http]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSection {
    /// Base URL joined with relative request paths
    pub base_url: Option<String>,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    /// Connection establishment timeout
    pub connect_timeout_ms: u64,
    /// User agent override
    pub user_agent: Option<String>,
    /// Headers sent with every request
    pub headers: BTreeMap<String, String>,
    /// `[http.retry]`
    pub retry: RetrySection,
    /// `[http.circuit_breaker]`
    pub circuit_breaker: CircuitBreakerSection,
    /// `[http.rate_limit]`
    pub rate_limit: RateLimitSection,
}

impl Default for HttpSection {
    fn default() -> Self {
        let defaults = HttpClientConfig::default();
        Self {
            base_url: None,
            timeout_ms: millis(defaults.timeout),
            connect_timeout_ms: millis(defaults.connect_timeout),
            user_agent: None,
            headers: BTreeMap::new(),
            retry: RetrySection::default(),
            circuit_breaker: CircuitBreakerSection::default(),
            rate_limit: RateLimitSection::default(),
        }
    }
}

/// `[http.retry]` table. Backoff is exponential.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any delay
    pub max_delay_ms: u64,
    /// Growth factor per retry
    pub multiplier: f64,
    /// Status codes that are retried
    pub status_codes: Vec<u16>,
    /// Retry attempts that timed out
    pub retry_on_timeout: bool,
    /// Retry connection-level failures
    pub retry_on_transport_error: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            status_codes: DEFAULT_RETRY_STATUS_CODES.to_vec(),
            retry_on_timeout: true,
            retry_on_transport_error: false,
        }
    }
}

/// Half-open admission, as spelled in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalfOpenSetting {
    /// One trial request at a time
    #[default]
    SingleProbe,
    /// Every request is admitted
    Unlimited,
}

impl From<HalfOpenSetting> for HalfOpenPolicy {
    fn from(setting: HalfOpenSetting) -> Self {
        match setting {
            HalfOpenSetting::SingleProbe => HalfOpenPolicy::SingleProbe,
            HalfOpenSetting::Unlimited => HalfOpenPolicy::Unlimited,
        }
    }
}

/// `[http.circuit_breaker]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerSection {
    /// Whether the breaker guards requests
    pub enabled: bool,
    /// Failures needed to open
    pub failure_threshold: u32,
    /// Requests needed before the breaker may open
    pub volume_threshold: u32,
    /// Time spent open before a trial request
    pub open_duration_ms: u64,
    /// Half-open admission
    pub half_open: HalfOpenSetting,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            enabled: true,
            failure_threshold: defaults.failure_threshold,
            volume_threshold: defaults.volume_threshold,
            open_duration_ms: millis(defaults.open_duration),
            half_open: HalfOpenSetting::SingleProbe,
        }
    }
}

/// `[http.rate_limit]` table.
///
/// A `categories` table replaces the built-in categories entirely.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    /// Whether requests are rate limited
    pub enabled: bool,
    /// Category for unknown names
    pub default_category: String,
    /// Category for requests that do not name one
    pub request_category: String,
    /// Bucket parameters per category
    pub categories: HashMap<String, CategoryLimit>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        let defaults = RateLimitConfig::default();
        Self {
            enabled: true,
            default_category: defaults.default_category,
            request_category: DEFAULT_CATEGORY.to_string(),
            categories: defaults.categories,
        }
    }
}

/// Queue overflow policy, as spelled in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowSetting {
    /// Drop the message that waited longest
    #[default]
    DropOldest,
    /// Drop the message being submitted
    DropNewest,
}

impl From<OverflowSetting> for OverflowPolicy {
    fn from(setting: OverflowSetting) -> Self {
        match setting {
            OverflowSetting::DropOldest => OverflowPolicy::DropOldest,
            OverflowSetting::DropNewest => OverflowPolicy::DropNewest,
        }
    }
}

/// `[stream]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamSection {
    /// Endpoint (`ws://` or `wss://`)
    pub url: String,
    /// Reconnect after unexpected closes
    pub auto_reconnect: bool,
    /// First reconnect delay
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for reconnect delays
    pub reconnect_max_delay_ms: u64,
    /// Attempts after which the delay stops doubling
    pub reconnect_cap_attempts: u32,
    /// Give up after this many consecutive failures
    pub max_reconnect_attempts: Option<u32>,
    /// Handshake deadline
    pub connect_timeout_ms: u64,
    /// Deadline for writing one frame
    pub write_timeout_ms: u64,
    /// Ping period
    pub ping_interval_ms: u64,
    /// Liveness check period
    pub health_interval_ms: u64,
    /// Silence after which the connection is recycled
    pub stale_after_ms: u64,
    /// Outbound queue cap
    pub max_queue_size: Option<usize>,
    /// What to drop when the queue is full
    pub overflow: OverflowSetting,
}

impl Default for StreamSection {
    fn default() -> Self {
        let defaults = StreamConfig::default();
        Self {
            url: defaults.url,
            auto_reconnect: defaults.auto_reconnect,
            reconnect_base_delay_ms: millis(defaults.reconnect_base_delay),
            reconnect_max_delay_ms: millis(defaults.reconnect_max_delay),
            reconnect_cap_attempts: defaults.reconnect_cap_attempts,
            max_reconnect_attempts: defaults.max_reconnect_attempts,
            connect_timeout_ms: millis(defaults.connect_timeout),
            write_timeout_ms: millis(defaults.write_timeout),
            ping_interval_ms: millis(defaults.ping_interval),
            health_interval_ms: millis(defaults.health_interval),
            stale_after_ms: millis(defaults.stale_after),
            max_queue_size: defaults.max_queue_size,
            overflow: OverflowSetting::DropOldest,
        }
    }
}

impl TetherConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration file");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the file if given, apply `TETHER_*` overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(debug) = parse_flag(&lookup, "TETHER_DEBUG")? {
            self.log.debug = debug;
        }
        if let Some(value) = lookup("TETHER_LOG_LEVEL") {
            self.log.level = Level::parse(&value).ok_or_else(|| TetherError::Env {
                key: "TETHER_LOG_LEVEL".into(),
                message: format!("unknown level '{}'", value),
            })?;
        }
        if let Some(value) = lookup("TETHER_LOG_FORMAT") {
            self.log.format = Format::parse(&value).ok_or_else(|| TetherError::Env {
                key: "TETHER_LOG_FORMAT".into(),
                message: format!("unknown format '{}'", value),
            })?;
        }
        if let Some(color) = parse_flag(&lookup, "TETHER_LOG_COLOR")? {
            self.log.color = color;
        }

        if let Some(url) = lookup("TETHER_HTTP_BASE_URL") {
            self.http.base_url = Some(url);
        }
        if let Some(timeout) = parse_var(&lookup, "TETHER_HTTP_TIMEOUT_MS")? {
            self.http.timeout_ms = timeout;
        }
        if let Some(retries) = parse_var(&lookup, "TETHER_HTTP_MAX_RETRIES")? {
            self.http.retry.max_retries = retries;
        }
        if let Some(enabled) = parse_flag(&lookup, "TETHER_CIRCUIT_BREAKER_ENABLED")? {
            self.http.circuit_breaker.enabled = enabled;
        }
        if let Some(enabled) = parse_flag(&lookup, "TETHER_RATE_LIMIT_ENABLED")? {
            self.http.rate_limit.enabled = enabled;
        }

        if let Some(url) = lookup("TETHER_STREAM_URL") {
            self.stream.get_or_insert_with(StreamSection::default).url = url;
        }
        if let Some(stream) = self.stream.as_mut() {
            if let Some(enabled) = parse_flag(&lookup, "TETHER_STREAM_AUTO_RECONNECT")? {
                stream.auto_reconnect = enabled;
            }
            if let Some(size) = parse_var(&lookup, "TETHER_STREAM_MAX_QUEUE_SIZE")? {
                stream.max_queue_size = Some(size);
            }
        }
        Ok(())
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        let retry = &self.http.retry;
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            return Err(TetherError::Validation(format!(
                "retry multiplier must be at least 1.0, got {}",
                retry.multiplier
            )));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(TetherError::Validation(
                "retry max_delay_ms must be at least base_delay_ms".into(),
            ));
        }

        self.http_config().validate()?;
        if let Some(stream) = self.stream_config() {
            stream.validate()?;
        }
        Ok(())
    }

    /// Build the HTTP client configuration.
    pub fn http_config(&self) -> HttpClientConfig {
        let http = &self.http;
        let mut builder = HttpClientConfig::builder()
            .timeout(Duration::from_millis(http.timeout_ms))
            .connect_timeout(Duration::from_millis(http.connect_timeout_ms))
            .retry(http.retry.to_config())
            .default_rate_category(http.rate_limit.request_category.clone());

        if let Some(base_url) = &http.base_url {
            builder = builder.base_url(base_url.clone());
        }
        if let Some(user_agent) = &http.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        for (name, value) in &http.headers {
            builder = builder.default_header(name.clone(), value.clone());
        }

        builder = if http.circuit_breaker.enabled {
            builder.circuit_breaker(http.circuit_breaker.to_config())
        } else {
            builder.no_circuit_breaker()
        };
        builder = if http.rate_limit.enabled {
            builder.rate_limit(http.rate_limit.to_config())
        } else {
            builder.no_rate_limit()
        };

        builder.build()
    }

    /// Build the stream configuration, if a stream is configured.
    pub fn stream_config(&self) -> Option<StreamConfig> {
        self.stream.as_ref().map(StreamSection::to_config)
    }
}

impl RetrySection {
    fn to_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            backoff: BackoffStrategy::Exponential {
                initial: Duration::from_millis(self.base_delay_ms),
                max: Duration::from_millis(self.max_delay_ms),
                multiplier: self.multiplier,
            },
            retry_status_codes: self.status_codes.clone(),
            retry_on_timeout: self.retry_on_timeout,
            retry_on_transport_error: self.retry_on_transport_error,
        }
    }
}

impl CircuitBreakerSection {
    fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            self.failure_threshold,
            self.volume_threshold,
            Duration::from_millis(self.open_duration_ms),
        )
        .with_half_open_policy(self.half_open.into())
    }
}

impl RateLimitSection {
    fn to_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            categories: self.categories.clone(),
            default_category: self.default_category.clone(),
        }
    }
}

impl StreamSection {
    fn to_config(&self) -> StreamConfig {
        StreamConfig {
            url: self.url.clone(),
            auto_reconnect: self.auto_reconnect,
            reconnect_base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
            reconnect_max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            reconnect_cap_attempts: self.reconnect_cap_attempts,
            max_reconnect_attempts: self.max_reconnect_attempts,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            health_interval: Duration::from_millis(self.health_interval_ms),
            stale_after: Duration::from_millis(self.stale_after_ms),
            max_queue_size: self.max_queue_size,
            overflow_policy: self.overflow.into(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| TetherError::Env {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(TetherError::Env {
                key: key.to_string(),
                message: format!("expected a boolean, got '{}'", other),
            }),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TetherConfig::from_toml_str("").unwrap();
        assert_eq!(config, TetherConfig::default());
        assert!(config.stream.is_none());
        config.validate().unwrap();

        let http = config.http_config();
        assert_eq!(http.timeout, Duration::from_secs(30));
        assert!(http.circuit_breaker.is_some());
        assert!(http.rate_limit.unwrap().categories.contains_key("auth"));
    }

    #[test]
    fn test_full_document() {
        let config = TetherConfig::from_toml_str(
            r#"
            [log]
            level = "debug"
            format = "compact"

            [http]
            base_url = "https://api.example.com"
            timeout_ms = 5000
            headers = { "x-client" = "tether" }

            [http.retry]
            max_retries = 2
            base_delay_ms = 250
            status_codes = [503]

            [http.circuit_breaker]
            failure_threshold = 3
            volume_threshold = 3
            open_duration_ms = 1000
            half_open = "unlimited"

            [http.rate_limit]
            request_category = "chat"

            [http.rate_limit.categories]
            default = { capacity = 10.0, refill_rate = 1.0 }
            chat = { capacity = 2.0, refill_rate = 0.5 }

            [stream]
            url = "wss://stream.example.com/feed"
            max_queue_size = 500
            overflow = "drop_newest"
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.log.level, Level::Debug);
        assert_eq!(config.log.format, Format::Compact);

        let http = config.http_config();
        assert_eq!(http.base_url.as_deref(), Some("https://api.example.com"));
        assert_eq!(http.timeout, Duration::from_millis(5000));
        assert_eq!(
            http.default_headers,
            vec![("x-client".to_string(), "tether".to_string())]
        );
        assert_eq!(http.retry.max_retries, 2);
        assert_eq!(http.retry.retry_status_codes, vec![503]);
        assert_eq!(http.retry.delay_for_attempt(0), Duration::from_millis(250));
        let breaker = http.circuit_breaker.unwrap();
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.half_open_policy, HalfOpenPolicy::Unlimited);
        assert_eq!(http.default_rate_category, "chat");
        let rate_limit = http.rate_limit.unwrap();
        assert_eq!(rate_limit.categories.len(), 2);

        let stream = config.stream_config().unwrap();
        assert_eq!(stream.url, "wss://stream.example.com/feed");
        assert_eq!(stream.max_queue_size, Some(500));
        assert_eq!(stream.overflow_policy, OverflowPolicy::DropNewest);
        assert_eq!(stream.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = TetherConfig::from_toml_str("[http]\ntimeout = 5\n");
        assert!(matches!(result, Err(TetherError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = TetherConfig::default();
        config
            .apply_overrides(vars(&[
                ("TETHER_DEBUG", "true"),
                ("TETHER_LOG_FORMAT", "pretty"),
                ("TETHER_HTTP_BASE_URL", "http://localhost:8080"),
                ("TETHER_HTTP_TIMEOUT_MS", "1500"),
                ("TETHER_HTTP_MAX_RETRIES", "0"),
                ("TETHER_CIRCUIT_BREAKER_ENABLED", "false"),
                ("TETHER_STREAM_URL", "ws://localhost:9000/ws"),
                ("TETHER_STREAM_MAX_QUEUE_SIZE", "10"),
            ]))
            .unwrap();
        config.validate().unwrap();

        assert!(config.log.debug);
        assert_eq!(config.log.format, Format::Pretty);
        let http = config.http_config();
        assert_eq!(http.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(http.timeout, Duration::from_millis(1500));
        assert_eq!(http.retry.max_retries, 0);
        assert!(http.circuit_breaker.is_none());
        assert!(http.rate_limit.is_some());

        let stream = config.stream_config().unwrap();
        assert_eq!(stream.url, "ws://localhost:9000/ws");
        assert_eq!(stream.max_queue_size, Some(10));
    }

    #[test]
    fn test_bad_env_values() {
        let mut config = TetherConfig::default();
        let err = config
            .apply_overrides(vars(&[("TETHER_HTTP_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, TetherError::Env { ref key, .. } if key == "TETHER_HTTP_TIMEOUT_MS"));

        let err = config
            .apply_overrides(vars(&[("TETHER_RATE_LIMIT_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, TetherError::Env { .. }));

        let err = config
            .apply_overrides(vars(&[("TETHER_LOG_LEVEL", "loud")]))
            .unwrap_err();
        assert!(matches!(err, TetherError::Env { .. }));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = TetherConfig::default();
        config.http.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(TetherError::Http(_))));

        let mut config = TetherConfig::default();
        config.http.retry.multiplier = 0.5;
        assert!(matches!(config.validate(), Err(TetherError::Validation(_))));

        let mut config = TetherConfig::default();
        config.stream = Some(StreamSection {
            url: "http://not-a-socket".into(),
            ..Default::default()
        });
        assert!(matches!(config.validate(), Err(TetherError::Stream(_))));

        let mut config = TetherConfig::default();
        config.http.rate_limit.default_category = "missing".into();
        assert!(matches!(config.validate(), Err(TetherError::Http(_))));
    }
}
