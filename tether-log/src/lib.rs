//! Tether Logging Setup
//!
//! Installs a `tracing` subscriber for the Tether crates, configured from the
//! `TETHER_*` environment variables.
//!
//! # Usage
//!
//! ```rust,no_run
//! // Reads TETHER_DEBUG, TETHER_LOG_LEVEL, TETHER_LOG_FORMAT and TETHER_LOG_COLOR
//! tether_log::init();
//!
//! tracing::info!(port = 8080, "client ready");
//! ```
//!
//! # Environment Variables
//!
//! - `TETHER_DEBUG=1` - Enable debug logging
//! - `TETHER_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `TETHER_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `TETHER_LOG_COLOR=1|0` - Enable/disable colors
//!
//! `RUST_LOG` takes precedence over the level when it is set.

use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    #[serde(alias = "warning")]
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Off => "OFF",
        }
    }

    /// `EnvFilter` directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line human readable output
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include the event target (module path)
    pub targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false, // JSON output doesn't use colors
            targets: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let debug = flag("TETHER_DEBUG").unwrap_or(false);

        let level = lookup("TETHER_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("TETHER_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        // Assume a color terminal unless told otherwise
        let color = flag("TETHER_LOG_COLOR")
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let targets = flag("TETHER_LOG_TARGETS").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color,
            targets,
        }
    }

    /// Effective level: debug mode lowers anything above `Debug`.
    pub fn effective_level(&self) -> Level {
        if self.debug && self.level > Level::Debug {
            Level::Debug
        } else {
            self.level
        }
    }

    /// Build the event filter. `RUST_LOG` wins when present and valid.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.effective_level().as_directive()))
    }
}

// ============================================================================
// Subscriber Installation
// ============================================================================

static INSTALLED: OnceCell<LogConfig> = OnceCell::new();

/// Install the global subscriber from the environment.
///
/// Safe to call more than once. Failures (for example another subscriber
/// already being installed by the host application) are ignored.
pub fn init() {
    let _ = try_init();
}

/// Install the global subscriber from the environment, reporting failure.
pub fn try_init() -> Result<&'static LogConfig, TryInitError> {
    init_with(LogConfig::from_env())
}

/// Install the global subscriber with an explicit configuration.
///
/// Only the first successful call installs anything; later calls return the
/// configuration that is in effect.
pub fn init_with(config: LogConfig) -> Result<&'static LogConfig, TryInitError> {
    INSTALLED.get_or_try_init(|| {
        install(&config)?;
        Ok(config)
    })
}

/// Configuration of the installed subscriber, if any.
pub fn config() -> Option<&'static LogConfig> {
    INSTALLED.get()
}

/// Check if a subscriber has been installed through this crate.
pub fn is_initialized() -> bool {
    INSTALLED.get().is_some()
}

fn install(config: &LogConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(config.filter());

    match config.format {
        Format::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_ansi(config.color)
                    .with_target(config.targets),
            )
            .try_init(),
        Format::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_ansi(config.color)
                    .with_target(config.targets),
            )
            .try_init(),
        Format::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(config.targets),
            )
            .try_init(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("invalid"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("Compact"), Some(Format::Compact));
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_defaults_without_variables() {
        let config = LogConfig::from_lookup(lookup(&[]));
        assert!(!config.debug);
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, Format::Json);
        assert!(!config.color);
        assert!(config.targets);
    }

    #[test]
    fn test_debug_flag_lowers_level() {
        let config = LogConfig::from_lookup(lookup(&[("TETHER_DEBUG", "true")]));
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);

        let config = LogConfig::from_lookup(lookup(&[
            ("TETHER_DEBUG", "1"),
            ("TETHER_LOG_LEVEL", "warn"),
        ]));
        assert_eq!(config.level, Level::Warn);
        assert_eq!(config.effective_level(), Level::Debug);
    }

    #[test]
    fn test_explicit_values() {
        let config = LogConfig::from_lookup(lookup(&[
            ("TETHER_LOG_LEVEL", "trace"),
            ("TETHER_LOG_FORMAT", "pretty"),
            ("TETHER_LOG_COLOR", "0"),
            ("TERM", "xterm"),
        ]));
        assert_eq!(config.level, Level::Trace);
        assert_eq!(config.format, Format::Pretty);
        assert!(!config.color);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = LogConfig::from_lookup(lookup(&[
            ("TETHER_LOG_LEVEL", "loud"),
            ("TETHER_LOG_FORMAT", "xml"),
        ]));
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, Format::Json);
    }

    #[test]
    fn test_color_detection() {
        assert!(LogConfig::from_lookup(lookup(&[("TERM", "xterm")])).color);
        assert!(!LogConfig::from_lookup(lookup(&[("TERM", "xterm"), ("NO_COLOR", "1")])).color);
    }

    #[test]
    fn test_init_is_idempotent() {
        let first = init_with(LogConfig {
            format: Format::Compact,
            ..Default::default()
        });
        // Another test binary may own the global subscriber; only check
        // idempotence when this call installed it.
        if let Ok(first) = first {
            let second = init_with(LogConfig::default()).expect("already installed");
            assert_eq!(first, second);
            assert_eq!(second.format, Format::Compact);
            assert!(is_initialized());
            tracing::info!("logging installed");
        }
    }
}
