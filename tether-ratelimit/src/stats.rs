//! Rate limiter statistics snapshots

use serde::Serialize;
use std::collections::HashMap;

/// Counters for a single endpoint key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    /// Category the key's bucket was created with
    pub category: String,
    /// Checks observed for this key
    pub requests: u64,
    /// Checks refused for this key
    pub rejected: u64,
}

/// Point-in-time view of the limiter counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    /// Checks observed across all keys
    pub total_requests: u64,
    /// Checks refused across all keys
    pub total_rejected: u64,
    /// Per-key counters
    pub per_key: HashMap<String, KeyStats>,
}

impl RateLimiterStats {
    /// Fraction of checks that were refused, `0.0` when nothing was observed
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_rejected as f64 / self.total_requests as f64
        }
    }
}
