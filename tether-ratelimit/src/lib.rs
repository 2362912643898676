//! # Tether Rate Limiting
//!
//! Client-side rate limiting for outbound calls. Each endpoint key gets its own
//! token bucket, created lazily from the parameters of a named category.
//!
//! ## Features
//!
//! - **Lazy refill**: no background task, refill is computed when a bucket is touched
//! - **Categories**: named `(capacity, refill_rate)` pairs with a fallback category
//! - **Atomic admission**: get-or-create and consume happen under one entry lock
//! - **Statistics**: total and per-key request/rejection counters
//!
//! ## Quick Start
//!
//! ```rust
//! use tether_ratelimit::{RateLimiter, RateLimitConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RateLimitConfig::builder()
//!     .category("default", 3.0, 1.0)
//!     .build()?;
//! let limiter = RateLimiter::new(config)?;
//!
//! limiter.check("/api/messages", "default", 1.0)?;
//!
//! let result = limiter.try_check("/api/messages", "default", 1.0);
//! if !result.allowed {
//!     println!("Rate limited, retry after {:?}", result.retry_after);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod config;
pub mod error;
pub mod stats;

pub use bucket::TokenBucket;
pub use config::{CategoryLimit, RateLimitConfig, RateLimitConfigBuilder, DEFAULT_CATEGORY};
pub use error::{RateLimitError, RateLimitResult};
pub use stats::{KeyStats, RateLimiterStats};

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitCheckResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Tokens left in the bucket after this check
    pub remaining: f64,
    /// Time until the request would be allowed, zero when allowed
    pub retry_after: Duration,
}

impl RateLimitCheckResult {
    /// Create a new allowed result
    pub fn allowed(remaining: f64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: Duration::ZERO,
        }
    }

    /// Create a new denied result
    pub fn denied(remaining: f64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after,
        }
    }
}

#[derive(Debug)]
struct BucketEntry {
    category: String,
    bucket: TokenBucket,
    requests: u64,
    rejected: u64,
}

/// Registry of token buckets keyed by endpoint
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, BucketEntry>,
    total_requests: AtomicU64,
    total_rejected: AtomicU64,
}

impl RateLimiter {
    /// Create a new rate limiter, validating the category table
    pub fn new(config: RateLimitConfig) -> RateLimitResult<Self> {
        config.validate()?;
        debug!(
            categories = config.categories.len(),
            default_category = %config.default_category,
            "Creating new rate limiter"
        );
        Ok(Self {
            config,
            buckets: DashMap::new(),
            total_requests: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        })
    }

    /// Check a request against the bucket for `key`, failing with
    /// [`RateLimitError::LimitExceeded`] when it is refused
    pub fn check(&self, key: &str, category: &str, cost: f64) -> RateLimitResult<()> {
        let result = self.try_check(key, category, cost);
        if result.allowed {
            Ok(())
        } else {
            let category = self
                .category_of(key)
                .unwrap_or_else(|| self.config.default_category.clone());
            Err(RateLimitError::limit_exceeded(
                key,
                category,
                result.retry_after,
            ))
        }
    }

    /// Check a request against the bucket for `key` without failing
    pub fn try_check(&self, key: &str, category: &str, cost: f64) -> RateLimitCheckResult {
        trace!(key = %key, category = %category, cost, "Checking rate limit");
        let now = Instant::now();

        // The entry guard holds the shard lock, so creation and consumption
        // are a single atomic step for concurrent callers.
        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| self.new_entry(key, category, now));

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        entry.requests += 1;

        if entry.bucket.try_consume_at(cost, now) {
            let remaining = entry.bucket.tokens_at(now);
            trace!(key = %key, remaining, "Rate limit: request allowed");
            RateLimitCheckResult::allowed(remaining)
        } else {
            entry.rejected += 1;
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            let retry_after = entry.bucket.retry_after_at(cost, now);
            warn!(
                key = %key,
                category = %entry.category,
                retry_after = ?retry_after,
                "Rate limit: request denied"
            );
            RateLimitCheckResult::denied(entry.bucket.tokens_at(now), retry_after)
        }
    }

    fn new_entry(&self, key: &str, category: &str, now: Instant) -> BucketEntry {
        let (name, limit) = self
            .config
            .resolve(category)
            .map(|(name, limit)| (name.to_string(), limit))
            .unwrap_or_else(|| (self.config.default_category.clone(), CategoryLimit::new(0.0, 0.0)));

        if name != category {
            debug!(key = %key, requested = %category, used = %name, "Unknown rate limit category, using default");
        }
        debug!(
            key = %key,
            category = %name,
            capacity = limit.capacity,
            refill_rate = limit.refill_rate,
            "Creating token bucket"
        );

        BucketEntry {
            category: name,
            bucket: TokenBucket::new_at(limit.capacity, limit.refill_rate, now),
            requests: 0,
            rejected: 0,
        }
    }

    /// Category the bucket for `key` was created with, if it exists
    pub fn category_of(&self, key: &str) -> Option<String> {
        self.buckets.get(key).map(|entry| entry.category.clone())
    }

    /// Number of buckets currently held
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> RateLimiterStats {
        let per_key = self
            .buckets
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    KeyStats {
                        category: entry.category.clone(),
                        requests: entry.requests,
                        rejected: entry.rejected,
                    },
                )
            })
            .collect();

        RateLimiterStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            per_key,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Drop the bucket for a single key
    pub fn reset_key(&self, key: &str) {
        debug!(key = %key, "Resetting rate limit");
        self.buckets.remove(key);
    }

    /// Drop every bucket and zero the counters
    pub fn reset(&self) {
        debug!("Resetting all rate limits");
        self.buckets.clear();
        self.total_requests.store(0, Ordering::Relaxed);
        self.total_rejected.store(0, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: f64, refill_rate: f64) -> RateLimiter {
        let config = RateLimitConfig::builder()
            .category(DEFAULT_CATEGORY, capacity, refill_rate)
            .category("slow", 1.0, 0.0)
            .build()
            .unwrap();
        RateLimiter::new(config).unwrap()
    }

    #[test]
    fn test_three_then_refused() {
        let limiter = limiter(3.0, 0.0);

        for i in 0..3 {
            assert!(
                limiter.check("/api/items", DEFAULT_CATEGORY, 1.0).is_ok(),
                "Request {} should be allowed",
                i
            );
        }

        let err = limiter
            .check("/api/items", DEFAULT_CATEGORY, 1.0)
            .unwrap_err();
        assert!(err.is_limit_exceeded());
        assert!(err.retry_after().unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_different_keys() {
        let limiter = limiter(2.0, 0.0);

        // Exhaust key1
        limiter.check("key1", DEFAULT_CATEGORY, 1.0).unwrap();
        limiter.check("key1", DEFAULT_CATEGORY, 1.0).unwrap();
        assert!(!limiter.try_check("key1", DEFAULT_CATEGORY, 1.0).allowed);

        // key2 should still work
        let result = limiter.try_check("key2", DEFAULT_CATEGORY, 1.0);
        assert!(result.allowed);
        assert_eq!(result.remaining, 1.0);
    }

    #[test]
    fn test_category_fixed_at_creation() {
        let limiter = limiter(10.0, 0.0);

        assert!(limiter.try_check("/upload", "slow", 1.0).allowed);
        // Later calls with another category keep the original parameters
        assert!(!limiter.try_check("/upload", DEFAULT_CATEGORY, 1.0).allowed);
        assert_eq!(limiter.category_of("/upload").as_deref(), Some("slow"));
    }

    #[test]
    fn test_unknown_category_uses_default() {
        let limiter = limiter(2.0, 0.0);
        limiter.check("/x", "nope", 1.0).unwrap();
        assert_eq!(
            limiter.category_of("/x").as_deref(),
            Some(DEFAULT_CATEGORY)
        );
    }

    #[test]
    fn test_stats_and_reset() {
        let limiter = limiter(1.0, 0.0);
        limiter.try_check("a", DEFAULT_CATEGORY, 1.0);
        limiter.try_check("a", DEFAULT_CATEGORY, 1.0);
        limiter.try_check("b", DEFAULT_CATEGORY, 1.0);

        let stats = limiter.stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.total_rejected, 1);
        assert_eq!(stats.per_key["a"].requests, 2);
        assert_eq!(stats.per_key["a"].rejected, 1);
        assert_eq!(stats.per_key["b"].rejected, 0);

        limiter.reset();
        assert_eq!(limiter.bucket_count(), 0);
        assert_eq!(limiter.stats(), RateLimiterStats::default());
        assert!(limiter.try_check("a", DEFAULT_CATEGORY, 1.0).allowed);
    }

    #[test]
    fn test_reset_key() {
        let limiter = limiter(1.0, 0.0);
        limiter.check("a", DEFAULT_CATEGORY, 1.0).unwrap();
        assert!(limiter.check("a", DEFAULT_CATEGORY, 1.0).is_err());

        limiter.reset_key("a");
        assert!(limiter.check("a", DEFAULT_CATEGORY, 1.0).is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RateLimitConfig {
            default_category: "missing".to_string(),
            ..Default::default()
        };
        assert!(RateLimiter::new(config).is_err());
    }
}
