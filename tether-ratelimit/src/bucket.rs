//! Token Bucket
//!
//! A single token bucket with lazy, timestamp-based refill.
//!
//! ## How It Works
//!
//! 1. A bucket starts full with `capacity` tokens
//! 2. Each operation consumes `cost` tokens
//! 3. Tokens are added at `refill_rate` per second, computed when the bucket is touched
//! 4. If not enough tokens are available, the operation is denied and the bucket is left as is
//!
//! ## Example
//!
//! ```rust
//! use tether_ratelimit::TokenBucket;
//!
//! let mut bucket = TokenBucket::new(3.0, 1.0);
//!
//! for _ in 0..3 {
//!     assert!(bucket.try_consume(1.0));
//! }
//! assert!(!bucket.try_consume(1.0));
//! assert!(!bucket.retry_after(1.0).is_zero());
//! ```

use std::time::Duration;
use tokio::time::Instant;

/// Token bucket rate limiter.
///
/// Time is read from [`tokio::time::Instant`], so a paused tokio clock drives
/// refill deterministically in tests. The `*_at` variants take the instant
/// explicitly.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Maximum tokens (burst capacity)
    capacity: f64,
    /// Tokens added per second
    refill_rate: f64,
    /// Current number of tokens
    tokens: f64,
    /// Last time tokens were added
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// Negative or non-finite parameters are clamped to zero. A `refill_rate`
    /// of zero yields a bucket that never refills.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self::new_at(capacity, refill_rate, Instant::now())
    }

    /// Create a full bucket whose refill clock starts at `now`.
    pub fn new_at(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        let capacity = sanitize(capacity);
        Self {
            capacity,
            refill_rate: sanitize(refill_rate),
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Try to consume `cost` tokens.
    pub fn try_consume(&mut self, cost: f64) -> bool {
        self.try_consume_at(cost, Instant::now())
    }

    /// Try to consume `cost` tokens at the given instant.
    pub fn try_consume_at(&mut self, cost: f64, now: Instant) -> bool {
        self.refill(now);

        if self.tokens >= cost {
            self.tokens = (self.tokens - cost).max(0.0);
            true
        } else {
            false
        }
    }

    /// Time until `cost` tokens will be available. Does not mutate the bucket.
    ///
    /// Returns [`Duration::ZERO`] if the tokens are already there and
    /// [`Duration::MAX`] if they never will be.
    pub fn retry_after(&self, cost: f64) -> Duration {
        self.retry_after_at(cost, Instant::now())
    }

    /// Time until `cost` tokens will be available, measured from `now`.
    pub fn retry_after_at(&self, cost: f64, now: Instant) -> Duration {
        let available = self.tokens_at(now);
        let deficit = cost - available;
        if deficit <= 0.0 {
            return Duration::ZERO;
        }
        if self.refill_rate <= 0.0 || cost > self.capacity {
            return Duration::MAX;
        }

        Duration::try_from_secs_f64(deficit / self.refill_rate).unwrap_or(Duration::MAX)
    }

    /// Tokens available at `now`, without refilling the stored state.
    pub fn tokens_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.refill_rate).min(self.capacity)
    }

    /// Tokens available right now.
    pub fn tokens(&self) -> f64 {
        self.tokens_at(Instant::now())
    }

    /// Get the capacity
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Get the refill rate
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Refill tokens based on elapsed time
    fn refill(&mut self, now: Instant) {
        self.tokens = self.tokens_at(now);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_capacity() {
        let now = Instant::now();
        let bucket = TokenBucket::new_at(10.0, 1.0, now);
        assert_eq!(bucket.tokens_at(now), 10.0);
    }

    #[test]
    fn test_consume_tokens() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(5.0, 1.0, now);

        for _ in 0..5 {
            assert!(bucket.try_consume_at(1.0, now));
        }

        // Should be denied now, and a denial leaves the bucket untouched
        assert!(!bucket.try_consume_at(1.0, now));
        assert_eq!(bucket.tokens_at(now), 0.0);
    }

    #[test]
    fn test_denied_cost_keeps_tokens() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(3.0, 1.0, now);

        assert!(bucket.try_consume_at(2.0, now));
        assert!(!bucket.try_consume_at(2.0, now));
        assert_eq!(bucket.tokens_at(now), 1.0);
    }

    #[test]
    fn test_refill_clamped_to_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(5.0, 10.0, now);
        assert!(bucket.try_consume_at(5.0, now));

        let later = now + Duration::from_secs(60);
        assert_eq!(bucket.tokens_at(later), 5.0);
        assert!(bucket.try_consume_at(5.0, later));
        assert!(!bucket.try_consume_at(0.5, later));
    }

    #[test]
    fn test_refill_after_cost_over_rate_succeeds_once() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(4.0, 2.0, start);
        assert!(bucket.try_consume_at(4.0, start));

        // cost / refill_rate = 1.5s
        let later = start + Duration::from_millis(1500);
        assert!(bucket.try_consume_at(3.0, later));
        assert!(!bucket.try_consume_at(3.0, later));
    }

    #[test]
    fn test_retry_after() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(2.0, 4.0, now);
        assert_eq!(bucket.retry_after_at(1.0, now), Duration::ZERO);

        bucket.try_consume_at(2.0, now);
        assert_eq!(bucket.retry_after_at(1.0, now), Duration::from_millis(250));

        // Does not mutate
        assert_eq!(bucket.tokens_at(now), 0.0);
        let remaining = bucket.retry_after_at(1.0, now + Duration::from_millis(100));
        assert!((remaining.as_secs_f64() - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_zero_refill_never_recovers() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(1.0, 0.0, now);
        assert!(bucket.try_consume_at(1.0, now));
        assert!(!bucket.try_consume_at(1.0, now + Duration::from_secs(3600)));
        assert_eq!(bucket.retry_after_at(1.0, now), Duration::MAX);
    }

    #[test]
    fn test_cost_above_capacity() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new_at(2.0, 1.0, now);
        assert!(!bucket.try_consume_at(3.0, now));
        assert_eq!(bucket.retry_after_at(3.0, now), Duration::MAX);
    }

    #[test]
    fn test_invalid_parameters_are_clamped() {
        let bucket = TokenBucket::new(-1.0, f64::NAN);
        assert_eq!(bucket.capacity(), 0.0);
        assert_eq!(bucket.refill_rate(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_with_paused_clock() {
        let mut bucket = TokenBucket::new(5.0, 10.0);
        for _ in 0..5 {
            assert!(bucket.try_consume(1.0));
        }
        assert!(!bucket.try_consume(1.0));

        // 100ms = 1 token at 10/sec
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(bucket.try_consume(1.0));
        assert!(!bucket.try_consume(1.0));
    }
}
