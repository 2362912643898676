//! Integration tests for the rate limiter registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tether_ratelimit::{DEFAULT_CATEGORY, RateLimitConfig, RateLimiter};

fn limiter(capacity: f64, refill_rate: f64) -> RateLimiter {
    let config = RateLimitConfig::builder()
        .category(DEFAULT_CATEGORY, capacity, refill_rate)
        .build()
        .unwrap();
    RateLimiter::new(config).unwrap()
}

#[test]
fn test_concurrent_admission_never_exceeds_capacity() {
    let limiter = Arc::new(limiter(50.0, 0.0));
    let admitted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let admitted = Arc::clone(&admitted);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    if limiter.try_check("/shared", DEFAULT_CATEGORY, 1.0).allowed {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 50);
    assert_eq!(limiter.bucket_count(), 1);

    let stats = limiter.stats();
    assert_eq!(stats.total_requests, 200);
    assert_eq!(stats.total_rejected, 150);
}

#[tokio::test(start_paused = true)]
async fn test_refill_restores_admission() {
    let limiter = limiter(2.0, 4.0);

    limiter.check("/api/chat", DEFAULT_CATEGORY, 2.0).unwrap();
    let result = limiter.try_check("/api/chat", DEFAULT_CATEGORY, 1.0);
    assert!(!result.allowed);
    assert_eq!(result.retry_after, Duration::from_millis(250));

    tokio::time::advance(Duration::from_millis(250)).await;
    tokio_test::assert_ok!(limiter.check("/api/chat", DEFAULT_CATEGORY, 1.0));
    tokio_test::assert_err!(limiter.check("/api/chat", DEFAULT_CATEGORY, 1.0));
}

#[test]
fn test_default_categories() {
    let limiter = RateLimiter::new(RateLimitConfig::default()).unwrap();

    for _ in 0..5 {
        limiter.check("/auth/login", "auth", 1.0).unwrap();
    }
    let err = limiter.check("/auth/login", "auth", 1.0).unwrap_err();
    assert!(err.to_string().contains("auth"));
}
