//! Hot-path benchmarks for admission control and request resolution

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tether::http::transport::{Transport, TransportRequest, TransportResponse};
use tether::http::{
    CircuitBreaker, CircuitBreakerConfig, HttpClient, HttpClientConfig, RetryConfig, Url,
    resolve_url,
};
use tether::ratelimit::{RateLimitConfig, RateLimiter, TokenBucket};
use tether::stream::{Message, OutboundQueue, OverflowPolicy};

fn token_bucket_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_bucket");
    group.throughput(Throughput::Elements(1));

    let mut bucket = TokenBucket::new(1_000_000_000.0, 1_000_000.0);
    group.bench_function("try_consume", |b| {
        b.iter(|| black_box(bucket.try_consume(black_box(1.0))));
    });

    let empty = TokenBucket::new(1.0, 0.0);
    group.bench_function("retry_after", |b| {
        b.iter(|| black_box(empty.retry_after(black_box(2.0))));
    });

    group.finish();
}

fn rate_limiter_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");
    group.throughput(Throughput::Elements(1));

    for keys in [1usize, 100, 10_000] {
        let limiter = RateLimiter::new(
            RateLimitConfig::builder()
                .category("default", 1_000_000_000.0, 1_000_000.0)
                .build()
                .unwrap(),
        )
        .unwrap();
        let names: Vec<String> = (0..keys).map(|i| format!("/api/resource/{}", i)).collect();
        let mut i = 0usize;

        group.bench_with_input(BenchmarkId::new("check", keys), &keys, |b, _| {
            b.iter(|| {
                i = (i + 1) % names.len();
                black_box(limiter.try_check(&names[i], "default", 1.0))
            });
        });
    }

    group.finish();
}

fn circuit_breaker_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("circuit_breaker");
    group.throughput(Throughput::Elements(1));

    let breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
    group.bench_function("closed_admit_and_succeed", |b| {
        b.iter(|| {
            if breaker.can_proceed() {
                breaker.on_success();
            }
        });
    });

    let open = CircuitBreaker::new(CircuitBreakerConfig::new(1, 1, Duration::from_secs(3600)));
    open.on_failure();
    group.bench_function("open_reject", |b| {
        b.iter(|| black_box(open.can_proceed()));
    });

    group.finish();
}

fn resolve_url_benchmark(c: &mut Criterion) {
    let base = Url::parse("https://api.example.com/v1/").unwrap();
    let query = vec![
        ("page".to_string(), "2".to_string()),
        ("q".to_string(), "hello world".to_string()),
    ];

    c.bench_function("resolve_url", |b| {
        b.iter(|| black_box(resolve_url(Some(&base), black_box("/users/42"), &query)));
    });
}

fn outbound_queue_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound_queue");
    group.throughput(Throughput::Elements(1));

    let mut capped = OutboundQueue::new(Some(1024), OverflowPolicy::DropOldest);
    group.bench_function("push_capped", |b| {
        b.iter(|| black_box(capped.push(Message::text("payload"))));
    });

    group.finish();
}

struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn send(&self, request: TransportRequest) -> tether::http::Result<TransportResponse> {
        Ok(TransportResponse {
            status: http::StatusCode::OK,
            headers: http::HeaderMap::new(),
            body: bytes::Bytes::from_static(b"{}"),
            url: request.url,
        })
    }
}

fn client_pipeline_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let client = HttpClient::with_transport(
        HttpClientConfig::builder()
            .base_url("https://api.example.com")
            .retry(RetryConfig::disabled())
            .no_rate_limit()
            .build(),
        Arc::new(NullTransport),
    )
    .unwrap();

    c.bench_function("client_execute", |b| {
        b.to_async(&rt).iter(|| async {
            let response = client.get("/health").send().await.unwrap();
            black_box(response)
        });
    });
}

criterion_group!(
    benches,
    token_bucket_benchmark,
    rate_limiter_benchmark,
    circuit_breaker_benchmark,
    resolve_url_benchmark,
    outbound_queue_benchmark,
    client_pipeline_benchmark,
);
criterion_main!(benches);
