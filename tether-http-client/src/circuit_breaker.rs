//! Circuit breaker pattern implementation.
//!
//! The breaker never changes state on a timer. An open breaker moves to
//! half-open only when a caller asks for admission after the cool-down has
//! elapsed; see [`next_state`].

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed.
    Closed,
    /// Circuit is open, requests are rejected.
    Open,
    /// Circuit is half-open, trial requests are allowed.
    HalfOpen,
}

/// How many trial requests a half-open breaker admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HalfOpenPolicy {
    /// One trial request at a time; others are refused until it reports back.
    #[default]
    SingleProbe,
    /// Every request is admitted until a reported outcome changes the state.
    Unlimited,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures needed to open the circuit. A success resets the count.
    pub failure_threshold: u32,
    /// Requests that must have been observed before the circuit may open.
    pub volume_threshold: u32,
    /// Time to wait in the open state before admitting a trial request.
    pub open_duration: Duration,
    /// Admission policy while half-open.
    pub half_open_policy: HalfOpenPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            volume_threshold: 10,
            open_duration: Duration::from_secs(30),
            half_open_policy: HalfOpenPolicy::SingleProbe,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new circuit breaker config.
    pub fn new(failure_threshold: u32, volume_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            volume_threshold,
            open_duration,
            ..Default::default()
        }
    }

    /// Set the half-open admission policy.
    pub fn with_half_open_policy(mut self, policy: HalfOpenPolicy) -> Self {
        self.half_open_policy = policy;
        self
    }
}

/// Snapshot of the breaker for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerStats {
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success or reset.
    pub failure_count: u32,
    /// Requests observed since the last reset.
    pub request_count: u32,
    /// Time left before a trial request is admitted, while open.
    pub retry_in: Option<Duration>,
}

/// State after an admission check at `now`.
///
/// Open becomes half-open once `next_attempt_at` has passed; every other
/// state is returned unchanged.
pub fn next_state(
    state: CircuitState,
    now: Instant,
    next_attempt_at: Option<Instant>,
) -> CircuitState {
    match (state, next_attempt_at) {
        (CircuitState::Open, Some(at)) if now >= at => CircuitState::HalfOpen,
        (state, _) => state,
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    request_count: u32,
    next_attempt_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            request_count: 0,
            next_attempt_at: None,
            probe_in_flight: false,
        }
    }
}

/// Circuit breaker guarding a single downstream target.
///
/// Callers ask [`can_proceed`](Self::can_proceed) before an attempt and report
/// exactly one of [`on_success`](Self::on_success) or
/// [`on_failure`](Self::on_failure) for every admitted attempt.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get the current circuit state without admitting anything.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Check if a request is allowed.
    pub fn can_proceed(&self) -> bool {
        self.can_proceed_at(Instant::now())
    }

    /// Check if a request is allowed at `now`.
    pub fn can_proceed_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();

        let next = next_state(inner.state, now, inner.next_attempt_at);
        if next != inner.state {
            debug!("Circuit breaker transitioning to half-open");
            inner.state = next;
            inner.next_attempt_at = None;
            inner.probe_in_flight = false;
        }

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => match self.config.half_open_policy {
                HalfOpenPolicy::Unlimited => true,
                HalfOpenPolicy::SingleProbe if inner.probe_in_flight => false,
                HalfOpenPolicy::SingleProbe => {
                    inner.probe_in_flight = true;
                    true
                }
            },
        }
    }

    /// Record a successful request.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count = 0;
        inner.request_count = inner.request_count.saturating_add(1);
        inner.probe_in_flight = false;

        if inner.state == CircuitState::HalfOpen {
            info!("Circuit breaker closing");
            inner.state = CircuitState::Closed;
            inner.next_attempt_at = None;
        }
    }

    /// Record a failed request.
    pub fn on_failure(&self) {
        self.on_failure_at(Instant::now());
    }

    /// Record a failed request at `now`.
    pub fn on_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.request_count = inner.request_count.saturating_add(1);
        inner.probe_in_flight = false;

        if inner.state != CircuitState::Open
            && inner.failure_count >= self.config.failure_threshold
            && inner.request_count >= self.config.volume_threshold
        {
            warn!(
                failures = inner.failure_count,
                requests = inner.request_count,
                open_for = ?self.config.open_duration,
                "Circuit breaker opening"
            );
            inner.state = CircuitState::Open;
            inner.next_attempt_at = Some(now + self.config.open_duration);
        }
    }

    /// Give back an admission that never produced an outcome, e.g. a request
    /// cancelled by its caller. Counters are left alone.
    pub fn release(&self) {
        self.inner.lock().probe_in_flight = false;
    }

    /// Get failure count.
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Get the number of requests observed since the last reset.
    pub fn request_count(&self) -> u32 {
        self.inner.lock().request_count
    }

    /// Snapshot of state and counters.
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        let retry_in = match (inner.state, inner.next_attempt_at) {
            (CircuitState::Open, Some(at)) => Some(at.saturating_duration_since(Instant::now())),
            _ => None,
        };
        CircuitBreakerStats {
            state: inner.state,
            failure_count: inner.failure_count,
            request_count: inner.request_count,
            retry_in,
        }
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        info!("Circuit breaker reset");
        *self.inner.lock() = BreakerState::closed();
    }
}
