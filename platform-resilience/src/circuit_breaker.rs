//! Circuit breaker implementation for resilience.
//!
//! One breaker guards one external dependency. Failures are counted inside a
//! sliding monitoring window; once the count reaches the threshold the
//! breaker opens and rejects calls without invoking the wrapped operation
//! until the reset timeout has elapsed.
//!
//! ```text
//! Closed   -> Open      failures within window >= failure_threshold
//! Open     -> HalfOpen  first call after reset_timeout
//! HalfOpen -> Closed    2 consecutive successes
//! HalfOpen -> Open      any failure
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::ServiceError;

/// Consecutive half-open successes required to close the circuit.
pub const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, trial requests probe for recovery
    HalfOpen,
}

impl CircuitState {
    /// Upper-case label used in logs and error details.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures within the monitoring period that open the circuit
    pub failure_threshold: u32,
    /// Time to wait before an open circuit admits a trial call
    pub reset_timeout: Duration,
    /// Sliding window in which failures are counted
    pub monitoring_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            monitoring_period: Duration::from_secs(120),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with custom failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Create a new config with custom reset timeout.
    #[must_use]
    pub const fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Create a new config with custom monitoring period.
    #[must_use]
    pub const fn with_monitoring_period(mut self, period: Duration) -> Self {
        self.monitoring_period = period;
        self
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitStats {
    /// Current state
    pub state: CircuitState,
    /// Failures inside the monitoring window
    pub failure_count: usize,
    /// When an open circuit will admit its next call
    pub next_attempt_time: Option<Instant>,
    /// Calls rejected without invoking the operation
    pub rejected_calls: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    next_attempt: Option<Instant>,
    half_open_successes: u32,
}

impl BreakerState {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            next_attempt: None,
            half_open_successes: 0,
        }
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.failures.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Circuit breaker for protecting external providers.
///
/// State lives behind a mutex that is only held while a decision is made,
/// never while the wrapped operation runs. Two concurrent calls may both be
/// admitted before either records its outcome.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    rejected: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
            rejected: AtomicU64::new(0),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// The key this breaker guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an async operation under breaker protection.
    ///
    /// # Errors
    ///
    /// Returns a provider [`ServiceError`] without invoking `operation` while
    /// the circuit is open; otherwise returns the operation's own error
    /// unchanged after recording it.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ServiceError>,
    {
        self.try_acquire().map_err(E::from)?;

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(error) => {
                self.record_failure();
                Err(error)
            }
        }
    }

    /// Decide whether a call may proceed, moving Open to HalfOpen once the
    /// reset timeout has passed.
    ///
    /// # Errors
    ///
    /// Returns the open-circuit error while the cooldown is running.
    pub fn try_acquire(&self) -> Result<(), ServiceError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune(now, self.config.monitoring_period);

        if state.state != CircuitState::Open {
            return Ok(());
        }

        let next_attempt = state.next_attempt.unwrap_or(now);
        if now < next_attempt {
            drop(state);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(self.open_error(next_attempt - now));
        }

        state.state = CircuitState::HalfOpen;
        state.half_open_successes = 0;
        info!(breaker = %self.name, "Circuit breaker transitioning to half-open");
        Ok(())
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match state.state {
            CircuitState::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= HALF_OPEN_SUCCESS_THRESHOLD {
                    state.state = CircuitState::Closed;
                    state.failures.clear();
                    state.half_open_successes = 0;
                    state.next_attempt = None;
                    info!(breaker = %self.name, "Circuit breaker closed after recovery");
                }
            }
            CircuitState::Closed => {
                state.failures.clear();
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.failures.push_back(now);
        state.prune(now, self.config.monitoring_period);

        let failures = state.failures.len();
        let threshold_reached = failures >= self.config.failure_threshold as usize;
        let was_half_open = state.state == CircuitState::HalfOpen;

        if threshold_reached || was_half_open {
            state.state = CircuitState::Open;
            state.next_attempt = Some(now + self.config.reset_timeout);
            state.half_open_successes = 0;
            warn!(
                breaker = %self.name,
                failures,
                from_half_open = was_half_open,
                reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                "Circuit breaker opened"
            );
        }
    }

    /// Get the current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Get a snapshot of the breaker.
    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        let mut state = self.state.lock();
        state.prune(Instant::now(), self.config.monitoring_period);
        CircuitStats {
            state: state.state,
            failure_count: state.failures.len(),
            next_attempt_time: state.next_attempt,
            rejected_calls: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Force the breaker closed and forget all history.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = BreakerState::new();
        self.rejected.store(0, Ordering::Relaxed);
        info!(breaker = %self.name, "Circuit breaker reset");
    }

    fn open_error(&self, remaining: Duration) -> ServiceError {
        let retry_after_seconds = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        ServiceError::provider(format!("Circuit breaker is open for {}", self.name))
            .with_detail("breaker", self.name.clone())
            .with_detail("state", CircuitState::Open.as_str())
            .with_detail("retry_after_seconds", retry_after_seconds)
    }
}
