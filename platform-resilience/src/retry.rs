//! Retry executor with exponential backoff.
//!
//! Delays grow geometrically from `initial_delay` by `multiplier` and are
//! capped at `max_delay`. No jitter is applied, so the sleep sequence is
//! fully determined by the configuration.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ErrorKind, ServiceError};

/// Message fragments that indicate a network-layer fault.
const NETWORK_FAULT_PATTERNS: &[&str] = &[
    "econnreset",
    "etimedout",
    "econnrefused",
    "epipe",
    "socket hang up",
    "network",
    "connection reset",
    "connection refused",
];

/// Failure classification consulted by [`default_should_retry`].
pub trait RetryClassify: fmt::Display {
    /// HTTP status exposed by the failure, if any.
    fn http_status(&self) -> Option<u16> {
        None
    }

    /// Taxonomy kind carried by the failure, if any.
    fn error_kind(&self) -> Option<ErrorKind> {
        None
    }

    /// Whether the failure happened at the network layer.
    fn is_network_fault(&self) -> bool {
        message_indicates_network_fault(&self.to_string())
    }
}

fn message_indicates_network_fault(message: &str) -> bool {
    let lower = message.to_lowercase();
    NETWORK_FAULT_PATTERNS.iter().any(|p| lower.contains(p))
}

impl RetryClassify for ServiceError {
    fn http_status(&self) -> Option<u16> {
        Some(self.status())
    }

    fn error_kind(&self) -> Option<ErrorKind> {
        Some(self.kind())
    }
}

impl RetryClassify for reqwest::Error {
    fn http_status(&self) -> Option<u16> {
        self.status().map(|s| s.as_u16())
    }

    fn error_kind(&self) -> Option<ErrorKind> {
        self.is_timeout().then_some(ErrorKind::ProviderTimedOut)
    }

    fn is_network_fault(&self) -> bool {
        self.is_connect() || self.is_request() || message_indicates_network_fault(&self.to_string())
    }
}

impl RetryClassify for std::io::Error {
    fn is_network_fault(&self) -> bool {
        use std::io::ErrorKind as Io;
        matches!(
            self.kind(),
            Io::ConnectionReset
                | Io::ConnectionRefused
                | Io::ConnectionAborted
                | Io::NotConnected
                | Io::BrokenPipe
                | Io::TimedOut
        ) || message_indicates_network_fault(&self.to_string())
    }
}

impl RetryClassify for anyhow::Error {
    fn http_status(&self) -> Option<u16> {
        if let Some(err) = self.downcast_ref::<ServiceError>() {
            return err.http_status();
        }
        self.downcast_ref::<reqwest::Error>()
            .and_then(RetryClassify::http_status)
    }

    fn error_kind(&self) -> Option<ErrorKind> {
        if let Some(err) = self.downcast_ref::<ServiceError>() {
            return err.error_kind();
        }
        self.downcast_ref::<reqwest::Error>()
            .and_then(RetryClassify::error_kind)
    }

    fn is_network_fault(&self) -> bool {
        if let Some(err) = self.downcast_ref::<reqwest::Error>() {
            return err.is_network_fault();
        }
        if let Some(err) = self.downcast_ref::<std::io::Error>() {
            return err.is_network_fault();
        }
        message_indicates_network_fault(&self.to_string())
    }
}

/// Default retry decision.
///
/// 4xx statuses are final except 429; provider timeouts, provider failures
/// and network faults are retried; everything else is not.
#[must_use]
pub fn default_should_retry<E: RetryClassify + ?Sized>(error: &E) -> bool {
    match error.http_status() {
        Some(429) => return true,
        Some(status) if (400..500).contains(&status) => return false,
        _ => {}
    }

    if matches!(
        error.error_kind(),
        Some(ErrorKind::ProviderTimedOut | ErrorKind::ProviderFailed)
    ) {
        return true;
    }

    error.is_network_fault()
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied after each failed attempt
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom max attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Create a new retry config with custom initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Create a new retry config with custom max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Create a new retry config with a custom backoff multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay that follows `current` in the backoff sequence.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.as_nanos() as f64 * self.multiplier;
        let capped = grown.min(self.max_delay.as_nanos() as f64).max(0.0);
        Duration::from_nanos(capped as u64)
    }
}

/// Decides whether a failed attempt should be retried.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Observes each failed attempt that is about to be retried.
pub type RetryHook<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;

/// Retry policy for executing operations with automatic retries.
pub struct RetryPolicy<E = ServiceError> {
    config: RetryConfig,
    should_retry: RetryPredicate<E>,
    on_retry: Option<RetryHook<E>>,
}

impl<E: RetryClassify + 'static> RetryPolicy<E> {
    /// Create a retry policy using [`default_should_retry`].
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            should_retry: Arc::new(|error: &E| default_should_retry(error)),
            on_retry: None,
        }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl<E> RetryPolicy<E> {
    /// Create a retry policy with a caller-supplied predicate.
    #[must_use]
    pub fn with_predicate_only(
        config: RetryConfig,
        predicate: impl Fn(&E) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            should_retry: Arc::new(predicate),
            on_retry: None,
        }
    }

    /// Replace the retry predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Install a hook invoked before every retry with the error and attempt number.
    #[must_use]
    pub fn with_on_retry(mut self, hook: impl Fn(&E, u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// The policy configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Sleeps the executor would perform for a permanently retryable failure.
    #[must_use]
    pub fn delay_schedule(&self) -> Vec<Duration> {
        let retries = self.config.max_attempts.saturating_sub(1);
        std::iter::successors(Some(self.config.initial_delay), |d| {
            Some(self.config.next_delay(*d))
        })
        .take(retries as usize)
        .collect()
    }

    /// Execute an async operation with retries.
    ///
    /// Attempts run strictly one after another. Only the error of the last
    /// attempt is returned; earlier ones are visible through the retry hook.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// error the predicate refuses to retry.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_delay;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, error = %error, "Retry attempts exhausted");
                        return Err(error);
                    }
                    if !(self.should_retry)(&error) {
                        debug!(attempt, error = %error, "Error is not retryable");
                        return Err(error);
                    }
                    if let Some(hook) = &self.on_retry {
                        hook(&error, attempt);
                    }
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying operation"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.config.next_delay(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            should_retry: Arc::clone(&self.should_retry),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("on_retry", &self.on_retry.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy<ServiceError> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Execute `operation` under a default-predicate policy built from `config`.
///
/// # Errors
///
/// See [`RetryPolicy::execute`].
pub async fn retry_with_backoff<F, Fut, T, E>(config: RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify + 'static,
{
    RetryPolicy::new(config).execute(operation).await
}
