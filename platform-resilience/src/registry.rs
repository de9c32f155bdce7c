//! Keyed registry of circuit breakers.
//!
//! Services construct one registry at startup and pass it to whatever needs
//! breaker protection; there is no process-wide instance.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::error::ServiceError;

/// State summary for one registered breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Failures inside the monitoring window
    pub failure_count: usize,
}

/// Lazily creates and memoizes one breaker per key.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry whose breakers default to `defaults`.
    #[must_use]
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get the breaker for `key`, creating it on first access.
    ///
    /// `config` only applies when the breaker is created; later calls for
    /// the same key ignore it.
    #[must_use]
    pub fn get_breaker(&self, key: &str, config: Option<CircuitBreakerConfig>) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(key) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write();
        let breaker = breakers.entry(key.to_string()).or_insert_with(|| {
            debug!(breaker = %key, "Registering circuit breaker");
            Arc::new(CircuitBreaker::new(
                key,
                config.unwrap_or_else(|| self.defaults.clone()),
            ))
        });
        Arc::clone(breaker)
    }

    /// Run `operation` through the breaker registered under `key`.
    ///
    /// # Errors
    ///
    /// See [`CircuitBreaker::execute`].
    pub async fn execute_with_breaker<F, Fut, T, E>(
        &self,
        key: &str,
        operation: F,
        config: Option<CircuitBreakerConfig>,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<ServiceError>,
    {
        let breaker = self.get_breaker(key, config);
        breaker.execute(operation).await
    }

    /// Snapshot every known breaker, ordered by key.
    #[must_use]
    pub fn all_states(&self) -> BTreeMap<String, BreakerSnapshot> {
        self.breakers
            .read()
            .iter()
            .map(|(key, breaker)| {
                let stats = breaker.stats();
                (
                    key.clone(),
                    BreakerSnapshot {
                        state: stats.state,
                        failure_count: stats.failure_count,
                    },
                )
            })
            .collect()
    }

    /// Reset the breaker under `key`. Returns `false` if none exists.
    pub fn reset(&self, key: &str) -> bool {
        let breakers = self.breakers.read();
        match breakers.get(key) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every known breaker.
    pub fn reset_all(&self) {
        for breaker in self.breakers.read().values() {
            breaker.reset();
        }
    }

    /// Number of registered breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    /// Whether no breaker has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.read().is_empty()
    }
}
