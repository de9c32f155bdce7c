//! Environment-driven configuration for the resilience and logging layers.
//!
//! Every setting has a default, so an empty environment yields a valid
//! configuration. Values are validated once at load time.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::logging::{LogBufferConfig, LogLevel};
use crate::retry::RetryConfig;
use crate::tracing_config::TracingConfig;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },

    /// A value that must be positive was zero
    #[error("Invalid {0}: must be greater than 0")]
    MustBePositive(&'static str),

    /// Backoff multiplier below 1
    #[error("Invalid backoff multiplier {0}: must be at least 1")]
    InvalidMultiplier(String),

    /// Maximum retry delay below the initial delay
    #[error("Invalid retry delays: max delay {max_ms}ms is below initial delay {initial_ms}ms")]
    InvalidDelayRange {
        /// Initial delay in milliseconds
        initial_ms: u64,
        /// Maximum delay in milliseconds
        max_ms: u64,
    },
}

/// Resilience and logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    // Circuit breaker
    /// Failures inside the window that open a breaker
    pub cb_failure_threshold: u32,
    /// Seconds a breaker stays open
    pub cb_reset_timeout_secs: u64,
    /// Failure counting window in seconds
    pub cb_monitoring_period_secs: u64,

    // Retry
    /// Total attempts including the first
    pub retry_max_attempts: u32,
    /// First backoff delay in milliseconds
    pub retry_initial_delay_ms: u64,
    /// Backoff delay cap in milliseconds
    pub retry_max_delay_ms: u64,
    /// Backoff growth factor
    pub retry_backoff_multiplier: f64,

    // Logging
    /// Entries per durable batch
    pub log_batch_size: usize,
    /// Timer flush interval in milliseconds
    pub log_flush_interval_ms: u64,
    /// Days of durable logs to keep
    pub log_retention_days: u32,
    /// Minimum level for internal diagnostics
    pub log_level: LogLevel,
    /// JSON output for internal diagnostics
    pub log_json: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            cb_failure_threshold: 5,
            cb_reset_timeout_secs: 60,
            cb_monitoring_period_secs: 120,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 1000,
            retry_max_delay_ms: 10_000,
            retry_backoff_multiplier: 2.0,
            log_batch_size: 100,
            log_flush_interval_ms: 10_000,
            log_retention_days: 30,
            log_level: LogLevel::Info,
            log_json: false,
        }
    }
}

impl ResilienceConfig {
    /// Load configuration from the process environment, reading `.env` first.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = &lookup;

        let config = Self {
            cb_failure_threshold: parse_var(var, "CB_FAILURE_THRESHOLD", defaults.cb_failure_threshold)?,
            cb_reset_timeout_secs: parse_var(var, "CB_RESET_TIMEOUT_SECS", defaults.cb_reset_timeout_secs)?,
            cb_monitoring_period_secs: parse_var(
                var,
                "CB_MONITORING_PERIOD_SECS",
                defaults.cb_monitoring_period_secs,
            )?,
            retry_max_attempts: parse_var(var, "RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts)?,
            retry_initial_delay_ms: parse_var(var, "RETRY_INITIAL_DELAY_MS", defaults.retry_initial_delay_ms)?,
            retry_max_delay_ms: parse_var(var, "RETRY_MAX_DELAY_MS", defaults.retry_max_delay_ms)?,
            retry_backoff_multiplier: parse_var(
                var,
                "RETRY_BACKOFF_MULTIPLIER",
                defaults.retry_backoff_multiplier,
            )?,
            log_batch_size: parse_var(var, "LOG_BATCH_SIZE", defaults.log_batch_size)?,
            log_flush_interval_ms: parse_var(var, "LOG_FLUSH_INTERVAL_MS", defaults.log_flush_interval_ms)?,
            log_retention_days: parse_var(var, "LOG_RETENTION_DAYS", defaults.log_retention_days)?,
            log_level: parse_var(var, "LOG_LEVEL", defaults.log_level)?,
            log_json: parse_var(var, "LOG_JSON", defaults.log_json)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cb_failure_threshold == 0 {
            return Err(ConfigError::MustBePositive("CB_FAILURE_THRESHOLD"));
        }
        if self.cb_reset_timeout_secs == 0 {
            return Err(ConfigError::MustBePositive("CB_RESET_TIMEOUT_SECS"));
        }
        if self.cb_monitoring_period_secs == 0 {
            return Err(ConfigError::MustBePositive("CB_MONITORING_PERIOD_SECS"));
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::MustBePositive("RETRY_MAX_ATTEMPTS"));
        }
        if self.log_batch_size == 0 {
            return Err(ConfigError::MustBePositive("LOG_BATCH_SIZE"));
        }
        if self.log_flush_interval_ms == 0 {
            return Err(ConfigError::MustBePositive("LOG_FLUSH_INTERVAL_MS"));
        }
        if self.log_retention_days == 0 {
            return Err(ConfigError::MustBePositive("LOG_RETENTION_DAYS"));
        }
        if !(self.retry_backoff_multiplier >= 1.0) {
            return Err(ConfigError::InvalidMultiplier(
                self.retry_backoff_multiplier.to_string(),
            ));
        }
        if self.retry_max_delay_ms < self.retry_initial_delay_ms {
            return Err(ConfigError::InvalidDelayRange {
                initial_ms: self.retry_initial_delay_ms,
                max_ms: self.retry_max_delay_ms,
            });
        }
        Ok(())
    }

    /// Circuit breaker settings.
    #[must_use]
    pub const fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.cb_failure_threshold,
            reset_timeout: Duration::from_secs(self.cb_reset_timeout_secs),
            monitoring_period: Duration::from_secs(self.cb_monitoring_period_secs),
        }
    }

    /// Retry settings.
    #[must_use]
    pub const fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            multiplier: self.retry_backoff_multiplier,
        }
    }

    /// Log buffer settings, including the retention applied by
    /// [`crate::logging::LogBuffer::prune_expired`].
    #[must_use]
    pub const fn log_buffer(&self) -> LogBufferConfig {
        LogBufferConfig {
            batch_size: self.log_batch_size,
            flush_interval: Duration::from_millis(self.log_flush_interval_ms),
            retention_days: self.log_retention_days,
        }
    }

    /// Tracing subscriber settings for `service_name`.
    #[must_use]
    pub fn tracing(&self, service_name: impl Into<String>) -> TracingConfig {
        let config = TracingConfig::default()
            .with_service_name(service_name)
            .with_log_level(self.log_level.as_str().to_ascii_lowercase());
        if self.log_json {
            config.with_json_output()
        } else {
            config
        }
    }
}

/// Parse a variable with a default value.
fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ResilienceConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ResilienceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ResilienceConfig::default());
        assert_eq!(config.circuit_breaker(), CircuitBreakerConfig::default());
        assert_eq!(config.retry(), RetryConfig::default());
        assert_eq!(config.log_buffer(), LogBufferConfig::default());
    }

    #[test]
    fn test_overrides_flow_into_component_configs() {
        let config = load(&[
            ("CB_FAILURE_THRESHOLD", "3"),
            ("CB_RESET_TIMEOUT_SECS", "15"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("RETRY_INITIAL_DELAY_MS", "200"),
            ("RETRY_MAX_DELAY_MS", "800"),
            ("RETRY_BACKOFF_MULTIPLIER", "1.5"),
            ("LOG_BATCH_SIZE", "10"),
            ("LOG_FLUSH_INTERVAL_MS", "250"),
            ("LOG_RETENTION_DAYS", "7"),
            ("LOG_LEVEL", "debug"),
            ("LOG_JSON", "true"),
        ])
        .unwrap();

        let breaker = config.circuit_breaker();
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.reset_timeout, Duration::from_secs(15));

        let retry = config.retry();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_delay, Duration::from_millis(200));
        assert_eq!(retry.max_delay, Duration::from_millis(800));
        assert!((retry.multiplier - 1.5).abs() < f64::EPSILON);

        let buffer = config.log_buffer();
        assert_eq!(buffer.batch_size, 10);
        assert_eq!(buffer.flush_interval, Duration::from_millis(250));
        assert_eq!(buffer.retention_days, 7);

        let tracing = config.tracing("image-generator");
        assert_eq!(tracing.service_name, "image-generator");
        assert_eq!(tracing.log_level, "debug");
        assert!(tracing.json_output);
    }

    #[test]
    fn test_unparseable_value() {
        let err = load(&[("RETRY_MAX_ATTEMPTS", "three")]).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref name, .. } if name == "RETRY_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        assert_eq!(
            load(&[("CB_FAILURE_THRESHOLD", "0")]).unwrap_err(),
            ConfigError::MustBePositive("CB_FAILURE_THRESHOLD")
        );
        assert_eq!(
            load(&[("LOG_BATCH_SIZE", "0")]).unwrap_err(),
            ConfigError::MustBePositive("LOG_BATCH_SIZE")
        );
        assert_eq!(
            load(&[("LOG_RETENTION_DAYS", "0")]).unwrap_err(),
            ConfigError::MustBePositive("LOG_RETENTION_DAYS")
        );
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let err = load(&[("RETRY_BACKOFF_MULTIPLIER", "0.5")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMultiplier(_)));
    }

    #[test]
    fn test_max_delay_below_initial_rejected() {
        let err = load(&[("RETRY_INITIAL_DELAY_MS", "500"), ("RETRY_MAX_DELAY_MS", "100")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidDelayRange {
                initial_ms: 500,
                max_ms: 100
            }
        );
    }
}
