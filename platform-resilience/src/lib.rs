//! Shared resilience and telemetry layer for provider-facing services.
//!
//! This crate provides centralized implementations for:
//! - Error taxonomy with operational classification and client-safe serialization
//! - Retry policies with exponential backoff
//! - Deadline enforcement for async operations
//! - Circuit breakers and a keyed breaker registry
//! - Structured, context-stamped logging with batched durable storage
//! - HTTP boundary translation of errors
//! - Environment configuration, tracing setup and Prometheus metrics helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod timeout;
pub mod tracing_config;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats};
pub use config::{ConfigError, ResilienceConfig};
pub use error::{ErrorKind, ServiceError};
pub use http::ErrorResponse;
pub use logging::{
    LogBuffer, LogBufferConfig, LogContext, LogEntry, LogLevel, LogQuery, LogStore, MemoryLogStore,
    StructuredLogger,
};
pub use registry::{BreakerSnapshot, CircuitBreakerRegistry};
pub use retry::{RetryConfig, RetryPolicy, retry_with_backoff};
pub use timeout::with_timeout;
pub use tracing_config::{TracingConfig, init_tracing};
