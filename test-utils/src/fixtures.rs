//! Test fixtures with sample data.
//!
//! This module provides pre-built contexts, loggers and breaker settings for
//! use in tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use platform_resilience::circuit_breaker::CircuitBreakerConfig;
use platform_resilience::logging::{
    LogBuffer, LogBufferConfig, LogContext, LogEntry, LogLevel, Metadata, StructuredLogger,
};
use platform_resilience::retry::RetryConfig;

use crate::mocks::{MemorySink, RecordingLogStore};

/// Fixed instant used by fixtures that need a stable timestamp.
#[must_use]
pub fn fixed_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Sample request context for an image-generation request.
#[must_use]
pub fn sample_context() -> LogContext {
    LogContext::new("req-7f3a9c", "image-generator")
        .with_instance_id("i-0a1b2c")
        .with_user_id("user-123")
}

/// Sample provider metadata.
#[must_use]
pub fn sample_metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("provider".to_string(), json!("stability"));
    metadata.insert("latency_ms".to_string(), json!(5120));
    metadata
}

/// Sample entry at `level` with a fixed timestamp.
#[must_use]
pub fn sample_entry(level: LogLevel, message: &str) -> LogEntry {
    LogEntry::new(level, message, &sample_context()).with_timestamp(fixed_timestamp())
}

/// Breaker settings small enough for fast tests.
#[must_use]
pub fn fast_breaker_config() -> CircuitBreakerConfig {
    CircuitBreakerConfig::default()
        .with_failure_threshold(3)
        .with_reset_timeout(Duration::from_millis(100))
        .with_monitoring_period(Duration::from_secs(1))
}

/// Retry settings small enough for fast tests.
#[must_use]
pub fn fast_retry_config() -> RetryConfig {
    RetryConfig::default()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(40))
}

/// A logger wired to a recording store and a capturing sink.
#[derive(Debug)]
pub struct LoggerHarness {
    /// Logger under test
    pub logger: StructuredLogger,
    /// Buffer shared by the logger
    pub buffer: Arc<LogBuffer>,
    /// Durable store behind the buffer
    pub store: Arc<RecordingLogStore>,
    /// Immediate sink
    pub sink: Arc<MemorySink>,
}

impl LoggerHarness {
    /// Build a harness using `config` for the buffer and [`sample_context`].
    #[must_use]
    pub fn new(config: LogBufferConfig) -> Self {
        Self::with_context(sample_context(), config)
    }

    /// Build a harness with an explicit context.
    #[must_use]
    pub fn with_context(context: LogContext, config: LogBufferConfig) -> Self {
        let store = Arc::new(RecordingLogStore::new());
        let sink = MemorySink::new();
        let buffer = LogBuffer::with_sink(store.clone(), config, sink.clone());
        let logger = StructuredLogger::new(context)
            .with_buffer(Arc::clone(&buffer))
            .with_sink(sink.clone());

        Self {
            logger,
            buffer,
            store,
            sink,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_context() {
        let context = sample_context();
        assert_eq!(context.component, "image-generator");
        assert!(context.instance_id.is_some());
    }

    #[test]
    fn test_sample_entry_is_stable() {
        let entry = sample_entry(LogLevel::Info, "hello");
        assert_eq!(entry.timestamp_iso(), "2026-03-01T12:00:00.000Z");
    }

    #[tokio::test]
    async fn test_harness_wires_sink_and_buffer() {
        let harness = LoggerHarness::new(LogBufferConfig::default());
        harness.logger.info("ready", None).await;
        assert_eq!(harness.sink.text().len(), 1);
        assert_eq!(harness.buffer.pending(), 1);
    }
}
