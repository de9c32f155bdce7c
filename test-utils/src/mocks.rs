//! Mock implementations for testing.
//!
//! This module provides in-memory stand-ins for the storage, sink and
//! upstream-call seams of `platform-resilience`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use platform_resilience::error::ServiceError;
use platform_resilience::logging::{
    LineSink, LogLevel, LogQuery, LogRecord, LogStore, MemoryLogStore,
};

/// Log store recording every batch write, optionally failing on demand.
///
/// Successful batches are also applied to an inner [`MemoryLogStore`] so
/// queries and deletions behave like a real backend.
#[derive(Debug, Default)]
pub struct RecordingLogStore {
    inner: MemoryLogStore,
    batches: Mutex<Vec<Vec<LogRecord>>>,
    attempts: AtomicU32,
    failing: AtomicBool,
}

impl RecordingLogStore {
    /// Create a new recording store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent batch writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successfully written batches, in write order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<LogRecord>> {
        self.batches.lock().clone()
    }

    /// Number of successful batch writes.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Number of batch writes attempted, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Messages of every stored row in write order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|record| record.message.clone())
            .collect()
    }
}

#[async_trait]
impl LogStore for RecordingLogStore {
    async fn insert_batch(&self, records: Vec<LogRecord>) -> Result<(), ServiceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ServiceError::storage("Log store unavailable"));
        }
        self.batches.lock().push(records.clone());
        self.inner.insert_batch(records).await
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, ServiceError> {
        self.inner.query(query).await
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        self.inner.delete_before(cutoff).await
    }
}

/// Line sink capturing everything written to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    /// Create a new shared sink.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Captured lines with their levels.
    #[must_use]
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }

    /// Captured line text only.
    #[must_use]
    pub fn text(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, line)| line.clone()).collect()
    }

    /// Clear captured lines.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LineSink for MemorySink {
    fn write_line(&self, level: LogLevel, line: &str) {
        self.lines.lock().push((level, line.to_string()));
    }
}

/// Upstream call that fails a fixed number of times before succeeding.
#[derive(Debug)]
pub struct FlakyOperation {
    failures: u32,
    error: ServiceError,
    calls: AtomicU32,
}

impl FlakyOperation {
    /// Fail `failures` times with `error`, then succeed.
    #[must_use]
    pub fn new(failures: u32, error: ServiceError) -> Arc<Self> {
        Arc::new(Self {
            failures,
            error,
            calls: AtomicU32::new(0),
        })
    }

    /// Fail forever with `error`.
    #[must_use]
    pub fn always_failing(error: ServiceError) -> Arc<Self> {
        Self::new(u32::MAX, error)
    }

    /// Invoke the operation. Returns the 1-based call number on success.
    ///
    /// # Errors
    ///
    /// Returns the configured error while failures remain.
    pub async fn call(&self) -> Result<u32, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::task::yield_now().await;
        if call <= self.failures {
            Err(self.error.clone())
        } else {
            Ok(call)
        }
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform_resilience::logging::{LogContext, LogEntry};

    fn record(message: &str) -> LogRecord {
        let entry = LogEntry::new(LogLevel::Info, message, &LogContext::new("req-1", "test"));
        LogRecord::from_entry(&entry)
    }

    #[tokio::test]
    async fn test_recording_store_records_batches() {
        let store = RecordingLogStore::new();
        store.insert_batch(vec![record("a"), record("b")]).await.unwrap();
        store.insert_batch(vec![record("c")]).await.unwrap();

        assert_eq!(store.batch_count(), 2);
        assert_eq!(store.messages(), vec!["a", "b", "c"]);
        assert_eq!(store.query(&LogQuery::new()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_recording_store_can_fail() {
        let store = RecordingLogStore::new();
        store.set_failing(true);
        assert!(store.insert_batch(vec![record("a")]).await.is_err());
        assert_eq!(store.attempts(), 1);
        assert_eq!(store.batch_count(), 0);
    }

    #[test]
    fn test_memory_sink_captures_lines() {
        let sink = MemorySink::new();
        sink.write_line(LogLevel::Warn, "careful");
        assert_eq!(sink.lines(), vec![(LogLevel::Warn, "careful".to_string())]);
        sink.clear();
        assert!(sink.text().is_empty());
    }

    #[tokio::test]
    async fn test_flaky_operation() {
        let op = FlakyOperation::new(2, ServiceError::provider("boom"));
        assert!(op.call().await.is_err());
        assert!(op.call().await.is_err());
        assert_eq!(op.call().await.unwrap(), 3);
        assert_eq!(op.calls(), 3);
    }
}
