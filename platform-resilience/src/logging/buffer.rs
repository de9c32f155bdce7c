//! In-memory log buffer with batched persistence.
//!
//! Entries accumulate until either `batch_size` is reached (flushed inline
//! by the `add` that filled the batch) or `flush_interval` elapses after the
//! first unflushed entry (flushed by a single background timer task).
//!
//! A failed or interrupted batch write puts the whole snapshot back at the
//! front of the buffer, so delivery is at-least-once and insertion order is
//! preserved across retries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::entry::{LogContext, LogEntry, LogLevel};
use super::sink::{LineSink, StdioSink};
use super::store::{LogQuery, LogRecord, LogStore, PersistedLogEntry};
use crate::error::ServiceError;
use crate::metrics::BufferMetrics;

/// Log buffer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBufferConfig {
    /// Entries that trigger an inline flush
    pub batch_size: usize,
    /// Delay after which pending entries are flushed by the timer
    pub flush_interval: Duration,
    /// Days of stored entries kept by [`LogBuffer::prune_expired`]
    pub retention_days: u32,
}

impl Default for LogBufferConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_secs(10),
            retention_days: 30,
        }
    }
}

impl LogBufferConfig {
    /// Create config with custom batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Create config with custom flush interval.
    #[must_use]
    pub const fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Create config with custom retention.
    #[must_use]
    pub const fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }
}

#[derive(Debug)]
struct FlushTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Buffers log entries and writes them to a [`LogStore`] in batches.
pub struct LogBuffer {
    config: LogBufferConfig,
    store: Arc<dyn LogStore>,
    sink: Arc<dyn LineSink>,
    pending: Mutex<VecDeque<LogEntry>>,
    timer: Mutex<Option<FlushTimer>>,
    timer_generation: AtomicU64,
    metrics: BufferMetrics,
    this: Weak<Self>,
}

impl LogBuffer {
    /// Create a buffer writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, config: LogBufferConfig) -> Arc<Self> {
        Self::with_metrics(store, config, BufferMetrics::default())
    }

    /// Create a buffer reporting into `metrics`.
    #[must_use]
    pub fn with_metrics(
        store: Arc<dyn LogStore>,
        config: LogBufferConfig,
        metrics: BufferMetrics,
    ) -> Arc<Self> {
        Self::with_parts(store, config, metrics, Arc::new(StdioSink))
    }

    /// Create a buffer that reports write failures to `sink`.
    #[must_use]
    pub fn with_sink(
        store: Arc<dyn LogStore>,
        config: LogBufferConfig,
        sink: Arc<dyn LineSink>,
    ) -> Arc<Self> {
        Self::with_parts(store, config, BufferMetrics::default(), sink)
    }

    /// Create a buffer with explicit metrics and failure sink.
    #[must_use]
    pub fn with_parts(
        store: Arc<dyn LogStore>,
        config: LogBufferConfig,
        metrics: BufferMetrics,
        sink: Arc<dyn LineSink>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            store,
            sink,
            pending: Mutex::new(VecDeque::new()),
            timer: Mutex::new(None),
            timer_generation: AtomicU64::new(0),
            metrics,
            this: this.clone(),
        })
    }

    /// Append an entry, flushing inline once the batch is full.
    ///
    /// # Errors
    ///
    /// Returns the storage error of an inline flush; the entries stay
    /// buffered in that case.
    pub async fn add(&self, entry: LogEntry) -> Result<(), ServiceError> {
        let batch_full = {
            let mut pending = self.pending.lock();
            pending.push_back(entry);
            self.metrics.pending.set(pending.len() as u64);
            pending.len() >= self.config.batch_size
        };

        if batch_full {
            self.flush().await?;
        } else {
            self.schedule_flush();
        }
        Ok(())
    }

    /// Write every pending entry to the store in one batch.
    ///
    /// Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// Returns the store's error after re-queueing the batch.
    pub async fn flush(&self) -> Result<usize, ServiceError> {
        self.cancel_timer();

        let entries: Vec<LogEntry> = {
            let mut pending = self.pending.lock();
            let drained = pending.drain(..).collect();
            self.metrics.pending.set(0);
            drained
        };
        if entries.is_empty() {
            return Ok(0);
        }

        let count = entries.len();
        let records: Vec<LogRecord> = entries.iter().map(LogRecord::from_entry).collect();
        let mut in_flight = InFlight {
            buffer: self,
            entries: Some(entries),
        };

        match self.store.insert_batch(records).await {
            Ok(()) => {
                in_flight.commit();
                self.metrics.entries_flushed.inc_by(count as u64);
                debug!(entries = count, "Flushed log batch");
                Ok(count)
            }
            Err(err) => {
                self.metrics.flush_failures.inc();
                error!(error = %err, entries = count, "Failed to flush log batch, re-queueing");
                let notice = LogEntry::new(
                    LogLevel::Error,
                    &format!("Failed to flush {count} log entries: {err}"),
                    &LogContext::new("-", "log-buffer"),
                );
                self.sink.write_line(LogLevel::Error, &notice.to_line());
                Err(err)
            }
        }
    }

    /// Stored entries matching `query`, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or a storage fault for unreadable metadata.
    pub async fn query(&self, query: &LogQuery) -> Result<Vec<PersistedLogEntry>, ServiceError> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(LogRecord::into_persisted)
            .collect()
    }

    /// Delete stored entries older than `days` days.
    ///
    /// A cutoff before the earliest representable instant deletes nothing.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn delete_older_than(&self, days: u32) -> Result<u64, ServiceError> {
        let cutoff = chrono::Duration::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let deleted = self.store.delete_before(cutoff).await?;
        info!(days, deleted, cutoff = %cutoff, "Deleted expired log entries");
        Ok(deleted)
    }

    /// Apply the configured retention to stored entries.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn prune_expired(&self) -> Result<u64, ServiceError> {
        self.delete_older_than(self.config.retention_days).await
    }

    /// Number of entries waiting to be flushed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether a flush timer is currently scheduled.
    #[must_use]
    pub fn has_scheduled_flush(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Buffer configuration.
    #[must_use]
    pub const fn config(&self) -> &LogBufferConfig {
        &self.config
    }

    /// Buffer metrics.
    #[must_use]
    pub const fn metrics(&self) -> &BufferMetrics {
        &self.metrics
    }

    fn schedule_flush(&self) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }

        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed);
        let buffer = self.this.clone();
        let interval = self.config.flush_interval;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let Some(buffer) = buffer.upgrade() else {
                return;
            };

            {
                // Only the timer still registered may flush; a superseded one
                // was cancelled between waking up and getting here.
                let mut timer = buffer.timer.lock();
                if timer.as_ref().map(|t| t.generation) != Some(generation) {
                    return;
                }
                timer.take();
            }

            // Failures are already reported by flush and the batch re-queued.
            let _ = buffer.flush().await;
        });

        *timer = Some(FlushTimer { generation, handle });
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.handle.abort();
        }
    }

    fn requeue(&self, entries: Vec<LogEntry>) {
        let mut pending = self.pending.lock();
        for entry in entries.into_iter().rev() {
            pending.push_front(entry);
        }
        self.metrics.pending.set(pending.len() as u64);
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Drop for LogBuffer {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

/// Snapshot being written; re-queued on drop unless committed.
struct InFlight<'a> {
    buffer: &'a LogBuffer,
    entries: Option<Vec<LogEntry>>,
}

impl InFlight<'_> {
    fn commit(&mut self) {
        self.entries = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.take() {
            self.buffer.requeue(entries);
        }
    }
}
