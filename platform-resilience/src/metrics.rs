//! Prometheus metrics helpers.
//!
//! This module provides utilities for exposing metrics in Prometheus format.

use std::sync::atomic::{AtomicU64, Ordering};

/// A simple counter metric.
#[derive(Debug)]
pub struct Counter {
    name: String,
    help: String,
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the counter by a specific amount.
    pub fn inc_by(&self, amount: u64) {
        self.value.fetch_add(amount, Ordering::Relaxed);
    }

    /// Get the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Get the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// A simple gauge metric.
#[derive(Debug)]
pub struct Gauge {
    name: String,
    help: String,
    value: AtomicU64,
}

impl Gauge {
    /// Create a new gauge.
    #[must_use]
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            value: AtomicU64::new(0),
        }
    }

    /// Set the gauge value.
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Get the current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Get the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Format as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Log buffer metrics.
#[derive(Debug)]
pub struct BufferMetrics {
    /// Entries written to the durable store
    pub entries_flushed: Counter,
    /// Batch writes that failed and were re-queued
    pub flush_failures: Counter,
    /// Entries waiting in the buffer
    pub pending: Gauge,
}

impl BufferMetrics {
    /// Create new buffer metrics with the given prefix.
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            entries_flushed: Counter::new(
                format!("{prefix}_log_entries_flushed_total"),
                "Total number of log entries written to durable storage",
            ),
            flush_failures: Counter::new(
                format!("{prefix}_log_flush_failures_total"),
                "Total number of failed log batch writes",
            ),
            pending: Gauge::new(
                format!("{prefix}_log_buffer_pending"),
                "Current number of log entries waiting to be flushed",
            ),
        }
    }

    /// Format all metrics as Prometheus text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        format!(
            "{}{}{}",
            self.entries_flushed.to_prometheus(),
            self.flush_failures.to_prometheus(),
            self.pending.to_prometheus()
        )
    }
}

impl Default for BufferMetrics {
    fn default() -> Self {
        Self::new("platform")
    }
}
