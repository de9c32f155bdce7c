//! Context-stamped structured logger.

use std::error::Error as StdError;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::buffer::LogBuffer;
use super::entry::{LogContext, LogContextPatch, LogEntry, LogLevel, Metadata};
use super::sink::{LineSink, StdioSink};
use super::store::{LogQuery, PersistedLogEntry};
use crate::error::{ServiceError, serialize_error};

/// Structured logger bound to a [`LogContext`].
///
/// Every entry is written to the immediate sink first and then, when a
/// buffer is attached, enqueued for durable storage. Logging never fails:
/// enqueue errors are reported to the sink and through `tracing`, then dropped.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context: LogContext,
    buffer: Option<Arc<LogBuffer>>,
    sink: Arc<dyn LineSink>,
}

impl StructuredLogger {
    /// Create a logger writing to stdout/stderr without durable storage.
    #[must_use]
    pub fn new(context: LogContext) -> Self {
        Self {
            context,
            buffer: None,
            sink: Arc::new(StdioSink),
        }
    }

    /// Attach a durable buffer.
    #[must_use]
    pub fn with_buffer(mut self, buffer: Arc<LogBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Replace the immediate sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn LineSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Context stamped onto entries.
    #[must_use]
    pub const fn context(&self) -> &LogContext {
        &self.context
    }

    /// Attached buffer, if any.
    #[must_use]
    pub fn buffer(&self) -> Option<&Arc<LogBuffer>> {
        self.buffer.as_ref()
    }

    /// Derive a logger whose context is this one with `patch` applied.
    /// The buffer and sink are shared.
    #[must_use]
    pub fn child(&self, patch: &LogContextPatch) -> Self {
        Self {
            context: self.context.merged(patch),
            buffer: self.buffer.clone(),
            sink: Arc::clone(&self.sink),
        }
    }

    /// Log at `level`.
    pub async fn log(&self, level: LogLevel, message: &str, metadata: Option<Metadata>) {
        let mut entry = LogEntry::new(level, message, &self.context);
        if let Some(metadata) = metadata {
            entry = entry.with_metadata(metadata);
        }

        self.sink.write_line(level, &entry.to_line());

        if let Some(buffer) = &self.buffer {
            if let Err(err) = buffer.add(entry).await {
                warn!(
                    error = %err,
                    component = %self.context.component,
                    "Failed to enqueue log entry"
                );
                let notice = LogEntry::new(
                    LogLevel::Warn,
                    &format!("Failed to enqueue log entry: {err}"),
                    &self.context,
                );
                self.sink.write_line(LogLevel::Warn, &notice.to_line());
            }
        }
    }

    /// Log at DEBUG.
    pub async fn debug(&self, message: &str, metadata: Option<Metadata>) {
        self.log(LogLevel::Debug, message, metadata).await;
    }

    /// Log at INFO.
    pub async fn info(&self, message: &str, metadata: Option<Metadata>) {
        self.log(LogLevel::Info, message, metadata).await;
    }

    /// Log at WARN.
    pub async fn warn(&self, message: &str, metadata: Option<Metadata>) {
        self.log(LogLevel::Warn, message, metadata).await;
    }

    /// Log at ERROR.
    pub async fn error(&self, message: &str, metadata: Option<Metadata>) {
        self.log(LogLevel::Error, message, metadata).await;
    }

    /// Log `err` at ERROR under the `error` metadata key.
    pub async fn log_error(&self, message: &str, err: &(dyn StdError + 'static)) {
        let mut metadata = Metadata::new();
        metadata.insert("error".to_string(), serialize_error(err));
        self.error(message, Some(metadata)).await;
    }

    /// Flush the attached buffer. Without one this does nothing.
    ///
    /// # Errors
    ///
    /// Returns the buffer's storage error.
    pub async fn flush(&self) -> Result<usize, ServiceError> {
        match &self.buffer {
            Some(buffer) => buffer.flush().await,
            None => Ok(0),
        }
    }

    /// Query durable storage.
    ///
    /// # Errors
    ///
    /// Fails with a storage fault when no buffer is attached.
    pub async fn query(&self, query: &LogQuery) -> Result<Vec<PersistedLogEntry>, ServiceError> {
        match &self.buffer {
            Some(buffer) => buffer.query(query).await,
            None => Err(ServiceError::storage("Log storage is not configured")
                .with_detail("component", Value::String(self.context.component.clone()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_without_buffer_is_storage_fault() {
        let logger = StructuredLogger::new(LogContext::new("req-1", "api"));
        let err = logger.query(&LogQuery::new()).await.unwrap_err();
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert!(!err.is_operational());
    }

    #[tokio::test]
    async fn test_flush_without_buffer_is_noop() {
        let logger = StructuredLogger::new(LogContext::new("req-1", "api"));
        assert_eq!(logger.flush().await.unwrap(), 0);
    }

    #[test]
    fn test_child_inherits_context() {
        let logger = StructuredLogger::new(LogContext::new("req-1", "api").with_user_id("u-7"));
        let child = logger.child(&LogContextPatch::default().request_id("req-2"));
        assert_eq!(child.context().request_id, "req-2");
        assert_eq!(child.context().component, "api");
        assert_eq!(child.context().user_id.as_deref(), Some("u-7"));
        assert_eq!(logger.context().request_id, "req-1");
    }
}
