//! Structured logging with batched durable storage.
//!
//! [`StructuredLogger`] stamps entries with a [`LogContext`], writes them to a
//! [`LineSink`] immediately and hands them to a [`LogBuffer`], which persists
//! them in batches through a [`LogStore`].

pub mod buffer;
pub mod entry;
pub mod logger;
pub mod sink;
pub mod store;

pub use buffer::{LogBuffer, LogBufferConfig};
pub use entry::{LogContext, LogContextPatch, LogEntry, LogLevel, Metadata};
pub use logger::StructuredLogger;
pub use sink::{LineSink, StdioSink, TracingSink};
pub use store::{LogQuery, LogRecord, LogStore, MemoryLogStore, PersistedLogEntry};
