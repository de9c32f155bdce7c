//! Immediate sinks receiving every rendered log line synchronously.

use std::fmt;
use std::io::Write;

use super::entry::LogLevel;

/// Destination for rendered log lines.
pub trait LineSink: Send + Sync + fmt::Debug {
    /// Write one line. Must not fail or panic.
    fn write_line(&self, level: LogLevel, line: &str);
}

/// Writes DEBUG/INFO to stdout and WARN/ERROR to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl LineSink for StdioSink {
    fn write_line(&self, level: LogLevel, line: &str) {
        // A closed pipe must not take the service down with it.
        let _ = match level {
            LogLevel::Debug | LogLevel::Info => writeln!(std::io::stdout().lock(), "{line}"),
            LogLevel::Warn | LogLevel::Error => writeln!(std::io::stderr().lock(), "{line}"),
        };
    }
}

/// Forwards lines to the installed `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LineSink for TracingSink {
    fn write_line(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "structured_log", "{line}"),
            LogLevel::Info => tracing::info!(target: "structured_log", "{line}"),
            LogLevel::Warn => tracing::warn!(target: "structured_log", "{line}"),
            LogLevel::Error => tracing::error!(target: "structured_log", "{line}"),
        }
    }
}
