//! Shared test utilities for `platform-resilience`.
//!
//! This crate provides:
//! - Proptest generators for errors, levels and log entries
//! - Mock log stores, sinks and flaky upstream operations
//! - Test fixtures with sample data

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
pub use mocks::{FlakyOperation, MemorySink, RecordingLogStore};
