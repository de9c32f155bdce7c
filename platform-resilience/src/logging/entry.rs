//! Log entries and the context they are stamped with.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary structured key/value data attached to an entry.
pub type Metadata = Map<String, Value>;

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Convert to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Identity stamped onto every entry a logger produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogContext {
    /// Request being served
    pub request_id: String,
    /// Component emitting the entry
    pub component: String,
    /// Service instance
    pub instance_id: Option<String>,
    /// Calling user
    pub user_id: Option<String>,
}

impl LogContext {
    /// Create a context with the two required fields.
    #[must_use]
    pub fn new(request_id: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            component: component.into(),
            instance_id: None,
            user_id: None,
        }
    }

    /// Add an instance id.
    #[must_use]
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Add a user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Apply `patch` on top of this context.
    #[must_use]
    pub fn merged(&self, patch: &LogContextPatch) -> Self {
        Self {
            request_id: patch.request_id.clone().unwrap_or_else(|| self.request_id.clone()),
            component: patch.component.clone().unwrap_or_else(|| self.component.clone()),
            instance_id: patch.instance_id.clone().or_else(|| self.instance_id.clone()),
            user_id: patch.user_id.clone().or_else(|| self.user_id.clone()),
        }
    }
}

/// Partial context used to derive child loggers. Unset fields are inherited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogContextPatch {
    /// Replacement request id
    pub request_id: Option<String>,
    /// Replacement component
    pub component: Option<String>,
    /// Replacement instance id
    pub instance_id: Option<String>,
    /// Replacement user id
    pub user_id: Option<String>,
}

impl LogContextPatch {
    /// Override the request id.
    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Override the component.
    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Override the instance id.
    #[must_use]
    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Override the user id.
    #[must_use]
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// A single structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Request being served
    pub request_id: String,
    /// Service instance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Calling user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Component emitting the entry
    pub component: String,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl LogEntry {
    /// Create an entry stamped with the current time and `context`.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>, context: &LogContext) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            request_id: context.request_id.clone(),
            instance_id: context.instance_id.clone(),
            user_id: context.user_id.clone(),
            component: context.component.clone(),
            metadata: None,
        }
    }

    /// Attach metadata. An empty map counts as no metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = (!metadata.is_empty()).then_some(metadata);
        self
    }

    /// Override the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// ISO-8601 timestamp with millisecond precision.
    #[must_use]
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Single-line rendering written to the immediate sink.
    ///
    /// `[timestamp] [LEVEL] [component] [request_id] message {metadata}`
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "[{}] [{}] [{}] [{}] {}",
            self.timestamp_iso(),
            self.level,
            self.component,
            self.request_id,
            self.message
        );
        if let Some(metadata) = &self.metadata {
            line.push(' ');
            line.push_str(&Value::Object(metadata.clone()).to_string());
        }
        line
    }
}
