//! Durable log storage abstraction.
//!
//! The backend is opaque to this crate: anything that can insert a batch of
//! rows atomically, answer a filtered query ordered newest-first and delete
//! rows older than a cutoff can implement [`LogStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::entry::{LogEntry, LogLevel, Metadata};
use crate::error::ServiceError;

/// Row as persisted by a [`LogStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Generated unique id
    pub log_id: Uuid,
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
    /// Severity
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Request being served
    pub request_id: String,
    /// Service instance
    pub instance_id: Option<String>,
    /// Calling user
    pub user_id: Option<String>,
    /// Component emitting the entry
    pub component: String,
    /// Metadata as JSON text
    pub metadata: Option<String>,
}

impl LogRecord {
    /// Build a row from an entry, assigning a fresh `log_id`.
    #[must_use]
    pub fn from_entry(entry: &LogEntry) -> Self {
        Self {
            log_id: Uuid::new_v4(),
            timestamp: entry.timestamp,
            level: entry.level,
            message: entry.message.clone(),
            request_id: entry.request_id.clone(),
            instance_id: entry.instance_id.clone(),
            user_id: entry.user_id.clone(),
            component: entry.component.clone(),
            metadata: entry
                .metadata
                .as_ref()
                .map(|m| Value::Object(m.clone()).to_string()),
        }
    }

    /// Convert back into an entry, parsing the metadata text.
    ///
    /// # Errors
    ///
    /// Returns a storage fault if the metadata column is not a JSON object.
    pub fn into_persisted(self) -> Result<PersistedLogEntry, ServiceError> {
        let metadata = match self.metadata {
            Some(text) => Some(serde_json::from_str::<Metadata>(&text).map_err(|e| {
                ServiceError::storage(format!("Corrupt metadata for log {}: {e}", self.log_id))
            })?),
            None => None,
        };

        Ok(PersistedLogEntry {
            log_id: self.log_id,
            entry: LogEntry {
                timestamp: self.timestamp,
                level: self.level,
                message: self.message,
                request_id: self.request_id,
                instance_id: self.instance_id,
                user_id: self.user_id,
                component: self.component,
                metadata,
            },
        })
    }
}

/// An entry read back from durable storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedLogEntry {
    /// Id assigned at write time
    pub log_id: Uuid,
    /// The stored entry
    #[serde(flatten)]
    pub entry: LogEntry,
}

/// Filters for querying stored logs. All supplied filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Exact level
    pub level: Option<LogLevel>,
    /// Exact component
    pub component: Option<String>,
    /// Exact instance id
    pub instance_id: Option<String>,
    /// Exact request id
    pub request_id: Option<String>,
    /// Inclusive lower timestamp bound
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper timestamp bound
    pub end_time: Option<DateTime<Utc>>,
    /// Maximum number of rows
    pub limit: Option<usize>,
}

impl LogQuery {
    /// Query matching every row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by level.
    #[must_use]
    pub const fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Filter by component.
    #[must_use]
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Filter by instance id.
    #[must_use]
    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Filter by request id.
    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Only rows at or after `start`.
    #[must_use]
    pub const fn start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Only rows at or before `end`.
    #[must_use]
    pub const fn end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    /// Cap the number of rows returned.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` satisfies every supplied filter.
    #[must_use]
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.level.is_none_or(|level| record.level == level)
            && self
                .component
                .as_ref()
                .is_none_or(|c| *c == record.component)
            && self
                .instance_id
                .as_ref()
                .is_none_or(|i| record.instance_id.as_ref() == Some(i))
            && self
                .request_id
                .as_ref()
                .is_none_or(|r| *r == record.request_id)
            && self.start_time.is_none_or(|start| record.timestamp >= start)
            && self.end_time.is_none_or(|end| record.timestamp <= end)
    }
}

/// Durable store for log rows.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Insert all rows in one all-or-nothing write.
    async fn insert_batch(&self, records: Vec<LogRecord>) -> Result<(), ServiceError>;

    /// Rows matching `query`, newest first, honoring its limit.
    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, ServiceError>;

    /// Delete rows with `timestamp < cutoff`, returning how many were removed.
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError>;
}

/// In-process [`LogStore`].
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    rows: RwLock<Vec<LogRecord>>,
}

impl MemoryLogStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Copy of every stored row in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<LogRecord> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert_batch(&self, records: Vec<LogRecord>) -> Result<(), ServiceError> {
        self.rows.write().extend(records);
        Ok(())
    }

    async fn query(&self, query: &LogQuery) -> Result<Vec<LogRecord>, ServiceError> {
        let mut matched: Vec<LogRecord> = self
            .rows
            .read()
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|record| record.timestamp >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::entry::LogContext;
    use chrono::Duration;
    use serde_json::json;

    fn record(level: LogLevel, component: &str, request_id: &str, age_secs: i64) -> LogRecord {
        let context = LogContext::new(request_id, component).with_instance_id("i-1");
        let entry = LogEntry::new(level, format!("{component} {age_secs}"), &context)
            .with_timestamp(Utc::now() - Duration::seconds(age_secs));
        LogRecord::from_entry(&entry)
    }

    #[test]
    fn test_record_round_trips_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("provider".to_string(), json!("images"));
        let context = LogContext::new("req-1", "api");
        let entry = LogEntry::new(LogLevel::Info, "ok", &context).with_metadata(metadata);

        let row = LogRecord::from_entry(&entry);
        assert_eq!(row.metadata.as_deref(), Some("{\"provider\":\"images\"}"));
        let persisted = row.clone().into_persisted().unwrap();
        assert_eq!(persisted.log_id, row.log_id);
        assert_eq!(persisted.entry, entry);
    }

    #[test]
    fn test_corrupt_metadata_is_a_storage_fault() {
        let mut row = record(LogLevel::Info, "api", "req-1", 0);
        row.metadata = Some("not json".to_string());
        let err = row.into_persisted().unwrap_err();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }

    #[test]
    fn test_each_record_gets_a_fresh_id() {
        let context = LogContext::new("req-1", "api");
        let entry = LogEntry::new(LogLevel::Info, "ok", &context);
        assert_ne!(LogRecord::from_entry(&entry).log_id, LogRecord::from_entry(&entry).log_id);
    }

    #[tokio::test]
    async fn test_query_filters_and_orders_newest_first() {
        let store = MemoryLogStore::new();
        store
            .insert_batch(vec![
                record(LogLevel::Info, "api", "req-1", 30),
                record(LogLevel::Error, "api", "req-1", 20),
                record(LogLevel::Error, "worker", "req-2", 10),
                record(LogLevel::Error, "api", "req-3", 5),
            ])
            .await
            .unwrap();

        let rows = store
            .query(&LogQuery::new().level(LogLevel::Error).component("api"))
            .await
            .unwrap();
        let messages: Vec<_> = rows.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["api 5", "api 20"]);

        let rows = store.query(&LogQuery::new().limit(2)).await.unwrap();
        let messages: Vec<_> = rows.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["api 5", "worker 10"]);

        let rows = store
            .query(&LogQuery::new().request_id("req-1").instance_id("i-1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_time_bounds_are_inclusive() {
        let store = MemoryLogStore::new();
        let row = record(LogLevel::Info, "api", "req-1", 60);
        let ts = row.timestamp;
        store.insert_batch(vec![row]).await.unwrap();

        let rows = store
            .query(&LogQuery::new().start_time(ts).end_time(ts))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let rows = store
            .query(&LogQuery::new().start_time(ts + Duration::milliseconds(1)))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_delete_before_is_strict() {
        let store = MemoryLogStore::new();
        let old = record(LogLevel::Info, "api", "req-1", 3600);
        let cutoff = old.timestamp;
        store
            .insert_batch(vec![
                record(LogLevel::Info, "api", "req-1", 7200),
                old,
                record(LogLevel::Info, "api", "req-1", 0),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_before(cutoff).await.unwrap(), 1);
        assert_eq!(store.len(), 2);
    }
}
