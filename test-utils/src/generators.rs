//! Shared proptest generators for `platform-resilience` domain types.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::Value;
use std::time::Duration;

use platform_resilience::error::{ErrorKind, ServiceError};
use platform_resilience::logging::{LogContext, LogEntry, LogLevel, Metadata};

/// Generate log levels.
pub fn log_level_strategy() -> impl Strategy<Value = LogLevel> {
    prop_oneof![
        Just(LogLevel::Debug),
        Just(LogLevel::Info),
        Just(LogLevel::Warn),
        Just(LogLevel::Error),
    ]
}

/// Generate every error kind.
pub fn error_kind_strategy() -> impl Strategy<Value = ErrorKind> {
    prop_oneof![
        Just(ErrorKind::AuthenticationFailed),
        Just(ErrorKind::AuthorizationDenied),
        Just(ErrorKind::NotFound),
        (1u64..3600).prop_map(|retry_after_seconds| ErrorKind::RateLimited { retry_after_seconds }),
        Just(ErrorKind::ValidationFailed),
        Just(ErrorKind::ProviderFailed),
        Just(ErrorKind::ProviderTimedOut),
        Just(ErrorKind::ServiceUnavailable),
        Just(ErrorKind::InternalFault),
        Just(ErrorKind::StorageFault),
    ]
}

/// Generate taxonomy errors with a message and optional details.
pub fn service_error_strategy() -> impl Strategy<Value = ServiceError> {
    (
        error_kind_strategy(),
        message_strategy(),
        proptest::option::of(metadata_strategy()),
    )
        .prop_map(|(kind, message, details)| {
            let err = build_error(kind, message);
            match details {
                Some(details) => err.with_details(details),
                None => err,
            }
        })
}

/// Build an error of `kind` through its public constructor.
#[must_use]
pub fn build_error(kind: ErrorKind, message: String) -> ServiceError {
    match kind {
        ErrorKind::AuthenticationFailed => ServiceError::authentication(message),
        ErrorKind::AuthorizationDenied => ServiceError::authorization(message),
        ErrorKind::NotFound => ServiceError::not_found(message),
        ErrorKind::RateLimited { retry_after_seconds } => {
            ServiceError::rate_limited(message, retry_after_seconds)
        }
        ErrorKind::ValidationFailed => ServiceError::validation(message),
        ErrorKind::ProviderFailed => ServiceError::provider(message),
        ErrorKind::ProviderTimedOut => ServiceError::provider_timeout(message),
        ErrorKind::ServiceUnavailable => ServiceError::service_unavailable(message),
        ErrorKind::InternalFault => ServiceError::internal(message),
        ErrorKind::StorageFault => ServiceError::storage(message),
    }
}

/// Generate human-readable messages.
pub fn message_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,60}"
}

/// Generate request ids.
pub fn request_id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9-]{8,36}"
}

/// Generate component names.
pub fn component_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{2,20}"
}

/// Generate small flat metadata maps.
pub fn metadata_strategy() -> impl Strategy<Value = Metadata> {
    proptest::collection::btree_map(
        "[a-z]{1,10}",
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,20}".prop_map(Value::from),
        ],
        1..5,
    )
    .prop_map(|map| map.into_iter().collect())
}

/// Generate log contexts with optional instance and user ids.
pub fn log_context_strategy() -> impl Strategy<Value = LogContext> {
    (
        request_id_strategy(),
        component_strategy(),
        proptest::option::of("i-[a-z0-9]{6}"),
        proptest::option::of("u-[a-z0-9]{6}"),
    )
        .prop_map(|(request_id, component, instance_id, user_id)| {
            let mut context = LogContext::new(request_id, component);
            context.instance_id = instance_id;
            context.user_id = user_id;
            context
        })
}

/// Generate timestamps with millisecond precision within 2020-2030.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800_000i64..1_893_456_000_000).prop_filter_map("valid timestamp", |millis| {
        Utc.timestamp_millis_opt(millis).single()
    })
}

/// Generate log entries.
pub fn log_entry_strategy() -> impl Strategy<Value = LogEntry> {
    (
        log_level_strategy(),
        message_strategy(),
        log_context_strategy(),
        proptest::option::of(metadata_strategy()),
        timestamp_strategy(),
    )
        .prop_map(|(level, message, context, metadata, timestamp)| {
            let entry = LogEntry::new(level, message, &context).with_timestamp(timestamp);
            match metadata {
                Some(metadata) => entry.with_metadata(metadata),
                None => entry,
            }
        })
}

/// Generate backoff base delays (1ms to 1s).
pub fn delay_strategy() -> impl Strategy<Value = Duration> {
    (1u64..1000).prop_map(Duration::from_millis)
}

/// Generate HTTP status codes that are client errors other than 429.
pub fn non_retryable_status_strategy() -> impl Strategy<Value = u16> {
    (400u16..500).prop_filter("429 is retryable", |status| *status != 429)
}
