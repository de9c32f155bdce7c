//! Centralized error taxonomy for provider-facing services.
//!
//! Every error a service hands back to a client is a [`ServiceError`]. The
//! [`ErrorKind`] fixes the stable code, the HTTP status and whether the
//! error is *operational* (expected, safe to keep serving) or a fatal fault
//! that should be reported generically and escalated.
//!
//! Two serializations exist and are deliberately different:
//! - [`ServiceError::to_log_value`] for structured logs (never a stack trace)
//! - [`ServiceError::to_client_body`] for HTTP response bodies

use std::any::Any;
use std::error::Error as StdError;

use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Structured detail map attached to an error.
pub type ErrorDetails = Map<String, Value>;

/// Message used in place of the real one for non-operational errors.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Code used in place of the real one for non-operational errors.
pub const GENERIC_ERROR_CODE: &str = "INTERNAL_ERROR";

/// The closed set of error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller could not be authenticated
    AuthenticationFailed,
    /// Caller is authenticated but not allowed
    AuthorizationDenied,
    /// Requested resource does not exist
    NotFound,
    /// Caller exceeded its rate limit
    RateLimited {
        /// Seconds the caller should wait before retrying
        retry_after_seconds: u64,
    },
    /// Request payload failed validation
    ValidationFailed,
    /// Upstream provider returned a failure
    ProviderFailed,
    /// Upstream provider did not answer in time
    ProviderTimedOut,
    /// Service is temporarily unavailable
    ServiceUnavailable,
    /// Unexpected internal fault
    InternalFault,
    /// Durable storage fault
    StorageFault,
}

impl ErrorKind {
    /// Stable, machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "AUTHENTICATION_ERROR",
            Self::AuthorizationDenied => "AUTHORIZATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
            Self::ValidationFailed => "VALIDATION_ERROR",
            Self::ProviderFailed => "PROVIDER_ERROR",
            Self::ProviderTimedOut => "PROVIDER_TIMEOUT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InternalFault => "INTERNAL_ERROR",
            Self::StorageFault => "DATABASE_ERROR",
        }
    }

    /// HTTP status code for this kind.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::AuthenticationFailed => 401,
            Self::AuthorizationDenied => 403,
            Self::NotFound => 404,
            Self::RateLimited { .. } => 429,
            Self::ValidationFailed => 400,
            Self::ProviderFailed => 502,
            Self::ProviderTimedOut => 504,
            Self::ServiceUnavailable => 503,
            Self::InternalFault | Self::StorageFault => 500,
        }
    }

    /// Whether errors of this kind are expected during normal operation.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        !matches!(self, Self::InternalFault | Self::StorageFault)
    }

    /// Variant name used in log serialization.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "AuthenticationError",
            Self::AuthorizationDenied => "AuthorizationError",
            Self::NotFound => "NotFoundError",
            Self::RateLimited { .. } => "RateLimitError",
            Self::ValidationFailed => "ValidationError",
            Self::ProviderFailed => "ProviderError",
            Self::ProviderTimedOut => "ProviderTimeoutError",
            Self::ServiceUnavailable => "ServiceUnavailableError",
            Self::InternalFault => "InternalServerError",
            Self::StorageFault => "DatabaseError",
        }
    }
}

/// Error carried across every service boundary.
///
/// Fields are private; the kind is fixed by the constructor used and the
/// value cannot change once it has been handed out.
///
/// # Examples
///
/// ```
/// use platform_resilience::ServiceError;
///
/// let err = ServiceError::rate_limited("Too many requests", 120);
/// assert_eq!(err.status(), 429);
/// assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
/// assert!(err.is_operational());
///
/// let err = ServiceError::internal("pool exhausted");
/// assert!(!err.is_operational());
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
    details: Option<ErrorDetails>,
}

impl ServiceError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationFailed, message)
    }

    /// Create an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthorizationDenied, message)
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a rate-limit error. `retry_after` is mirrored into the details.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: u64) -> Self {
        Self::new(ErrorKind::RateLimited { retry_after_seconds }, message)
            .with_detail("retry_after", retry_after_seconds)
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailed, message)
    }

    /// Create a provider failure error.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderFailed, message)
    }

    /// Create a provider timeout error.
    #[must_use]
    pub fn provider_timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProviderTimedOut, message)
    }

    /// Create a service unavailable error.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Create an internal fault. Non-operational.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalFault, message)
    }

    /// Create a storage fault. Non-operational.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageFault, message)
    }

    /// Merge a detail map into the error.
    #[must_use]
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details.get_or_insert_with(Map::new).extend(details);
        self
    }

    /// Add a single detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// The error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.kind.status()
    }

    /// Structured details, if any.
    #[must_use]
    pub const fn details(&self) -> Option<&ErrorDetails> {
        self.details.as_ref()
    }

    /// Whether the error is expected during normal operation.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        self.kind.is_operational()
    }

    /// Retry-after hint, only present on rate-limit errors.
    #[must_use]
    pub const fn retry_after_seconds(&self) -> Option<u64> {
        match self.kind {
            ErrorKind::RateLimited { retry_after_seconds } => Some(retry_after_seconds),
            _ => None,
        }
    }

    /// Serialization used for structured logs.
    #[must_use]
    pub fn to_logged(&self) -> LoggedError {
        LoggedError {
            name: self.kind.name(),
            message: self.message.clone(),
            code: self.code(),
            status_code: self.status(),
            details: self.details.clone(),
            is_operational: self.is_operational(),
        }
    }

    /// [`Self::to_logged`] rendered as JSON.
    #[must_use]
    pub fn to_log_value(&self) -> Value {
        serde_json::to_value(self.to_logged()).unwrap_or(Value::Null)
    }

    /// Serialization used for client response bodies.
    #[must_use]
    pub fn to_client_body(&self, request_id: Option<&str>) -> ErrorResponseBody {
        ErrorResponseBody {
            error: self.message.clone(),
            error_code: self.code().to_string(),
            details: self.details.clone(),
            request_id: request_id.map(ToString::to_string),
            retry_after: self.retry_after_seconds(),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::provider_timeout(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 => Self::rate_limited(err.to_string(), 60),
            Some(status) => {
                Self::provider(err.to_string()).with_detail("upstream_status", status.as_u16())
            }
            None => Self::provider(err.to_string()),
        }
    }
}

/// Log-facing view of a [`ServiceError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoggedError {
    /// Variant name
    pub name: &'static str,
    /// Error message
    pub message: String,
    /// Stable error code
    pub code: &'static str,
    /// HTTP status code
    pub status_code: u16,
    /// Structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    /// Operational flag
    pub is_operational: bool,
}

/// Client-facing error response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponseBody {
    /// Human-readable message
    pub error: String,
    /// Stable error code
    pub error_code: String,
    /// Structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    /// Request identifier echoed back to the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Seconds to wait before retrying (rate limits only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponseBody {
    /// Generic body used for non-operational errors.
    #[must_use]
    pub fn generic(request_id: Option<&str>) -> Self {
        Self {
            error: GENERIC_ERROR_MESSAGE.to_string(),
            error_code: GENERIC_ERROR_CODE.to_string(),
            details: None,
            request_id: request_id.map(ToString::to_string),
            retry_after: None,
        }
    }
}

/// Find the taxonomy error behind a dynamic error, if it is one.
#[must_use]
pub fn as_service_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a ServiceError> {
    err.downcast_ref::<ServiceError>()
}

/// Whether `err` is a taxonomy error flagged operational.
///
/// Anything outside the taxonomy is treated as non-operational.
#[must_use]
pub fn is_operational_error(err: &(dyn StdError + 'static)) -> bool {
    as_service_error(err).is_some_and(ServiceError::is_operational)
}

/// Whether the enclosing service should treat `err` as a sign of a deeper fault.
#[must_use]
pub fn should_terminate(err: &(dyn StdError + 'static)) -> bool {
    !is_operational_error(err)
}

/// Serialize any error for logging without ever failing.
///
/// Taxonomy errors use [`ServiceError::to_log_value`]; other errors expose
/// `name`, `message` and their `source()` chain as `stack`.
#[must_use]
pub fn serialize_error(err: &(dyn StdError + 'static)) -> Value {
    if let Some(service_error) = as_service_error(err) {
        return service_error.to_log_value();
    }

    let stack: Vec<String> = std::iter::successors(err.source(), |&e| e.source())
        .map(|cause| format!("Caused by: {cause}"))
        .collect();

    json!({
        "name": "Error",
        "message": err.to_string(),
        "stack": if stack.is_empty() { Value::Null } else { Value::String(stack.join("\n")) },
    })
}

/// Serialize a panic payload or other non-error value.
#[must_use]
pub fn serialize_panic_payload(payload: &(dyn Any + Send)) -> Value {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Unknown error".to_string());

    json!({ "message": message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServiceError::authentication("x").status(), 401);
        assert_eq!(ServiceError::authorization("x").status(), 403);
        assert_eq!(ServiceError::not_found("x").status(), 404);
        assert_eq!(ServiceError::validation("x").status(), 400);
        assert_eq!(ServiceError::rate_limited("x", 1).status(), 429);
        assert_eq!(ServiceError::provider("x").status(), 502);
        assert_eq!(ServiceError::provider_timeout("x").status(), 504);
        assert_eq!(ServiceError::service_unavailable("x").status(), 503);
        assert_eq!(ServiceError::internal("x").status(), 500);
        assert_eq!(ServiceError::storage("x").status(), 500);
    }

    #[test]
    fn test_operational_flags() {
        assert!(ServiceError::validation("bad").is_operational());
        assert!(ServiceError::provider("down").is_operational());
        assert!(!ServiceError::internal("boom").is_operational());
        assert!(!ServiceError::storage("disk").is_operational());
    }

    #[test]
    fn test_rate_limit_mirrors_retry_after() {
        let err = ServiceError::rate_limited("slow down", 120);
        assert_eq!(err.retry_after_seconds(), Some(120));
        assert_eq!(err.details().and_then(|d| d.get("retry_after")), Some(&json!(120)));

        let body = serde_json::to_value(err.to_client_body(Some("req-1"))).unwrap();
        assert_eq!(body["retry_after"], json!(120));
        assert_eq!(body["error_code"], json!("RATE_LIMIT_EXCEEDED"));
        assert_eq!(body["request_id"], json!("req-1"));
    }

    #[test]
    fn test_client_body_omits_absent_fields() {
        let body = serde_json::to_value(ServiceError::not_found("no such image").to_client_body(None))
            .unwrap();
        assert_eq!(body, json!({ "error": "no such image", "error_code": "NOT_FOUND" }));
    }

    #[test]
    fn test_log_value_has_no_stack() {
        let err = ServiceError::validation("prompt too long").with_detail("field", "prompt");
        let value = err.to_log_value();
        assert_eq!(value["name"], json!("ValidationError"));
        assert_eq!(value["code"], json!("VALIDATION_ERROR"));
        assert_eq!(value["status_code"], json!(400));
        assert_eq!(value["details"]["field"], json!("prompt"));
        assert_eq!(value["is_operational"], json!(true));
        assert!(value.get("stack").is_none());
    }

    #[test]
    fn test_with_details_merges() {
        let mut extra = Map::new();
        extra.insert("provider".to_string(), json!("images"));
        let err = ServiceError::rate_limited("slow down", 5).with_details(extra);
        let details = err.details().unwrap();
        assert_eq!(details.get("retry_after"), Some(&json!(5)));
        assert_eq!(details.get("provider"), Some(&json!("images")));
    }

    #[test]
    fn test_classification_of_foreign_errors() {
        let io = std::io::Error::other("socket closed");
        assert!(!is_operational_error(&io));
        assert!(should_terminate(&io));

        let ours = ServiceError::not_found("missing");
        assert!(is_operational_error(&ours));
        assert!(!should_terminate(&ours));

        let fatal = ServiceError::storage("write failed");
        assert!(should_terminate(&fatal));
    }

    #[test]
    fn test_classification_through_anyhow() {
        let err = anyhow::Error::new(ServiceError::provider("bad gateway"));
        assert!(is_operational_error(err.as_ref()));

        let err = anyhow::anyhow!("plain failure");
        assert!(!is_operational_error(err.as_ref()));
    }

    #[test]
    fn test_serialize_generic_error() {
        let inner = std::io::Error::other("connection refused");
        let outer = anyhow::Error::new(inner).context("fetching thumbnail");
        let value = serialize_error(outer.as_ref());
        assert_eq!(value["name"], json!("Error"));
        assert_eq!(value["message"], json!("fetching thumbnail"));
        assert_eq!(value["stack"], json!("Caused by: connection refused"));
    }

    #[test]
    fn test_serialize_walks_full_source_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("upload failed")]
        struct Upload(#[source] Transport);

        #[derive(Debug, thiserror::Error)]
        #[error("transport closed")]
        struct Transport(#[source] std::io::Error);

        let err = Upload(Transport(std::io::Error::other("socket hang up")));
        let value = serialize_error(&err);
        assert_eq!(value["message"], json!("upload failed"));
        assert_eq!(
            value["stack"],
            json!("Caused by: transport closed\nCaused by: socket hang up")
        );
    }

    #[test]
    fn test_serialize_taxonomy_error() {
        let err = ServiceError::provider_timeout("slow upstream");
        assert_eq!(serialize_error(&err), err.to_log_value());
    }

    #[test]
    fn test_serialize_panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(serialize_panic_payload(payload.as_ref()), json!({ "message": "static str" }));

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(serialize_panic_payload(payload.as_ref()), json!({ "message": "owned" }));

        let payload: Box<dyn Any + Send> = Box::new(());
        assert_eq!(serialize_panic_payload(payload.as_ref()), json!({ "message": "Unknown error" }));
    }

    #[test]
    fn test_error_display() {
        let err = ServiceError::provider("upstream returned 500");
        assert_eq!(err.to_string(), "upstream returned 500");
    }
}
