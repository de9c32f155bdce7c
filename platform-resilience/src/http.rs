//! HTTP-facing helpers shared by every service boundary.
//!
//! Request-id propagation, success headers and the translation of any error
//! into a client response. Non-operational errors are masked so internals
//! never reach a client.

use std::error::Error as StdError;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use uuid::Uuid;

use crate::error::{ErrorResponseBody, ServiceError, as_service_error};

/// Header carrying the request identifier.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Read the inbound request id, or generate a fresh one.
#[must_use]
pub fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string)
}

/// Headers for a successful JSON response.
#[must_use]
pub fn success_headers(request_id: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, APPLICATION_JSON);
    insert_request_id(&mut headers, request_id);
    headers
}

fn insert_request_id(headers: &mut HeaderMap, request_id: Option<&str>) {
    if let Some(value) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}

/// A fully translated error response.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// JSON body
    pub body: ErrorResponseBody,
}

impl ErrorResponse {
    /// Translate a taxonomy error, masking it when non-operational.
    #[must_use]
    pub fn from_service_error(error: &ServiceError, request_id: Option<&str>) -> Self {
        if !error.is_operational() {
            return Self::generic(request_id);
        }

        let mut headers = success_headers(request_id);
        if let Some(seconds) = error.retry_after_seconds() {
            headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
        }

        Self {
            status: StatusCode::from_u16(error.status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers,
            body: error.to_client_body(request_id),
        }
    }

    /// Translate any error escaping a handler.
    #[must_use]
    pub fn from_error(error: &(dyn StdError + 'static), request_id: Option<&str>) -> Self {
        as_service_error(error).map_or_else(
            || Self::generic(request_id),
            |service_error| Self::from_service_error(service_error, request_id),
        )
    }

    fn generic(request_id: Option<&str>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: success_headers(request_id),
            body: ErrorResponseBody::generic(request_id),
        }
    }

    /// Serialized body bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized.
    pub fn body_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_id_is_echoed() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-42"));
        assert_eq!(request_id_from_headers(&headers), "req-42");
    }

    #[test]
    fn test_request_id_is_generated() {
        let id = request_id_from_headers(&HeaderMap::new());
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_success_headers() {
        let headers = success_headers(Some("req-1"));
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[&REQUEST_ID_HEADER], "req-1");

        let headers = success_headers(None);
        assert!(headers.get(&REQUEST_ID_HEADER).is_none());
    }

    #[test]
    fn test_rate_limit_response() {
        let err = ServiceError::rate_limited("Too many requests", 120);
        let response = ErrorResponse::from_service_error(&err, Some("req-7"));

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers[RETRY_AFTER], "120");
        let body = serde_json::to_value(&response.body).unwrap();
        assert_eq!(body["retry_after"], json!(120));
        assert_eq!(body["request_id"], json!("req-7"));
    }

    #[test]
    fn test_operational_error_keeps_message() {
        let err = ServiceError::provider("image provider returned 500");
        let response = ErrorResponse::from_error(&err, None);
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(response.body.error, "image provider returned 500");
        assert_eq!(response.body.error_code, "PROVIDER_ERROR");
    }

    #[test]
    fn test_non_operational_errors_are_masked() {
        let err = ServiceError::storage("relation \"logs\" does not exist")
            .with_detail("table", "logs");
        let response = ErrorResponse::from_error(&err, Some("req-9"));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_value(&response.body).unwrap();
        assert_eq!(
            body,
            json!({
                "error": "An unexpected error occurred",
                "error_code": "INTERNAL_ERROR",
                "request_id": "req-9",
            })
        );

        let foreign = std::io::Error::other("disk full");
        let response = ErrorResponse::from_error(&foreign, None);
        assert_eq!(response.body.error_code, "INTERNAL_ERROR");
        assert!(response.headers.get(RETRY_AFTER).is_none());
    }
}
