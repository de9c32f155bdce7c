//! End-to-end scenarios composing retry, timeout, breakers and the HTTP boundary.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use platform_resilience::error::ErrorKind;
use platform_resilience::http::{REQUEST_ID_HEADER, request_id_from_headers, success_headers};
use platform_resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, CircuitState, ErrorResponse, RetryConfig,
    RetryPolicy, ServiceError, with_timeout,
};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use test_utils::FlakyOperation;
use test_utils::fixtures::{fast_breaker_config, fast_retry_config};

#[tokio::test(start_paused = true)]
async fn test_retry_recovers_after_two_failures() {
    let op = FlakyOperation::new(2, ServiceError::provider("upstream 503"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hook_seen = Arc::clone(&seen);

    let config = RetryConfig::default()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(100));
    let policy = RetryPolicy::new(config)
        .with_on_retry(move |_err: &ServiceError, attempt| hook_seen.lock().push(attempt));

    let result = policy.execute(|| op.call()).await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(op.calls(), 3);
    assert_eq!(*seen.lock(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_skips_operation() {
    let registry = CircuitBreakerRegistry::default();
    let config = CircuitBreakerConfig::default().with_failure_threshold(2);
    let op = FlakyOperation::always_failing(ServiceError::provider("upstream 500"));

    for _ in 0..2 {
        let err = registry
            .execute_with_breaker("stability", || op.call(), Some(config.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "upstream 500");
    }
    assert_eq!(registry.get_breaker("stability", None).state(), CircuitState::Open);

    let err = registry
        .execute_with_breaker("stability", || op.call(), None)
        .await
        .unwrap_err();
    assert!(err.message().to_lowercase().contains("circuit breaker is open"));
    let details = err.details().unwrap();
    assert_eq!(details["state"], "OPEN");
    assert!(details["retry_after_seconds"].as_u64().unwrap() > 0);
    assert_eq!(op.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_inside_retry_stops_hitting_provider() {
    let registry = CircuitBreakerRegistry::new(fast_breaker_config());
    let op = FlakyOperation::always_failing(ServiceError::provider_timeout("slow"));
    let policy = RetryPolicy::new(fast_retry_config().with_max_attempts(5));

    let result = policy
        .execute(|| {
            let op = Arc::clone(&op);
            registry.execute_with_breaker("replicate", move || async move { op.call().await }, None)
        })
        .await;

    // Three real failures open the breaker; the last two attempts land inside
    // the cooldown and are rejected without reaching the provider.
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderFailed);
    assert_eq!(op.calls(), 3);

    let states = registry.all_states();
    assert_eq!(states["replicate"].state, CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_through_half_open() {
    let registry = CircuitBreakerRegistry::new(fast_breaker_config());
    let breaker = registry.get_breaker("openai", None);
    let failing = FlakyOperation::new(3, ServiceError::provider("boom"));

    for _ in 0..3 {
        let _ = breaker.execute(|| failing.call()).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(breaker.execute(|| failing.call()).await.unwrap(), 4);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);
    assert_eq!(breaker.execute(|| failing.call()).await.unwrap(), 5);
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_feeds_retry_as_provider_timeout() {
    let calls = Arc::new(Mutex::new(0u32));
    let policy = RetryPolicy::new(fast_retry_config());

    let result: Result<(), ServiceError> = policy
        .execute(|| {
            *calls.lock() += 1;
            with_timeout(
                async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                },
                Duration::from_millis(50),
                None,
            )
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderTimedOut);
    assert_eq!(err.message(), "Operation timed out after 50ms");
    assert_eq!(*calls.lock(), 3);
}

#[test]
fn test_rate_limited_response_scenario() {
    let err = ServiceError::rate_limited("Too many requests", 120);
    let response = ErrorResponse::from_service_error(&err, Some("req-42"));

    assert_eq!(response.status.as_u16(), 429);
    assert_eq!(response.headers.get(RETRY_AFTER).unwrap(), "120");
    assert_eq!(response.headers.get(REQUEST_ID_HEADER).unwrap(), "req-42");

    let body: serde_json::Value = serde_json::from_slice(&response.body_bytes().unwrap()).unwrap();
    assert_eq!(body["retry_after"], 120);
    assert_eq!(body["error_code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["request_id"], "req-42");
}

#[test]
fn test_boundary_masks_foreign_errors() {
    let io = std::io::Error::other("disk on fire");
    let response = ErrorResponse::from_error(&io, None);

    assert_eq!(response.status.as_u16(), 500);
    let body = serde_json::to_value(&response.body).unwrap();
    assert_eq!(body["error"], "An unexpected error occurred");
    assert_eq!(body["error_code"], "INTERNAL_ERROR");
}

#[test]
fn test_request_id_round_trip() {
    let mut inbound = HeaderMap::new();
    inbound.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc-123"));
    let request_id = request_id_from_headers(&inbound);
    assert_eq!(request_id, "abc-123");

    let outbound = success_headers(Some(&request_id));
    assert_eq!(outbound.get(REQUEST_ID_HEADER).unwrap(), "abc-123");
    assert_eq!(outbound.get("content-type").unwrap(), "application/json");

    let generated = request_id_from_headers(&HeaderMap::new());
    assert_eq!(generated.len(), 36);
}
