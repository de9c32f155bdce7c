//! Deadline wrapper for provider calls.
//!
//! The operation and the deadline race; whichever settles first decides the
//! outcome. When the deadline wins the operation future is dropped, which
//! cancels it at its next suspension point.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ServiceError;

/// Run `operation` with a deadline.
///
/// # Errors
///
/// Returns the operation's own error, or `timeout_error` (falling back to a
/// provider-timeout [`ServiceError`] naming the duration) when the deadline
/// expires first.
pub async fn with_timeout<F, T, E>(
    operation: F,
    timeout: Duration,
    timeout_error: Option<E>,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<ServiceError>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            let timeout_ms = timeout.as_millis();
            warn!(timeout_ms = timeout_ms as u64, "Operation timed out");
            Err(timeout_error.unwrap_or_else(|| {
                ServiceError::provider_timeout(format!("Operation timed out after {timeout_ms}ms"))
                    .into()
            }))
        }
    }
}
