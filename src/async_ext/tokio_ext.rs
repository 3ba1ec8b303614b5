//! Tokio-backed retry and timeout helpers.

use core::future::Future;
use core::time::Duration;

use thiserror::Error;

use crate::traits::TransientError;
use crate::types::{ErrorCategory, RouteError};

use super::retry::{retry_with_policy, ExponentialBackoff, RetryPolicy};

/// [`retry_with_policy`] sleeping with `tokio::time::sleep`.
pub async fn retry_transient<F, Fut, T, E, P>(operation: F, policy: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError + core::fmt::Display,
    P: RetryPolicy,
{
    retry_with_policy(operation, policy, tokio::time::sleep).await
}

/// [`retry_transient`] with default exponential backoff and `max_attempts` retries.
pub async fn retry_transient_n<F, Fut, T, E>(operation: F, max_attempts: u32) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError + core::fmt::Display,
{
    retry_transient(operation, ExponentialBackoff::new().with_max_attempts(max_attempts)).await
}

/// An operation did not finish in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {}ms", .0.as_millis())]
pub struct TimeoutError(pub Duration);

impl TimeoutError {
    /// A network-category [`RouteError`] with code `ETIMEDOUT`.
    pub fn into_route_error(self) -> RouteError {
        RouteError::new(self.to_string())
            .with_name("TimeoutError")
            .with_code("ETIMEDOUT")
            .with_category(ErrorCategory::Network)
            .with_source(self)
    }
}

/// Runs `future` for at most `duration`.
///
/// ```
/// use std::time::Duration;
/// use handler_rail::async_ext::with_timeout;
/// use handler_rail::RouteError;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let slow = async {
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     Ok::<_, RouteError>(())
/// };
/// let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
/// assert_eq!(err.code(), Some("ETIMEDOUT"));
/// # }
/// ```
pub async fn with_timeout<T, E, Fut>(duration: Duration, future: Fut) -> Result<T, RouteError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<RouteError>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_elapsed) => Err(TimeoutError(duration).into_route_error()),
    }
}
