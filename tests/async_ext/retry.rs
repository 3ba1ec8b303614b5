use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use handler_rail::async_ext::{retry_transient, retry_transient_n, FixedDelay};
use handler_rail::{RouteError, TransientError};

#[derive(Debug)]
enum UpstreamError {
    Busy,
    Rejected,
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Busy => f.write_str("upstream busy"),
            UpstreamError::Rejected => f.write_str("upstream rejected request"),
        }
    }
}

impl TransientError for UpstreamError {
    fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Busy)
    }
}

#[tokio::test]
async fn retries_custom_transient_errors() {
    let calls = AtomicU32::new(0);
    let result = retry_transient(
        || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(UpstreamError::Busy)
            } else {
                Ok("payload")
            }
        },
        FixedDelay::new(Duration::from_millis(1), 5),
    )
    .await;

    assert_eq!(result.unwrap(), "payload");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn stops_on_permanent_error() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = retry_transient(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamError::Rejected)
        },
        FixedDelay::new(Duration::from_millis(1), 5),
    )
    .await;

    assert!(matches!(result, Err(UpstreamError::Rejected)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let result: Result<(), RouteError> = retry_transient_n(
        || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RouteError::new("socket hang up"))
        },
        0,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
