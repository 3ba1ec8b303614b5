use std::time::Duration;

use handler_rail::async_ext::with_timeout;
use handler_rail::{Classifier, ErrorCategory, RouteError};

#[tokio::test]
async fn finished_work_is_returned() {
    let value = with_timeout(Duration::from_secs(1), async { Ok::<_, RouteError>(42) }).await;
    assert_eq!(value.unwrap(), 42);
}

#[tokio::test]
async fn io_errors_convert() {
    let err = with_timeout(Duration::from_secs(1), async {
        Err::<(), _>(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
    })
    .await
    .unwrap_err();

    assert_eq!(err.code(), Some("ECONNREFUSED"));
    assert_eq!(Classifier::new().classify(&err), ErrorCategory::Network);
}

#[tokio::test]
async fn elapsed_work_times_out() {
    let err = with_timeout(Duration::from_millis(5), std::future::pending::<Result<(), RouteError>>())
        .await
        .unwrap_err();

    assert_eq!(err.name(), "TimeoutError");
    assert!(err.message().contains("timed out"));
}
