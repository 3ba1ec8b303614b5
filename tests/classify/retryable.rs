use handler_rail::{Classifier, ErrorCategory, RouteError, TransientError};
use http::StatusCode;

#[test]
fn network_is_always_retryable() {
    let err = RouteError::new("getaddrinfo ENOTFOUND api.internal");
    assert!(Classifier::new().is_retryable(&err));
}

#[test]
fn database_needs_a_transient_signal() {
    let classifier = Classifier::new();
    let deadlock = RouteError::new("deadlock detected in transaction");
    let lock_wait = RouteError::new("sql error").with_code("ER_LOCK_WAIT_TIMEOUT");
    let duplicate = RouteError::new("duplicate key value violates unique constraint");

    assert!(classifier.is_retryable(&deadlock));
    assert!(classifier.is_retryable(&lock_wait));
    assert!(!classifier.is_retryable(&duplicate));
}

#[test]
fn client_errors_are_never_retryable() {
    let classifier = Classifier::new();
    for category in [
        ErrorCategory::Validation,
        ErrorCategory::Authentication,
        ErrorCategory::Authorization,
        ErrorCategory::System,
    ] {
        let err = RouteError::new("x").with_status(StatusCode::SERVICE_UNAVAILABLE);
        assert!(!classifier.is_retryable_as(&err, category), "{category}");
    }
}

#[test]
fn unknown_is_retryable_only_for_server_status() {
    let classifier = Classifier::new();
    let plain = RouteError::new("User not found");
    let unavailable = RouteError::new("maintenance").with_status(StatusCode::SERVICE_UNAVAILABLE);

    assert!(!classifier.is_retryable(&plain));
    assert!(classifier.is_retryable(&unavailable));
}

#[test]
fn transient_trait_uses_default_rules() {
    assert!(RouteError::new("ECONNRESET by peer").is_transient());
    assert!(RouteError::new("access denied").is_permanent());
}
