use std::time::{Duration, Instant};

use handler_rail::enrich::EnhanceOptions;
use handler_rail::{
    ErrorCategory, ErrorHandler, MetricsStore, Rail, RequestContext, RequestSnapshot, RouteError,
    SharedContext,
};

use crate::common::quiet;

#[test]
fn enhance_adds_suggestions_with_recovery() {
    let rail = Rail::new(quiet().with_recovery(true));
    let snapshot = RequestSnapshot {
        route: "/users/{id}".to_owned(),
        method: "GET".to_owned(),
        ..RequestSnapshot::default()
    };

    let error = rail.enhance(
        RouteError::new("timeout").with_code("ETIMEDOUT"),
        Some(&snapshot),
        EnhanceOptions::new().correlation_id("corr-1").started(Instant::now()),
    );

    assert_eq!(error.category(), ErrorCategory::Network);
    assert!(error.is_retryable());
    assert_eq!(error.route(), Some("/users/{id}"));
    assert_eq!(error.method(), Some("GET"));
    assert!(error.duration().is_some());
    assert!(error.suggestions().is_some_and(|s| s.len() > 1));
}

#[test]
fn enhance_without_recovery_has_no_suggestions() {
    let rail = Rail::new(quiet());
    let error = rail.enhance(RouteError::new("boom"), None, EnhanceOptions::new());

    assert!(error.suggestions().is_none());
    assert!(error.route().is_none());
    assert!(!error.correlation_id().is_empty());
}

#[test]
fn wrapped_error_handler_records_and_forwards() {
    let rail = Rail::new(quiet());
    let handler = rail.wrap_error_handler(|_: &handler_rail::EnhancedError| {
        Err::<Option<axum::response::Response>, _>(RouteError::new("renderer down"))
    });
    let context = SharedContext::new(RequestContext::new("corr", 5));
    let error = rail.enhance(RouteError::new("boom"), None, EnhanceOptions::new());

    assert!(handler.forwards_failures());
    assert!(handler.handle(&error, &context).is_err());
    assert_eq!(context.error_history().len(), 1);
}

#[test]
fn metrics_store_flags_slow_operations() {
    let store = MetricsStore::new(Duration::ZERO);
    let handle = store.start("/jobs", "post");
    std::thread::sleep(Duration::from_millis(2));
    let sample = store.finish(handle);

    assert!(sample.is_slow_operation());
    assert_eq!(sample.key(), "POST /jobs");
    assert_eq!(store.get(Some("/jobs")).len(), 1);
    assert!(store.get(Some("/other")).is_empty());
}

#[test]
fn clearing_keeps_in_flight_handles() {
    let store = MetricsStore::new(Duration::from_secs(1));
    let handle = store.start("/jobs", "GET");
    store.clear();
    store.finish(handle);
    assert_eq!(store.len(), 1);
}

#[test]
fn reset_clears_metrics() {
    let rail = Rail::new(quiet().with_performance(true));
    let handle = rail.metrics_store().start("/x", "GET");
    rail.metrics_store().finish(handle);
    assert_eq!(rail.metrics(None).len(), 1);

    rail.reset();
    assert!(rail.metrics(None).is_empty());
}
