use std::sync::{Arc, Mutex};

use axum::Router;
use handler_rail::enrich::{EnhanceOptions, Enricher};
use handler_rail::{Rail, RequestContext, RouteError, SharedContext};
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::common::{get, quiet, send};

fn failure(id: &str) -> handler_rail::EnhancedError {
    Enricher::default().enhance(RouteError::new(id), None, EnhanceOptions::new())
}

#[test]
fn history_is_bounded_and_idempotent() {
    let mut context = RequestContext::new("corr", 2);
    let first = failure("first");

    assert!(context.record_error(first.clone()));
    assert!(!context.record_error(first));
    assert!(context.record_error(failure("second")));
    assert!(context.record_error(failure("third")));

    let messages: Vec<_> = context.error_history().iter().map(|e| e.message().to_owned()).collect();
    assert_eq!(messages, ["second", "third"]);
}

#[test]
fn zero_history_keeps_nothing() {
    let mut context = RequestContext::new("corr", 0);
    assert!(!context.record_error(failure("dropped")));
    assert!(context.error_history().is_empty());
}

#[test]
fn create_context_follows_header_precedence() {
    let rail = Rail::new(quiet());
    let mut headers = HeaderMap::new();
    headers.insert("x-trace-id", HeaderValue::from_static("trace"));
    assert_eq!(rail.create_context(&headers).correlation_id(), "trace");

    headers.insert("x-correlation-id", HeaderValue::from_static("corr"));
    assert_eq!(rail.create_context(&headers).correlation_id(), "corr");

    let generated = rail.create_context(&HeaderMap::new());
    assert!(!generated.correlation_id().is_empty());
    assert_eq!(generated.max_history(), 10);
}

#[test]
fn ensure_context_reuses_attached_context() {
    let rail = Rail::new(quiet());
    let mut request = get("/");

    let first = rail.ensure_context(&mut request);
    let second = rail.ensure_context(&mut request);
    assert!(first.ptr_eq(&second));
}

#[tokio::test]
async fn handlers_see_one_active_operation() {
    async fn inspect(context: SharedContext) -> String {
        context.active_operations().to_string()
    }

    let rail = Rail::new(quiet());
    let app: Router = rail.apply(Router::new()).get("/ops", inspect).into_router();
    let (status, _, body) = send(app, get("/ops")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, 1);
}

#[tokio::test]
async fn active_operations_settle_after_success() {
    let captured = Arc::new(Mutex::new(None));
    let slot = captured.clone();
    let handler = move |context: SharedContext| {
        *slot.lock().unwrap() = Some(context);
        std::future::ready("done")
    };

    let rail = Rail::new(quiet());
    let app: Router = rail.apply(Router::new()).get("/ok", handler).into_router();
    let (status, _, body) = send(app, get("/ok")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "done");

    let context: SharedContext = captured.lock().unwrap().clone().unwrap();
    assert_eq!(context.active_operations(), 0);
    assert!(context.error_history().is_empty());
}

#[tokio::test]
async fn handler_metadata_reaches_the_error() {
    let captured = Arc::new(Mutex::new(None));
    let slot = captured.clone();
    let handler = move |context: SharedContext| {
        context.insert_metadata("tenant", "acme");
        *slot.lock().unwrap() = Some(context);
        std::future::ready(Err::<(), _>(RouteError::new("User not found")))
    };

    let rail = Rail::new(quiet());
    let app: Router = rail.apply(Router::new()).get("/meta", handler).into_router();
    send(app, get("/meta")).await;

    let context: SharedContext = captured.lock().unwrap().clone().unwrap();
    let history = context.error_history();
    let snapshot = history[0].context().unwrap();
    assert_eq!(snapshot.metadata["tenant"], "acme");
    assert_eq!(snapshot.route, "/meta");
}
