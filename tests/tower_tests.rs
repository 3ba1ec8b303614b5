//! Tests for the tower layers used without a router.

mod common;

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use handler_rail::tower::{RailLayer, ServiceRailExt};
use handler_rail::{ErrorCategory, Rail, RequestContext, RouteError, SharedContext};
use http::{HeaderValue, Request, StatusCode};
use std::convert::Infallible;
use tower::{service_fn, Layer, ServiceExt};

use common::{get, quiet, read};

async fn ok(_request: Request<Body>) -> Result<Response, RouteError> {
    Ok((StatusCode::OK, "fine").into_response())
}

async fn refused(_request: Request<Body>) -> Result<Response, RouteError> {
    Err(RouteError::new("connect ECONNREFUSED 10.0.0.5:5432"))
}

async fn boom(_request: Request<Body>) -> Result<Response, RouteError> {
    panic!("kaboom")
}

async fn late(_request: Request<Body>) -> Result<Response, RouteError> {
    let sent = (StatusCode::ACCEPTED, "partial").into_response();
    Err(RouteError::new("audit write failed").after_response(sent))
}

fn with_context(mut request: Request<Body>, id: &str) -> (Request<Body>, SharedContext) {
    let context = SharedContext::new(RequestContext::new(id, 10));
    request.extensions_mut().insert(context.clone());
    (request, context)
}

#[tokio::test]
async fn success_passes_through() {
    let rail = Rail::new(quiet());
    let response = rail.wrap(service_fn(ok)).oneshot(get("/ok")).await.unwrap();

    let (status, _, body) = read(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "fine");
}

#[tokio::test]
async fn failure_becomes_envelope() {
    let rail = Rail::new(quiet());
    let (request, context) = with_context(get("/db"), "corr-tower");

    let response = RailLayer::new(rail).layer(service_fn(refused)).oneshot(request).await.unwrap();
    let (status, _, body) = read(response).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["category"], "network");
    assert_eq!(body["error"]["retryable"], true);
    assert_eq!(body["error"]["correlationId"], "corr-tower");
    assert_eq!(body["error"]["details"]["route"], "/db");
    assert_eq!(body["error"]["details"]["method"], "GET");

    let history = context.error_history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].category(), ErrorCategory::Network);
    assert_eq!(context.active_operations(), 0);
}

#[tokio::test]
async fn panics_are_recovered() {
    let rail = Rail::new(quiet());
    let response = service_fn(boom).with_rail(&rail).oneshot(get("/panic")).await.unwrap();
    let (status, _, body) = read(response).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["message"], "kaboom");
    assert_eq!(body["error"]["category"], "unknown");
}

#[tokio::test]
async fn nested_wrapping_handles_once() {
    let rail = Rail::new(quiet().with_performance(true));
    let (request, context) = with_context(get("/db"), "corr-nested");

    let service = rail.wrap(rail.wrap(rail.wrap(service_fn(refused))));
    let response = service.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(context.error_history().len(), 1);
    assert_eq!(rail.metrics(None).len(), 1);
}

#[tokio::test]
async fn failures_after_response_keep_that_response() {
    let rail = Rail::new(quiet());
    let (request, context) = with_context(get("/audit"), "corr-late");

    let response = rail.wrap(service_fn(late)).oneshot(request).await.unwrap();
    let (status, _, body) = read(response).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, "partial");
    assert_eq!(context.error_history().len(), 1);
    assert_eq!(context.error_history()[0].message(), "audit write failed");
}

#[tokio::test]
async fn context_layer_echoes_correlation_id() {
    let rail = Rail::new(quiet());
    let service = rail.context_layer().layer(service_fn(|_req: Request<Body>| async {
        Ok::<_, Infallible>(StatusCode::NO_CONTENT.into_response())
    }));

    let mut request = get("/");
    request.headers_mut().insert("x-request-id", HeaderValue::from_static("req-42"));
    let response = service.oneshot(request).await.unwrap();

    assert_eq!(response.headers()["x-correlation-id"], "req-42");
}

#[tokio::test]
async fn context_layer_keeps_handler_header() {
    let rail = Rail::new(quiet());
    let service = rail.context_layer().layer(service_fn(|_req: Request<Body>| async {
        let mut response = StatusCode::OK.into_response();
        response.headers_mut().insert("x-correlation-id", HeaderValue::from_static("mine"));
        Ok::<_, Infallible>(response)
    }));

    let response = service.oneshot(get("/")).await.unwrap();
    assert_eq!(response.headers()["x-correlation-id"], "mine");
}
