//! Shared helpers for integration tests.
#![allow(dead_code)]

use axum::body::Body;
use axum::response::Response;
use axum::Router;
use handler_rail::config::{Environment, RailConfig};
use http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

/// Logging off and a fixed non-production environment.
pub fn quiet() -> RailConfig {
    RailConfig::default().with_error_logging(false).with_environment(Environment::Test)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

pub async fn read(response: Response) -> (StatusCode, HeaderMap, Value) {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    read(app.oneshot(request).await.unwrap()).await
}
