//! Tower integration.
//!
//! [`RailLayer`] wraps a service with the failure pipeline: it attaches the
//! request context, counts the call as an active operation, optionally samples
//! its timing, and turns any failure (an `Err`, a [`RouteError`] response or a
//! panic) into the rail's error response.
//!
//! [`ContextLayer`] only attaches the context and echoes the correlation id
//! on the response. It is meant to sit around a whole router.
//!
//! # Example
//!
//! ```
//! use axum::{routing::get, Router};
//! use handler_rail::{Rail, RailConfig, RouteError};
//!
//! async fn fails() -> Result<(), RouteError> {
//!     Err(RouteError::new("connection refused"))
//! }
//!
//! let rail = Rail::new(RailConfig::default());
//! let app: Router = Router::new()
//!     .route("/health", get(fails).layer(rail.layer()))
//!     .layer(rail.context_layer());
//! # let _ = app;
//! ```

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::response::{IntoResponse, Response};
use futures_util::future::{BoxFuture, FusedFuture};
use futures_util::FutureExt;
use http::{HeaderValue, Request};
use pin_project_lite::pin_project;
use tower::{Layer, Service, ServiceExt};

use crate::context::CORRELATION_RESPONSE_HEADER;
use crate::rail::Rail;
use crate::types::{Failure, RequestSnapshot, RouteError};

/// Marks a request as already guarded by the rail with this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Guarded(u64);

/// A Tower [`Layer`] that runs wrapped services inside the failure pipeline.
#[derive(Clone, Debug)]
pub struct RailLayer {
    rail: Rail,
}

impl RailLayer {
    #[inline]
    pub fn new(rail: Rail) -> Self {
        Self { rail }
    }

    #[inline]
    pub fn rail(&self) -> &Rail {
        &self.rail
    }
}

impl<S> Layer<S> for RailLayer {
    type Service = RailService<S>;

    #[inline]
    fn layer(&self, inner: S) -> Self::Service {
        RailService::new(inner, self.rail.clone())
    }
}

/// A Tower [`Service`] created by [`RailLayer`].
///
/// Never fails: every failure of the inner service becomes a response.
/// Nesting services of the same rail is harmless, only the outermost one
/// handles a request.
#[derive(Clone, Debug)]
pub struct RailService<S> {
    inner: S,
    rail: Rail,
}

impl<S> RailService<S> {
    #[inline]
    pub fn new(inner: S, rail: Rail) -> Self {
        Self { inner, rail }
    }

    #[inline]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    #[inline]
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    #[inline]
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, B> Service<Request<B>> for RailService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Response: IntoResponse,
    S::Error: Into<RouteError>,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    #[inline]
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // readiness of `inner` is awaited per call through `oneshot`
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let rail = self.rail.clone();
        Box::pin(async move { Ok(guard(rail, inner, request).await) })
    }
}

async fn guard<S, B>(rail: Rail, inner: S, mut request: Request<B>) -> Response
where
    S: Service<Request<B>> + Send,
    S::Response: IntoResponse,
    S::Error: Into<RouteError>,
    S::Future: Send,
    B: Send,
{
    if rail.is_inert() {
        return pass_through(inner, request).await;
    }

    let context = rail.ensure_context(&mut request);
    if request.extensions().get::<Guarded>() == Some(&Guarded(rail.id())) {
        return pass_through(inner, request).await;
    }
    request.extensions_mut().insert(Guarded(rail.id()));

    let (mut parts, body) = request.into_parts();
    let snapshot = RequestSnapshot::capture(&mut parts).await;
    let request = Request::from_parts(parts, body);

    let started = Instant::now();
    let sample = rail
        .config()
        .performance
        .then(|| rail.metrics_store().start(snapshot.route.clone(), snapshot.method.clone()));
    context.lock().begin_operation();

    let outcome = AssertUnwindSafe(inner.oneshot(request)).catch_unwind().await;

    context.lock().end_operation();
    if let Some(sample) = sample {
        rail.metrics_store().finish(sample);
    }

    let (error, sent) = match outcome {
        Ok(Ok(response)) => {
            let mut response = response.into_response();
            match Failure::take(&mut response) {
                None => return response,
                Some(Failure { error, committed: true }) => (error, Some(response)),
                Some(Failure { error, committed: false }) => (error, None),
            }
        },
        Ok(Err(error)) => {
            let mut error: RouteError = error.into();
            let sent = error.take_sent_response();
            (error, sent)
        },
        Err(panic) => (RouteError::from_panic(panic), None),
    };

    tracing::debug!(
        correlation_id = %context.correlation_id(),
        route = %snapshot.route,
        "intercepted handler failure"
    );
    rail.handle_failure(error, sent, &snapshot, &context, started)
}

/// Calls `inner` untouched; failures stay in the response for an outer guard.
async fn pass_through<S, B>(inner: S, request: Request<B>) -> Response
where
    S: Service<Request<B>>,
    S::Response: IntoResponse,
    S::Error: Into<RouteError>,
{
    match inner.oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(error) => error.into().into_response(),
    }
}

/// A Tower [`Layer`] that attaches the request context.
#[derive(Clone, Debug)]
pub struct ContextLayer {
    rail: Rail,
}

impl ContextLayer {
    #[inline]
    pub fn new(rail: Rail) -> Self {
        Self { rail }
    }
}

impl<S> Layer<S> for ContextLayer {
    type Service = ContextService<S>;

    #[inline]
    fn layer(&self, inner: S) -> Self::Service {
        ContextService { inner, rail: self.rail.clone() }
    }
}

/// A Tower [`Service`] created by [`ContextLayer`].
#[derive(Clone, Debug)]
pub struct ContextService<S> {
    inner: S,
    rail: Rail,
}

impl<S> ContextService<S> {
    #[inline]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    #[inline]
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, B> Service<Request<B>> for ContextService<S>
where
    S: Service<Request<B>, Response = Response>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = ContextFuture<S::Future>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let correlation_id = if self.rail.is_inert() {
            None
        } else {
            let context = self.rail.ensure_context(&mut request);
            self.rail
                .config()
                .correlation_id
                .then(|| HeaderValue::from_str(&context.correlation_id()).ok())
                .flatten()
        };
        ContextFuture::new(self.inner.call(request), correlation_id)
    }
}

pin_project! {
    /// Future returned by [`ContextService`].
    ///
    /// Echoes the correlation id on the response unless the handler set it.
    #[must_use = "futures do nothing unless polled"]
    pub struct ContextFuture<F> {
        #[pin]
        inner: F,
        correlation_id: Option<HeaderValue>,
        done: bool,
    }
}

impl<F> ContextFuture<F> {
    #[inline]
    fn new(inner: F, correlation_id: Option<HeaderValue>) -> Self {
        Self { inner, correlation_id, done: false }
    }
}

impl<F, E> Future for ContextFuture<F>
where
    F: Future<Output = Result<Response, E>>,
{
    type Output = Result<Response, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Ready(Ok(mut response)) => {
                *this.done = true;
                if let Some(value) = this.correlation_id.take() {
                    response.headers_mut().entry(CORRELATION_RESPONSE_HEADER).or_insert(value);
                }
                Poll::Ready(Ok(response))
            },
            Poll::Ready(Err(error)) => {
                *this.done = true;
                Poll::Ready(Err(error))
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F, E> FusedFuture for ContextFuture<F>
where
    F: Future<Output = Result<Response, E>>,
{
    #[inline]
    fn is_terminated(&self) -> bool {
        self.done
    }
}

/// Extension trait for wrapping any service with a rail.
pub trait ServiceRailExt: Sized {
    /// Equivalent to [`Rail::wrap`].
    ///
    /// ```
    /// use handler_rail::tower::ServiceRailExt;
    /// use handler_rail::{Rail, RailConfig, RouteError};
    /// use http::Request;
    ///
    /// let rail = Rail::new(RailConfig::default());
    /// let service = tower::service_fn(|_req: Request<()>| async {
    ///     Err::<&'static str, _>(RouteError::new("nope"))
    /// });
    /// let _guarded = service.with_rail(&rail);
    /// ```
    fn with_rail(self, rail: &Rail) -> RailService<Self> {
        rail.wrap(self)
    }
}

impl<S> ServiceRailExt for S where S: Clone + Send + 'static {}
