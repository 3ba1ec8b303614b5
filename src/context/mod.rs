//! Per-request context: correlation id, timing, metadata and error history.
//!
//! A [`RequestContext`] is created once per request and shared through the
//! request extensions as a [`SharedContext`]. Creation is idempotent: the
//! first access wins and later calls hand back the same context, so error
//! history accumulated by inner layers is never lost on re-entry.
//!
//! Handlers can extract the context directly:
//!
//! ```
//! use handler_rail::context::SharedContext;
//!
//! async fn whoami(context: SharedContext) -> String {
//!     context.correlation_id()
//! }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRequestParts;
use chrono::{DateTime, Utc};
use http::request::Parts;
use http::{HeaderMap, Request};
use parking_lot::{Mutex, MutexGuard};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{EnhancedError, RouteError};

/// Inbound headers consulted for an existing correlation id, in precedence order.
pub const CORRELATION_HEADERS: [&str; 3] = ["x-correlation-id", "x-request-id", "x-trace-id"];

/// Response header the correlation id is echoed on.
pub const CORRELATION_RESPONSE_HEADER: &str = "x-correlation-id";

/// Correlation id stored in request extensions alongside the context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Generates a fresh correlation id.
///
/// UUID v7 ids combine a millisecond timestamp with random bits, so they sort
/// by creation time and need no coordination to stay unique.
pub fn generate_correlation_id() -> String {
    Uuid::now_v7().to_string()
}

/// First non-empty correlation header, following [`CORRELATION_HEADERS`].
pub fn correlation_id_from_headers(headers: &HeaderMap) -> Option<String> {
    CORRELATION_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    })
}

/// Mutable bookkeeping for a single request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: String,
    start_time: DateTime<Utc>,
    started: Instant,
    metadata: Map<String, Value>,
    active_operations: u32,
    error_history: VecDeque<EnhancedError>,
    max_history: usize,
}

impl RequestContext {
    pub fn new<S: Into<String>>(correlation_id: S, max_history: usize) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            start_time: Utc::now(),
            started: Instant::now(),
            metadata: Map::new(),
            active_operations: 0,
            error_history: VecDeque::with_capacity(max_history.min(16)),
            max_history,
        }
    }

    #[inline]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wall-clock creation time.
    #[inline]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Monotonic creation instant, used for durations.
    #[inline]
    pub fn started(&self) -> Instant {
        self.started
    }

    #[inline]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    #[inline]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn insert_metadata<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) {
        self.metadata.insert(key.into(), value.into());
    }

    #[inline]
    pub fn active_operations(&self) -> u32 {
        self.active_operations
    }

    #[inline]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Recorded failures, oldest first.
    #[inline]
    pub fn error_history(&self) -> &VecDeque<EnhancedError> {
        &self.error_history
    }

    /// Appends a failure, evicting the oldest entries beyond the limit.
    ///
    /// Returns `false` if this occurrence was already recorded or the limit is zero.
    pub fn record_error(&mut self, error: EnhancedError) -> bool {
        if self.max_history == 0 || self.error_history.iter().any(|e| e.id() == error.id()) {
            return false;
        }
        while self.error_history.len() >= self.max_history {
            self.error_history.pop_front();
        }
        self.error_history.push_back(error);
        true
    }

    pub(crate) fn begin_operation(&mut self) {
        self.active_operations = self.active_operations.saturating_add(1);
    }

    pub(crate) fn end_operation(&mut self) {
        self.active_operations = self.active_operations.saturating_sub(1);
    }
}

/// A [`RequestContext`] shared between the rail and the handler.
#[derive(Debug, Clone)]
pub struct SharedContext(Arc<Mutex<RequestContext>>);

impl SharedContext {
    pub fn new(context: RequestContext) -> Self {
        Self(Arc::new(Mutex::new(context)))
    }

    /// Locks the context. Keep the guard across synchronous code only.
    pub fn lock(&self) -> MutexGuard<'_, RequestContext> {
        self.0.lock()
    }

    pub fn correlation_id(&self) -> String {
        self.lock().correlation_id.clone()
    }

    pub fn active_operations(&self) -> u32 {
        self.lock().active_operations
    }

    /// Copy of the recorded failures, oldest first.
    pub fn error_history(&self) -> Vec<EnhancedError> {
        self.lock().error_history.iter().cloned().collect()
    }

    pub fn record_error(&self, error: EnhancedError) -> bool {
        self.lock().record_error(error)
    }

    pub fn insert_metadata<K: Into<String>, V: Into<Value>>(&self, key: K, value: V) {
        self.lock().insert_metadata(key, value);
    }

    /// Point-in-time copy of the whole context.
    pub fn snapshot(&self) -> RequestContext {
        self.lock().clone()
    }

    /// Returns `true` if both handles point at the same context.
    pub fn ptr_eq(&self, other: &SharedContext) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<S> FromRequestParts<S> for SharedContext
where
    S: Send + Sync,
{
    type Rejection = RouteError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<SharedContext>().cloned().ok_or_else(|| {
            RouteError::new("request context missing; is the rail context layer installed?")
                .with_name("ContextError")
        })
    }
}

/// Failure raised by a custom [`ContextFactory`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("context factory failed: {0}")]
pub struct ContextError(pub String);

/// Builds the context for a new request.
///
/// Implemented for closures of the shape
/// `Fn(&HeaderMap, usize) -> Result<RequestContext, ContextError>`.
pub trait ContextFactory: Send + Sync + 'static {
    fn create(&self, headers: &HeaderMap, max_history: usize)
        -> Result<RequestContext, ContextError>;
}

impl<F> ContextFactory for F
where
    F: Fn(&HeaderMap, usize) -> Result<RequestContext, ContextError> + Send + Sync + 'static,
{
    fn create(
        &self,
        headers: &HeaderMap,
        max_history: usize,
    ) -> Result<RequestContext, ContextError> {
        self(headers, max_history)
    }
}

/// Reuses an inbound correlation id when allowed, else generates one.
#[derive(Debug, Clone, Copy)]
pub struct DefaultContextFactory {
    pub honor_inbound_headers: bool,
}

impl Default for DefaultContextFactory {
    fn default() -> Self {
        Self { honor_inbound_headers: true }
    }
}

impl DefaultContextFactory {
    pub fn build(&self, headers: &HeaderMap, max_history: usize) -> RequestContext {
        let correlation_id = self
            .honor_inbound_headers
            .then(|| correlation_id_from_headers(headers))
            .flatten()
            .unwrap_or_else(generate_correlation_id);
        RequestContext::new(correlation_id, max_history)
    }
}

impl ContextFactory for DefaultContextFactory {
    fn create(
        &self,
        headers: &HeaderMap,
        max_history: usize,
    ) -> Result<RequestContext, ContextError> {
        Ok(self.build(headers, max_history))
    }
}

/// Returns the request's context, creating and attaching one on first access.
///
/// A failing `factory` is logged and replaced by `fallback`; request
/// processing always proceeds.
pub fn ensure_context<B>(
    request: &mut Request<B>,
    factory: &dyn ContextFactory,
    fallback: DefaultContextFactory,
    max_history: usize,
) -> SharedContext {
    if let Some(existing) = request.extensions().get::<SharedContext>() {
        return existing.clone();
    }

    let context = match factory.create(request.headers(), max_history) {
        Ok(context) => context,
        Err(error) => {
            tracing::warn!(error = %error, "custom context factory failed; using default context");
            fallback.build(request.headers(), max_history)
        },
    };

    let correlation_id = CorrelationId(context.correlation_id().to_owned());
    let shared = SharedContext::new(context);
    request.extensions_mut().insert(correlation_id);
    request.extensions_mut().insert(shared.clone());
    shared
}
