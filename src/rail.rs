//! The caller-owned rail instance.
//!
//! A [`Rail`] holds one configuration, one classifier, one metrics store and
//! the registered error-handling stages. It is cheap to clone (all clones
//! share state) and independent instances never interfere, which keeps tests
//! isolated.
//!
//! # Examples
//!
//! ```
//! use axum::Router;
//! use handler_rail::{Rail, RailConfig, RouteError};
//!
//! async fn fails() -> Result<&'static str, RouteError> {
//!     Err(RouteError::new("User not found"))
//! }
//!
//! let rail = Rail::new(RailConfig::default());
//! let app: Router = rail
//!     .apply(Router::new())
//!     .get("/users/{id}", fails)
//!     .into_router();
//! # let _ = app;
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::handler::{Handler, Layered};
use axum::response::Response;
use axum::Router;
use http::{HeaderMap, Request};
use parking_lot::RwLock;

use crate::classify::Classifier;
use crate::config::RailConfig;
use crate::context::{
    ensure_context, ContextFactory, DefaultContextFactory, RequestContext, SharedContext,
};
use crate::enrich::{EnhanceOptions, Enricher};
use crate::metrics::{MetricsStore, PerformanceSample, RouteSummary};
use crate::recovery;
use crate::respond::default_response;
#[cfg(feature = "sanitize")]
use crate::sanitize;
use crate::router::PatchedRouter;
use crate::tower::{ContextLayer, RailLayer, RailService};
use crate::traits::{ErrorHandler, WrappedErrorHandler};
use crate::types::{EnhancedError, RequestSnapshot, RouteError};

static NEXT_RAIL_ID: AtomicU64 = AtomicU64::new(1);

struct Shared {
    id: u64,
    config: RailConfig,
    enricher: Enricher,
    metrics: MetricsStore,
    stages: RwLock<Vec<Arc<dyn ErrorHandler>>>,
}

/// Error rail for axum/tower handlers.
#[derive(Clone)]
pub struct Rail {
    shared: Arc<Shared>,
}

impl Rail {
    pub fn new(config: RailConfig) -> Self {
        let classifier = Classifier::new().inspect_stack(config.classify_stack);
        Self::with_classifier(config, classifier)
    }

    /// Uses a custom classifier, e.g. one built from extended rules.
    pub fn with_classifier(config: RailConfig, classifier: Classifier) -> Self {
        let metrics = MetricsStore::new(config.performance_threshold());
        Self {
            shared: Arc::new(Shared {
                id: NEXT_RAIL_ID.fetch_add(1, Ordering::Relaxed),
                enricher: Enricher::new(classifier),
                metrics,
                stages: RwLock::new(Vec::new()),
                config,
            }),
        }
    }

    #[inline]
    pub fn config(&self) -> &RailConfig {
        &self.shared.config
    }

    #[inline]
    pub fn classifier(&self) -> &Classifier {
        self.shared.enricher.classifier()
    }

    #[inline]
    pub fn metrics_store(&self) -> &MetricsStore {
        &self.shared.metrics
    }

    /// `true` when configured development-only and running in production.
    #[inline]
    pub fn is_inert(&self) -> bool {
        self.shared.config.is_inert()
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.shared.id
    }

    /// Layer wrapping services with the failure pipeline.
    pub fn layer(&self) -> RailLayer {
        RailLayer::new(self.clone())
    }

    /// Layer attaching the request context and correlation header.
    pub fn context_layer(&self) -> ContextLayer {
        ContextLayer::new(self.clone())
    }

    /// Wraps a single tower service.
    pub fn wrap<S>(&self, service: S) -> RailService<S> {
        RailService::new(service, self.clone())
    }

    /// Wraps a single axum handler.
    pub fn wrap_handler<H, T, S>(&self, handler: H) -> Layered<RailLayer, H, T, S>
    where
        H: Handler<T, S>,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        handler.layer(self.layer())
    }

    /// Wraps an error-handling stage so it records incoming errors and
    /// forwards its own failures.
    pub fn wrap_error_handler<H: ErrorHandler>(&self, handler: H) -> WrappedErrorHandler<H> {
        WrappedErrorHandler::new(handler)
    }

    /// Appends a stage to the failure pipeline, ahead of the custom error
    /// handler and the default responder.
    pub fn add_error_handler<H: ErrorHandler>(&self, handler: H) {
        self.shared.stages.write().push(Arc::new(handler));
    }

    /// Starts registration on `router`; patched right away when `auto_patch` is on.
    pub fn apply<S>(&self, router: Router<S>) -> PatchedRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        PatchedRouter::new(router, self.clone(), self.shared.config.auto_patch)
    }

    /// Builds a context without attaching it anywhere.
    pub fn create_context(&self, headers: &HeaderMap) -> RequestContext {
        let max_history = self.shared.config.max_error_history;
        let fallback = self.fallback_factory();
        match &self.shared.config.context_factory {
            Some(factory) => factory.create(headers, max_history).unwrap_or_else(|error| {
                tracing::warn!(error = %error, "custom context factory failed; using default context");
                fallback.build(headers, max_history)
            }),
            None => fallback.build(headers, max_history),
        }
    }

    /// Returns the request's context, attaching a new one on first access.
    pub fn ensure_context<B>(&self, request: &mut Request<B>) -> SharedContext {
        let fallback = self.fallback_factory();
        let factory: &dyn ContextFactory = match &self.shared.config.context_factory {
            Some(factory) => factory.as_ref(),
            None => &fallback,
        };
        ensure_context(request, factory, fallback, self.shared.config.max_error_history)
    }

    /// Enhances an error by hand, with suggestions and redaction as configured.
    pub fn enhance(
        &self,
        error: RouteError,
        request: Option<&RequestSnapshot>,
        options: EnhanceOptions,
    ) -> EnhancedError {
        let mut enhanced = self.shared.enricher.enhance(error, request, options);
        if self.shared.config.recovery {
            let suggestions = recovery::suggest(&enhanced);
            enhanced = enhanced.with_suggestions(suggestions);
        }
        #[cfg(feature = "sanitize")]
        if self.shared.config.sanitize {
            enhanced = sanitize::sanitize_error(enhanced);
        }
        enhanced
    }

    pub fn metrics(&self, route: Option<&str>) -> Vec<PerformanceSample> {
        self.shared.metrics.get(route)
    }

    pub fn metrics_summary(&self) -> Vec<RouteSummary> {
        self.shared.metrics.summary()
    }

    pub fn clear_metrics(&self) {
        self.shared.metrics.clear();
    }

    /// Drops all samples and registered error-handling stages.
    pub fn reset(&self) {
        self.shared.metrics.clear();
        self.shared.stages.write().clear();
    }

    /// Runs the failure pipeline for a failed handler call.
    pub(crate) fn handle_failure(
        &self,
        error: RouteError,
        sent: Option<Response>,
        snapshot: &RequestSnapshot,
        context: &SharedContext,
        started: Instant,
    ) -> Response {
        let options = EnhanceOptions::from_context(&context.lock()).started(started);
        let enhanced = self.enhance(error, Some(snapshot), options);
        context.record_error(enhanced.clone());
        self.log(&enhanced);

        if let Some(response) = sent {
            tracing::warn!(
                correlation_id = %enhanced.correlation_id(),
                "handler failed after its response was produced; keeping that response"
            );
            return response;
        }

        self.dispatch(enhanced, snapshot, context)
    }

    fn dispatch(
        &self,
        enhanced: EnhancedError,
        snapshot: &RequestSnapshot,
        context: &SharedContext,
    ) -> Response {
        let stages = self.shared.stages.read().clone();
        let mut current = enhanced;

        for stage in &stages {
            match shielded(|| stage.handle(&current, context)) {
                Ok(Some(response)) => return response,
                Ok(None) => {},
                Err(secondary) if stage.forwards_failures() => {
                    let options = EnhanceOptions::from_context(&context.lock());
                    let next = self.enhance(secondary, Some(snapshot), options);
                    context.record_error(next.clone());
                    self.log(&next);
                    current = next;
                },
                Err(secondary) => {
                    tracing::error!(
                        correlation_id = %current.correlation_id(),
                        error = %secondary,
                        "error handler failed; continuing with the original error"
                    );
                },
            }
        }

        if let Some(handler) = &self.shared.config.error_handler {
            match shielded(|| handler(&current)) {
                Ok(response) => return response,
                Err(secondary) => {
                    tracing::error!(
                        correlation_id = %current.correlation_id(),
                        error = %secondary,
                        "custom error handler failed; using the default responder"
                    );
                },
            }
        }

        default_response(&current, self.shared.config.environment)
    }

    fn log(&self, error: &EnhancedError) {
        if !self.shared.config.error_logging {
            return;
        }
        if let Some(logger) = &self.shared.config.logger {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| logger(error))) {
                tracing::error!(
                    correlation_id = %error.correlation_id(),
                    panic = %RouteError::from_panic(panic),
                    "custom logger panicked"
                );
            }
            return;
        }

        let route = error.route().unwrap_or("-");
        let method = error.method().unwrap_or("-");
        if error.status().is_server_error() {
            tracing::error!(
                correlation_id = %error.correlation_id(),
                category = %error.category(),
                route,
                method,
                status = error.status().as_u16(),
                retryable = error.is_retryable(),
                "handler failed: {}",
                error.message()
            );
        } else {
            tracing::warn!(
                correlation_id = %error.correlation_id(),
                category = %error.category(),
                route,
                method,
                status = error.status().as_u16(),
                "handler rejected request: {}",
                error.message()
            );
        }
    }

    fn fallback_factory(&self) -> DefaultContextFactory {
        DefaultContextFactory { honor_inbound_headers: self.shared.config.correlation_id }
    }
}

/// Runs user-supplied pipeline code, turning a panic into an error.
fn shielded<T>(f: impl FnOnce() -> Result<T, RouteError>) -> Result<T, RouteError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| Err(RouteError::from_panic(panic)))
}

impl core::fmt::Debug for Rail {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Rail")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .field("stages", &self.shared.stages.read().len())
            .finish()
    }
}
