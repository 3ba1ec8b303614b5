//! # handler-rail
//!
//! Failure interception for async axum/tower handlers.
//!
//! A [`Rail`] wraps handlers so that every failure, whether a returned
//! [`RouteError`], a service error or a panic, goes through one pipeline:
//!
//! 1. the request gets a correlation id (reused from `x-correlation-id`,
//!    `x-request-id` or `x-trace-id` when present) and a [`SharedContext`]
//! 2. the failure is classified into an [`ErrorCategory`] and judged retryable
//! 3. it is enriched with route, method, timing and a request snapshot into
//!    an [`EnhancedError`], recorded in the request's bounded error history
//!    and logged through `tracing`
//! 4. registered error handlers, the configured custom handler or the
//!    default JSON responder produce the response
//!
//! Optional per-route timing samples are kept in a [`MetricsStore`], and
//! recovery suggestions can be attached to every error.
//!
//! # Examples
//!
//! ```
//! use axum::{body::Body, Router};
//! use handler_rail::{Rail, RailConfig, RouteError};
//! use http::{Request, StatusCode};
//! use tower::ServiceExt;
//!
//! async fn show_user() -> Result<String, RouteError> {
//!     Err(RouteError::new("Invalid email").with_status(StatusCode::BAD_REQUEST))
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let rail = Rail::new(RailConfig::default().with_error_logging(false));
//! let app: Router = rail.apply(Router::new()).get("/users/{id}", show_user).into_router();
//!
//! let response = app
//!     .oneshot(Request::get("/users/7").body(Body::empty()).unwrap())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(response.status(), StatusCode::BAD_REQUEST);
//! assert!(response.headers().contains_key("x-correlation-id"));
//! # }
//! ```

/// Async retry and timeout helpers
pub mod async_ext;
/// Heuristic error categorization and retryability
pub mod classify;
/// Rail configuration
pub mod config;
/// Per-request correlation context
pub mod context;
/// Error enrichment
pub mod enrich;
/// Per-route performance samples
pub mod metrics;
/// Convenience re-exports
pub mod prelude;
/// Recovery suggestions
pub mod recovery;
/// Default JSON error responder
pub mod respond;
/// Registration patching for axum routers
pub mod router;
/// Tower layers and services
pub mod tower;
/// Handler-facing traits
pub mod traits;
/// Error and snapshot types
pub mod types;

mod rail;

/// Redaction of sensitive data (requires `sanitize` feature)
#[cfg(feature = "sanitize")]
pub mod sanitize;

pub use classify::{CategoryRule, ClassificationRules, Classifier};
pub use config::{Environment, PatchOptions, RailConfig, Registration};
pub use context::{CorrelationId, RequestContext, SharedContext};
pub use enrich::EnhanceOptions;
pub use metrics::{MetricsStore, PerformanceSample, RouteSummary};
pub use rail::Rail;
pub use router::{Patch, PatchedRouter};
pub use traits::{ErrorHandler, TransientError, WrappedErrorHandler};
pub use types::{
    EnhancedError, ErrorCategory, RequestSnapshot, RouteError, RouteResult, Suggestions,
};
