//! Error-handling stages.
//!
//! Where dynamic frameworks tell error middleware apart by its parameter
//! count, the rail uses an explicit registration: anything implementing
//! [`ErrorHandler`] is a stage in the failure pipeline. Each stage either
//! answers with a response, passes the error on (`Ok(None)`), or fails.
//!
//! # Examples
//!
//! ```
//! use axum::response::IntoResponse;
//! use handler_rail::{EnhancedError, ErrorCategory, RouteError};
//! use http::StatusCode;
//!
//! fn teapot(error: &EnhancedError) -> Result<Option<axum::response::Response>, RouteError> {
//!     if error.category() == ErrorCategory::BusinessLogic {
//!         return Ok(Some(StatusCode::IM_A_TEAPOT.into_response()));
//!     }
//!     Ok(None)
//! }
//! # let _ = teapot;
//! ```

use axum::response::Response;

use crate::context::SharedContext;
use crate::types::{EnhancedError, RouteError};

/// One stage of the failure pipeline.
pub trait ErrorHandler: Send + Sync + 'static {
    /// Handles `error` for the request owning `context`.
    ///
    /// - `Ok(Some(response))` ends the pipeline with `response`
    /// - `Ok(None)` passes `error` to the next stage
    /// - `Err(secondary)` reports a failure of the handler itself
    fn handle(
        &self,
        error: &EnhancedError,
        context: &SharedContext,
    ) -> Result<Option<Response>, RouteError>;

    /// Whether a secondary failure replaces the error seen by later stages.
    ///
    /// Plain handlers return `false`: their failures are logged and the
    /// original error continues down the pipeline.
    fn forwards_failures(&self) -> bool {
        false
    }
}

impl<F> ErrorHandler for F
where
    F: Fn(&EnhancedError) -> Result<Option<Response>, RouteError> + Send + Sync + 'static,
{
    fn handle(
        &self,
        error: &EnhancedError,
        _context: &SharedContext,
    ) -> Result<Option<Response>, RouteError> {
        self(error)
    }
}

/// An [`ErrorHandler`] that records every incoming error in the request's
/// history and forwards its own failures to the next stage.
///
/// Created by [`Rail::wrap_error_handler`](crate::Rail::wrap_error_handler).
#[derive(Debug, Clone)]
pub struct WrappedErrorHandler<H> {
    inner: H,
}

impl<H> WrappedErrorHandler<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: ErrorHandler> ErrorHandler for WrappedErrorHandler<H> {
    fn handle(
        &self,
        error: &EnhancedError,
        context: &SharedContext,
    ) -> Result<Option<Response>, RouteError> {
        context.record_error(error.clone());
        self.inner.handle(error, context)
    }

    fn forwards_failures(&self) -> bool {
        true
    }
}
