//! Registration patching for axum routers.
//!
//! [`PatchedRouter`] mirrors the registration methods of [`Router`]. While it
//! is patched, every handler registered through it is wrapped with the rail
//! before it reaches the router, so handlers need no changes of their own.
//!
//! Patching is idempotent: patching twice changes nothing, and handlers that
//! were already wrapped by hand are still handled once per request.
//!
//! ```
//! use axum::Router;
//! use handler_rail::router::Patch;
//! use handler_rail::{Rail, RailConfig, RouteError};
//!
//! async fn create() -> Result<&'static str, RouteError> {
//!     Err(RouteError::new("duplicate key value violates unique constraint"))
//! }
//!
//! let rail = Rail::new(RailConfig::default().with_auto_patch(false));
//! let router = Router::new().patch_with(&rail).patch_with(&rail);
//! assert!(router.is_patched());
//!
//! let app: Router = router.post("/users", create).into_router();
//! # let _ = app;
//! ```
//!
//! axum applies [`Router::layer`] to routes registered *before* the call, so
//! [`PatchedRouter::middleware`] guards the routes added so far.

use core::fmt;
use core::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::handler::Handler;
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::routing::{any, on, MethodFilter, MethodRouter};
use axum::Router;

use crate::config::Registration;
use crate::rail::Rail;
use crate::traits::ErrorHandler;
use crate::types::RouteError;

type HandlerWrapper<S> = Arc<dyn Fn(MethodRouter<S>) -> MethodRouter<S> + Send + Sync>;

/// A [`Router`] under construction whose registrations can be wrapped.
#[must_use = "call `into_router` to obtain the axum router"]
pub struct PatchedRouter<S = ()> {
    router: Router<S>,
    rail: Rail,
    patched: bool,
    wrapper: Option<HandlerWrapper<S>>,
}

impl<S> fmt::Debug for PatchedRouter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchedRouter")
            .field("router", &self.router)
            .field("rail", &self.rail)
            .field("patched", &self.patched)
            .field("wrapper", &self.wrapper.is_some())
            .finish()
    }
}

impl<S> PatchedRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(router: Router<S>, rail: Rail, patched: bool) -> Self {
        Self { router, rail, patched, wrapper: None }
    }

    #[inline]
    pub fn rail(&self) -> &Rail {
        &self.rail
    }

    #[inline]
    pub fn is_patched(&self) -> bool {
        self.patched
    }

    /// Stops wrapping later registrations. Routes registered so far keep
    /// their wrapping.
    pub fn unpatch(mut self) -> Self {
        self.patched = false;
        self
    }

    /// Applies `wrapper` to every handler wrapped from now on, inside the
    /// rail, so failures it raises are handled like handler failures.
    ///
    /// ```
    /// use axum::extract::Request;
    /// use axum::middleware::{from_fn, Next};
    /// use axum::response::Response;
    /// use axum::Router;
    /// use handler_rail::{Rail, RailConfig};
    ///
    /// async fn audit(request: Request, next: Next) -> Response {
    ///     next.run(request).await
    /// }
    ///
    /// let rail = Rail::new(RailConfig::default());
    /// let app: Router = rail
    ///     .apply(Router::new())
    ///     .with_handler_wrapper(|route| route.layer(from_fn(audit)))
    ///     .get("/", || async { "ok" })
    ///     .into_router();
    /// # let _ = app;
    /// ```
    pub fn with_handler_wrapper<F>(mut self, wrapper: F) -> Self
    where
        F: Fn(MethodRouter<S>) -> MethodRouter<S> + Send + Sync + 'static,
    {
        self.wrapper = Some(Arc::new(wrapper));
        self
    }

    fn wraps(&self, registration: Registration) -> bool {
        self.patched
            && !self.rail.is_inert()
            && self.rail.config().patch_options.wraps(registration)
    }

    fn register(
        mut self,
        path: &str,
        registration: Registration,
        method_router: MethodRouter<S>,
    ) -> Self {
        let method_router = if self.wraps(registration) {
            let method_router = match &self.wrapper {
                Some(wrapper) => wrapper(method_router),
                None => method_router,
            };
            method_router.layer(self.rail.layer())
        } else {
            method_router
        };
        self.router = self.router.route(path, method_router);
        self
    }

    /// Registers a prepared [`MethodRouter`], wrapped whole while patched.
    ///
    /// The router is checked against [`Registration::All`] rather than the
    /// verbs it serves: with `patch_options.methods = [Get]`,
    /// `.route("/x", get(h))` stays unwrapped while `.get("/x", h)` is
    /// wrapped. Use the verb methods when filtering by verb.
    pub fn route(self, path: &str, method_router: MethodRouter<S>) -> Self {
        self.register(path, Registration::All, method_router)
    }

    pub fn get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.register(path, Registration::Get, on(MethodFilter::GET, handler))
    }

    pub fn post<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.register(path, Registration::Post, on(MethodFilter::POST, handler))
    }

    pub fn put<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.register(path, Registration::Put, on(MethodFilter::PUT, handler))
    }

    pub fn patch<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.register(path, Registration::Patch, on(MethodFilter::PATCH, handler))
    }

    pub fn delete<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.register(path, Registration::Delete, on(MethodFilter::DELETE, handler))
    }

    pub fn head<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.register(path, Registration::Head, on(MethodFilter::HEAD, handler))
    }

    pub fn options<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.register(path, Registration::Options, on(MethodFilter::OPTIONS, handler))
    }

    /// Registers `handler` for every method.
    pub fn any<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        self.register(path, Registration::All, any(handler))
    }

    /// Adds request middleware around the routes registered so far.
    ///
    /// While patched, the middleware runs inside the rail, so its failures
    /// are handled like handler failures.
    pub fn middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, RouteError>> + Send + 'static,
    {
        self.router = self.router.layer(from_fn(f));
        if self.wraps(Registration::Use) {
            self.router = self.router.layer(self.rail.layer());
        }
        self
    }

    /// Registers an error-handling stage.
    ///
    /// While patched and `patch_options.error_handlers` is set, the stage is
    /// wrapped with [`Rail::wrap_error_handler`].
    pub fn error_handler<H: ErrorHandler>(self, handler: H) -> Self {
        if self.patched && self.rail.config().patch_options.error_handlers {
            self.rail.add_error_handler(self.rail.wrap_error_handler(handler));
        } else {
            self.rail.add_error_handler(handler);
        }
        self
    }

    /// Applies `f` to the underlying router, for calls without a patched
    /// counterpart such as `nest` or `fallback`.
    pub fn map_router<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Router<S>) -> Router<S>,
    {
        self.router = f(self.router);
        self
    }

    /// Finishes registration, adding the context layer around every route.
    pub fn into_router(self) -> Router<S> {
        if self.rail.is_inert() {
            return self.router;
        }
        self.router.layer(self.rail.context_layer())
    }
}

impl<S> From<PatchedRouter<S>> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn from(router: PatchedRouter<S>) -> Self {
        router.into_router()
    }
}

/// Turns a router into a patched one.
pub trait Patch<S> {
    /// Patches with `rail`. A router that is already patched keeps its rail.
    fn patch_with(self, rail: &Rail) -> PatchedRouter<S>;
}

impl<S> Patch<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn patch_with(self, rail: &Rail) -> PatchedRouter<S> {
        PatchedRouter::new(self, rail.clone(), true)
    }
}

impl<S> Patch<S> for PatchedRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn patch_with(mut self, _rail: &Rail) -> PatchedRouter<S> {
        if !self.patched {
            tracing::debug!("re-patching router");
            self.patched = true;
        }
        self
    }
}
