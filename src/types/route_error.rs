//! The failure value handlers return or that panics are converted into.
//!
//! [`RouteError`] is deliberately close to an "error object" from dynamic web
//! frameworks: a message, a name, an optional machine code (`ETIMEDOUT`,
//! `ER_LOCK_DEADLOCK`, ...) and an optional explicit HTTP status. Any
//! `std::error::Error + Send + Sync + 'static` converts into it, so handlers
//! can use `?` freely:
//!
//! ```
//! use handler_rail::RouteError;
//!
//! fn load() -> Result<String, RouteError> {
//!     let raw = std::fs::read_to_string("/definitely/missing")?;
//!     Ok(raw)
//! }
//!
//! let err = load().unwrap_err();
//! assert_eq!(err.code(), Some("ENOENT"));
//! ```

use core::any::Any;
use core::fmt;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};

use crate::types::ErrorCategory;

/// A handler failure with enough shape for classification and rendering.
#[derive(Clone, Serialize)]
pub struct RouteError {
    message: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(serialize_with = "serialize_status", skip_serializing_if = "Option::is_none")]
    status: Option<StatusCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
    #[serde(skip)]
    source: Option<Arc<dyn StdError + Send + Sync>>,
    #[serde(skip)]
    sent: Option<SentResponse>,
}

impl RouteError {
    /// Creates a failure with the given message and the generic name `Error`.
    ///
    /// A backtrace is captured when `RUST_BACKTRACE` enables it.
    pub fn new<M: Into<String>>(message: M) -> Self {
        Self {
            message: message.into(),
            name: "Error".to_owned(),
            code: None,
            status: None,
            category: None,
            stack: capture_stack(),
            source: None,
            sent: None,
        }
    }

    /// Converts a panic payload caught from a handler.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "handler panicked".to_owned()
        };

        Self::new(message).with_name("Panic")
    }

    /// Marks a failure that surfaced after `response` was already produced.
    ///
    /// The wrapper records and logs such failures but returns `response`
    /// untouched instead of writing a second one.
    pub fn after_response(self, response: Response) -> Self {
        Self { sent: Some(SentResponse::new(response)), ..self }
    }

    /// Replaces the message, keeping every other field.
    pub fn with_message<M: Into<String>>(mut self, message: M) -> Self {
        self.message = message.into();
        self
    }

    /// Overrides the error name (the type-like label, e.g. `ValidationError`).
    pub fn with_name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Sets a machine-readable code such as `ETIMEDOUT`.
    pub fn with_code<C: Into<String>>(mut self, code: C) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the HTTP status that should be returned to the client.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Pins the category, bypassing heuristic classification.
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Replaces the captured stack text.
    pub fn with_stack<S: Into<String>>(mut self, stack: S) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attaches an underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    #[inline]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Caller-supplied category, if any.
    #[inline]
    pub fn category(&self) -> Option<ErrorCategory> {
        self.category
    }

    #[inline]
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Returns the underlying cause, if one was attached or converted from.
    pub fn source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Returns `true` if the failure arrived after a response was produced.
    #[inline]
    pub fn is_response_sent(&self) -> bool {
        self.sent.is_some()
    }

    /// Stack text for diagnostics, falling back to `name: message`.
    pub fn stack_or_summary(&self) -> String {
        match &self.stack {
            Some(stack) => stack.clone(),
            None => format!("{}: {}", self.name, self.message),
        }
    }

    pub(crate) fn take_sent_response(&mut self) -> Option<Response> {
        self.sent.take().and_then(|sent| sent.take())
    }
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteError")
            .field("message", &self.message)
            .field("name", &self.name)
            .field("code", &self.code)
            .field("status", &self.status)
            .field("category", &self.category)
            .field("source", &self.source)
            .field("response_sent", &self.sent.is_some())
            .finish()
    }
}

impl<E> From<E> for RouteError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        let code = os_code(&error);
        let mut converted = RouteError::new(error.to_string()).with_name(short_type_name::<E>());
        converted.code = code.map(str::to_owned);
        converted.source = Some(Arc::new(error));
        converted
    }
}

/// Failure carried in response extensions so an enclosing
/// [`RailService`](crate::tower::RailService) can pick it up.
#[derive(Clone, Debug)]
pub(crate) struct Failure {
    pub(crate) error: RouteError,
    pub(crate) committed: bool,
}

impl Failure {
    pub(crate) fn take(response: &mut Response) -> Option<Failure> {
        response.extensions_mut().remove::<Failure>()
    }
}

impl IntoResponse for RouteError {
    /// Renders a bare `{"error": {"message": ..}}` body and stashes the failure
    /// in the response extensions.
    ///
    /// Without a rail in front of the handler this minimal body is what the
    /// client sees; with one, the rail replaces it with the full envelope.
    fn into_response(mut self) -> Response {
        if let Some(mut response) = self.take_sent_response() {
            response.extensions_mut().insert(Failure { error: self, committed: true });
            return response;
        }

        let status = self
            .status
            .or_else(|| self.category.map(ErrorCategory::default_status))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::json!({ "error": { "message": self.message } });
        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(Failure { error: self, committed: false });
        response
    }
}

/// A response produced before the failure, shared so [`RouteError`] stays `Clone`.
#[derive(Clone)]
struct SentResponse(Arc<Mutex<Option<Response>>>);

impl SentResponse {
    fn new(response: Response) -> Self {
        Self(Arc::new(Mutex::new(Some(response))))
    }

    fn take(self) -> Option<Response> {
        self.0.lock().take()
    }
}

fn serialize_status<S: Serializer>(
    status: &Option<StatusCode>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match status {
        Some(status) => serializer.serialize_some(&status.as_u16()),
        None => serializer.serialize_none(),
    }
}

fn capture_stack() -> Option<String> {
    let backtrace = Backtrace::capture();
    match backtrace.status() {
        BacktraceStatus::Captured => Some(backtrace.to_string()),
        _ => None,
    }
}

/// Last path segment of a type name, without generic parameters.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = core::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}

/// Finds an I/O error in the source chain and maps its kind to an errno-style code.
fn os_code(error: &(dyn StdError + 'static)) -> Option<&'static str> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            return io_kind_code(io_error.kind());
        }
        current = err.source();
    }
    None
}

fn io_kind_code(kind: io::ErrorKind) -> Option<&'static str> {
    use io::ErrorKind;

    let code = match kind {
        ErrorKind::NotFound => "ENOENT",
        ErrorKind::PermissionDenied => "EACCES",
        ErrorKind::ConnectionRefused => "ECONNREFUSED",
        ErrorKind::ConnectionReset => "ECONNRESET",
        ErrorKind::ConnectionAborted => "ECONNABORTED",
        ErrorKind::NotConnected => "ENOTCONN",
        ErrorKind::AddrInUse => "EADDRINUSE",
        ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        ErrorKind::BrokenPipe => "EPIPE",
        ErrorKind::AlreadyExists => "EEXIST",
        ErrorKind::WouldBlock => "EAGAIN",
        ErrorKind::TimedOut => "ETIMEDOUT",
        ErrorKind::Interrupted => "EINTR",
        ErrorKind::OutOfMemory => "ENOMEM",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_io_errors_with_os_codes() {
        let err: RouteError = io::Error::new(io::ErrorKind::TimedOut, "socket timed out").into();
        assert_eq!(err.code(), Some("ETIMEDOUT"));
        assert_eq!(err.name(), "Error");
        assert_eq!(err.message(), "socket timed out");
        assert!(err.source().is_some());
    }

    #[test]
    fn converts_plain_errors_without_code() {
        let err: RouteError = "abc".parse::<u32>().unwrap_err().into();
        assert_eq!(err.code(), None);
        assert_eq!(err.name(), "ParseIntError");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let err = RouteError::from_panic(Box::new("boom"));
        assert_eq!(err.message(), "boom");
        assert_eq!(err.name(), "Panic");

        let err = RouteError::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(err.message(), "owned boom");

        let err = RouteError::from_panic(Box::new(42_u8));
        assert_eq!(err.message(), "handler panicked");
    }

    #[test]
    fn into_response_carries_failure() {
        let mut response =
            RouteError::new("Invalid email").with_status(StatusCode::BAD_REQUEST).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let failure = Failure::take(&mut response).expect("failure extension");
        assert!(!failure.committed);
        assert_eq!(failure.error.message(), "Invalid email");
    }

    #[test]
    fn after_response_keeps_original_response() {
        let sent = (StatusCode::ACCEPTED, "partial").into_response();
        let err = RouteError::new("late failure").after_response(sent);
        assert!(err.is_response_sent());

        let mut response = err.into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let failure = Failure::take(&mut response).expect("failure extension");
        assert!(failure.committed);
        assert!(!failure.error.is_response_sent());
    }

    #[test]
    fn short_type_name_strips_paths_and_generics() {
        assert_eq!(short_type_name::<io::Error>(), "Error");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }
}
