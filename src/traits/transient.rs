//! Transient error classification for retry strategies.
//!
//! [`TransientError`] is the single question the retry helpers in
//! [`async_ext`](crate::async_ext) ask: "could trying again help?". The rail's
//! own error types answer it with the heuristic classifier, so anything a
//! handler can fail with is retryable-aware out of the box.
//!
//! # Examples
//!
//! ```
//! use handler_rail::traits::TransientError;
//! use handler_rail::RouteError;
//!
//! let err = RouteError::new("connect ECONNREFUSED 10.0.0.1:5432");
//! assert!(err.is_transient());
//!
//! let err = RouteError::new("email is required");
//! assert!(err.is_permanent());
//! ```

use core::time::Duration;

use crate::classify::default_classifier;
use crate::types::{EnhancedError, RouteError};

/// Classification of errors as transient or permanent.
///
/// Transient errors are temporary failures that may succeed if retried,
/// such as network timeouts, rate limiting, or temporary service unavailability.
pub trait TransientError {
    /// Returns `true` if this error is transient and may succeed on retry.
    ///
    /// # Guidelines
    ///
    /// Return `true` for:
    /// - Network timeouts
    /// - Rate limiting (HTTP 429)
    /// - Service temporarily unavailable (HTTP 503)
    /// - Connection reset/refused (may indicate temporary overload)
    /// - Deadlock/lock contention errors
    ///
    /// Return `false` for:
    /// - Authentication/authorization failures
    /// - Invalid input/validation errors
    /// - Resource not found
    /// - Business logic violations
    fn is_transient(&self) -> bool;

    /// Returns `true` if this error is permanent and should not be retried.
    ///
    /// Default implementation returns `!self.is_transient()`.
    #[inline]
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Optional hint for how long to wait before retrying.
    ///
    /// Returns `None` by default, indicating no specific wait time is suggested.
    #[inline]
    fn retry_after_hint(&self) -> Option<Duration> {
        None
    }

    /// Returns the maximum number of retry attempts for this error.
    ///
    /// Returns `None` by default; retry policies then use their own limits.
    #[inline]
    fn max_retries_hint(&self) -> Option<u32> {
        None
    }
}

/// Classified with the default rule table.
impl TransientError for RouteError {
    fn is_transient(&self) -> bool {
        default_classifier().is_retryable(self)
    }
}

/// Uses the retryability decided when the error was enhanced.
impl TransientError for EnhancedError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

impl TransientError for std::io::Error {
    fn is_transient(&self) -> bool {
        use std::io::ErrorKind;
        matches!(
            self.kind(),
            ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::TimedOut
                | ErrorKind::Interrupted
                | ErrorKind::WouldBlock
        )
    }
}

/// Extension methods for working with transient errors.
pub trait TransientErrorExt<T, E: TransientError> {
    /// Converts a transient error to `Some(Err(e))` for retry, or `None` to stop.
    ///
    /// # Examples
    ///
    /// ```
    /// use handler_rail::traits::TransientErrorExt;
    /// use handler_rail::RouteError;
    ///
    /// let transient: Result<(), RouteError> = Err(RouteError::new("socket hang up"));
    /// assert!(transient.retry_if_transient().is_some());
    ///
    /// let permanent: Result<(), RouteError> = Err(RouteError::new("forbidden"));
    /// assert!(permanent.retry_if_transient().is_none());
    /// ```
    fn retry_if_transient(self) -> Option<Result<T, E>>;
}

impl<T, E: TransientError> TransientErrorExt<T, E> for Result<T, E> {
    fn retry_if_transient(self) -> Option<Result<T, E>> {
        match &self {
            Ok(_) => None,
            Err(e) if e.is_transient() => Some(self),
            Err(_) => None,
        }
    }
}
