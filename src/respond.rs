//! Default JSON responder.
//!
//! ```json
//! {
//!   "error": {
//!     "message": "User not found",
//!     "correlationId": "0192...",
//!     "timestamp": "2024-05-01T12:00:00Z",
//!     "category": "unknown",
//!     "retryable": false,
//!     "details": { "route": "/users/{id}", "method": "GET", "duration": 3,
//!                  "suggestions": null, "retryable": false },
//!     "stack": "Error: User not found"
//!   }
//! }
//! ```
//!
//! `details` and `stack` are omitted in [`Environment::Production`].

use core::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Environment;
use crate::types::enhanced_error::serialize_millis;
use crate::types::{EnhancedError, ErrorCategory};

/// Borrowed view of an [`EnhancedError`] in wire shape.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub error: ErrorBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody<'a> {
    pub message: &'a str,
    pub correlation_id: &'a str,
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails<'a> {
    pub route: Option<&'a str>,
    pub method: Option<&'a str>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Option<Duration>,
    pub suggestions: Option<&'a [String]>,
    pub retryable: bool,
}

impl<'a> ErrorEnvelope<'a> {
    pub fn new(error: &'a EnhancedError, environment: Environment) -> Self {
        let verbose = !environment.is_production();
        Self {
            error: ErrorBody {
                message: error.message(),
                correlation_id: error.correlation_id(),
                timestamp: error.timestamp(),
                category: error.category(),
                retryable: error.is_retryable(),
                details: verbose.then(|| ErrorDetails {
                    route: error.route(),
                    method: error.method(),
                    duration: error.duration(),
                    suggestions: error.suggestions(),
                    retryable: error.is_retryable(),
                }),
                stack: verbose.then(|| error.error().stack_or_summary()),
            },
        }
    }
}

/// Renders `error` with its status and the JSON envelope.
pub fn default_response(error: &EnhancedError, environment: Environment) -> Response {
    (error.status(), Json(ErrorEnvelope::new(error, environment))).into_response()
}
