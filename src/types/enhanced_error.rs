use core::fmt;
use core::time::Duration;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::types::{ErrorCategory, RequestSnapshot, RouteError, Suggestions};

/// A [`RouteError`] augmented with request, timing and classification data.
///
/// Built by the [`Enricher`](crate::enrich::Enricher); never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedError {
    pub(crate) id: Uuid,
    pub(crate) error: RouteError,
    pub(crate) correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) method: Option<String>,
    pub(crate) category: ErrorCategory,
    pub(crate) retryable: bool,
    #[serde(serialize_with = "serialize_status")]
    pub(crate) status: StatusCode,
    pub(crate) timestamp: DateTime<Utc>,
    #[serde(rename = "durationMs", serialize_with = "serialize_millis")]
    pub(crate) duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) suggestions: Option<Suggestions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) context: Option<RequestSnapshot>,
}

impl EnhancedError {
    /// Unique id of this occurrence; used to keep history recording idempotent.
    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The original failure.
    #[inline]
    pub fn error(&self) -> &RouteError {
        &self.error
    }

    #[inline]
    pub fn into_error(self) -> RouteError {
        self.error
    }

    #[inline]
    pub fn message(&self) -> &str {
        self.error.message()
    }

    #[inline]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    #[inline]
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    #[inline]
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    #[inline]
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Status a responder should use: explicit on the error, else by category.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[inline]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Time since the caller-supplied start, if one was supplied.
    #[inline]
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    #[inline]
    pub fn suggestions(&self) -> Option<&[String]> {
        self.suggestions.as_deref()
    }

    #[inline]
    pub fn context(&self) -> Option<&RequestSnapshot> {
        self.context.as_ref()
    }

    /// Returns a copy with recovery suggestions attached.
    pub fn with_suggestions<I>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.suggestions = Some(suggestions.into_iter().collect());
        self
    }

    /// Returns a copy with the request snapshot replaced, e.g. after sanitizing.
    pub fn with_request_context(mut self, context: Option<RequestSnapshot>) -> Self {
        self.context = context;
        self
    }
}

impl fmt::Display for EnhancedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (correlation id: {})", self.category, self.error, self.correlation_id)
    }
}

fn serialize_status<S: Serializer>(status: &StatusCode, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u16(status.as_u16())
}

pub(crate) fn serialize_millis<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}
