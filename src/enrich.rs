//! Turns a raw [`RouteError`] into an [`EnhancedError`].
//!
//! # Examples
//!
//! ```
//! use handler_rail::enrich::{EnhanceOptions, Enricher};
//! use handler_rail::{ErrorCategory, RouteError};
//!
//! let enricher = Enricher::default();
//! let enhanced = enricher.enhance(
//!     RouteError::new("request timeout").with_code("ETIMEDOUT"),
//!     None,
//!     EnhanceOptions::new().correlation_id("req-1"),
//! );
//!
//! assert_eq!(enhanced.correlation_id(), "req-1");
//! assert_eq!(enhanced.category(), ErrorCategory::Network);
//! assert!(enhanced.is_retryable());
//! assert!(enhanced.duration().is_none());
//! ```

use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::classify::Classifier;
use crate::context::{generate_correlation_id, RequestContext};
use crate::types::{EnhancedError, RequestSnapshot, RouteError};

/// Extra inputs for [`Enricher::enhance`].
#[derive(Debug, Clone, Default)]
pub struct EnhanceOptions {
    correlation_id: Option<String>,
    started: Option<Instant>,
    metadata: Map<String, Value>,
}

impl EnhanceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Correlation id and metadata taken from a request context.
    pub fn from_context(context: &RequestContext) -> Self {
        Self {
            correlation_id: Some(context.correlation_id().to_owned()),
            started: None,
            metadata: context.metadata().clone(),
        }
    }

    pub fn correlation_id<S: Into<String>>(mut self, correlation_id: S) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Start of the failed operation; enables the duration field.
    pub fn started(mut self, started: Instant) -> Self {
        self.started = Some(started);
        self
    }

    pub fn metadata<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Classifies and annotates failures.
#[derive(Debug, Clone, Default)]
pub struct Enricher {
    classifier: Classifier,
}

impl Enricher {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Builds the enhanced error.
    ///
    /// A pinned category on `error` wins over the heuristic. The status is
    /// the error's explicit status, else the category default. Route and
    /// method come from `request` when present.
    pub fn enhance(
        &self,
        error: RouteError,
        request: Option<&RequestSnapshot>,
        options: EnhanceOptions,
    ) -> EnhancedError {
        let category = self.classifier.classify(&error);
        let retryable = self.classifier.is_retryable_as(&error, category);
        let status = error.status().unwrap_or_else(|| category.default_status());

        let EnhanceOptions { correlation_id, started, metadata } = options;
        let context = request.map(|snapshot| {
            let mut snapshot = snapshot.clone();
            snapshot.metadata.extend(metadata);
            snapshot
        });

        EnhancedError {
            id: Uuid::new_v4(),
            correlation_id: correlation_id.unwrap_or_else(generate_correlation_id),
            route: request.map(|snapshot| snapshot.route.clone()),
            method: request.map(|snapshot| snapshot.method.clone()),
            category,
            retryable,
            status,
            timestamp: Utc::now(),
            duration: started.map(|started| started.elapsed()),
            suggestions: None,
            context,
            error,
        }
    }
}
