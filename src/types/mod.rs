//! Error types carried through the rail.
//!
//! - [`RouteError`]: what handlers return (or what a panic becomes)
//! - [`EnhancedError`]: a `RouteError` plus request, timing and classification data
//! - [`ErrorCategory`]: the fixed classification taxonomy
//! - [`RequestSnapshot`]: the structured request view attached to enhanced errors
//!
//! # Examples
//!
//! ```
//! use handler_rail::{ErrorCategory, RouteError};
//! use http::StatusCode;
//!
//! let err = RouteError::new("quota exceeded")
//!     .with_category(ErrorCategory::BusinessLogic)
//!     .with_status(StatusCode::CONFLICT);
//!
//! assert_eq!(err.category(), Some(ErrorCategory::BusinessLogic));
//! assert_eq!(err.status(), Some(StatusCode::CONFLICT));
//! ```
use smallvec::SmallVec;

pub mod category;
pub mod enhanced_error;
pub mod route_error;
pub mod snapshot;

pub use category::*;
pub use enhanced_error::*;
pub use route_error::RouteError;
pub(crate) use route_error::Failure;
pub use snapshot::*;

/// Ordered recovery hints.
///
/// Inline storage covers the fixed checklists without a heap allocation.
pub type Suggestions = SmallVec<[String; 4]>;

/// Result alias for handlers guarded by the rail.
pub type RouteResult<T> = Result<T, RouteError>;
