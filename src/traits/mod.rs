//! Traits at the seams of the rail.
//!
//! - [`ErrorHandler`]: a stage of the failure pipeline, registered explicitly
//! - [`TransientError`]: "could retrying help?", used by the retry helpers
//!
//! # Examples
//!
//! ```
//! use handler_rail::traits::TransientError;
//! use handler_rail::RouteError;
//!
//! let err = RouteError::new("request timeout").with_code("ETIMEDOUT");
//! assert!(err.is_transient());
//! ```

pub mod error_handler;
pub mod transient;

pub use error_handler::{ErrorHandler, WrappedErrorHandler};
pub use transient::{TransientError, TransientErrorExt};
