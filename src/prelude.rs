//! Convenience re-exports for handler code.
//!
//! ```
//! use handler_rail::prelude::*;
//!
//! async fn handler(context: SharedContext) -> RouteResult<String> {
//!     Ok(context.correlation_id())
//! }
//! # let _ = handler;
//! ```

pub use crate::async_ext::{retry_transient, with_timeout, ExponentialBackoff, FixedDelay};
pub use crate::config::{Environment, RailConfig};
pub use crate::context::SharedContext;
pub use crate::rail::Rail;
pub use crate::router::Patch;
pub use crate::traits::{ErrorHandler, TransientError};
pub use crate::types::{EnhancedError, ErrorCategory, RouteError, RouteResult};
