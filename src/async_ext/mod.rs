//! Opt-in async helpers for work done inside handlers.
//!
//! The rail itself never retries or times out a handler. These helpers let a
//! handler do so around its own calls, using the same transient
//! classification the rail reports as `retryable`.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use handler_rail::async_ext::{retry_transient, with_timeout, ExponentialBackoff};
//!
//! async fn load(pool: &Pool) -> Result<Vec<User>, RouteError> {
//!     retry_transient(
//!         || with_timeout(Duration::from_secs(2), pool.fetch_users()),
//!         ExponentialBackoff::default(),
//!     )
//!     .await
//! }
//! ```

mod retry;
mod tokio_ext;

pub use retry::{
    retry_with_metadata, retry_with_policy, ExponentialBackoff, FixedDelay, RetryPolicy,
    RetryResult,
};
pub use tokio_ext::{retry_transient, retry_transient_n, with_timeout, TimeoutError};
