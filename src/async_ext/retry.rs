//! Retry policies and a runtime-neutral retry loop.
//!
//! The loop accepts a sleep function, so it works with any timer; see
//! [`retry_transient`](super::retry_transient) for the tokio shortcut.

use core::future::Future;
use core::time::Duration;

use crate::traits::TransientError;

/// Defines when and how long to wait between retry attempts.
pub trait RetryPolicy: Clone {
    /// Returns the delay before the next retry attempt, or `None` to stop retrying.
    ///
    /// `attempt` is 0-indexed.
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;

    /// Resets the policy to its initial state.
    fn reset(&mut self);
}

/// Exponential backoff retry policy.
///
/// ```
/// use core::time::Duration;
/// use handler_rail::async_ext::{ExponentialBackoff, RetryPolicy};
///
/// let mut policy = ExponentialBackoff::new()
///     .with_initial_delay(Duration::from_millis(100))
///     .with_max_attempts(3);
///
/// assert_eq!(policy.next_delay(1), Some(Duration::from_millis(200)));
/// assert_eq!(policy.next_delay(3), None);
/// ```
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    pub multiplier: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            multiplier: 2.0,
        }
    }
}

impl ExponentialBackoff {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[inline]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    #[inline]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    #[inline]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }

    fn reset(&mut self) {}
}

/// Waits the same duration between each retry attempt.
#[derive(Clone, Debug)]
pub struct FixedDelay {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl FixedDelay {
    #[inline]
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self { delay, max_attempts }
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(self.delay)
    }

    fn reset(&mut self) {}
}

/// Outcome of [`retry_with_metadata`].
#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, E>,
    /// Total number of attempts made, including the first.
    pub attempts: u32,
    /// Time spent sleeping between attempts.
    pub total_wait_time: Duration,
}

/// Retries `operation` while it fails with a transient error and `policy`
/// allows another attempt. Returns the last error otherwise.
///
/// ```rust,ignore
/// use handler_rail::async_ext::{retry_with_policy, ExponentialBackoff};
///
/// let rows = retry_with_policy(
///     || query_users(&pool),
///     ExponentialBackoff::default(),
///     tokio::time::sleep,
/// ).await?;
/// ```
pub async fn retry_with_policy<F, Fut, T, E, P, S, SFut>(
    operation: F,
    policy: P,
    sleep_fn: S,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError + core::fmt::Display,
    P: RetryPolicy,
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    retry_with_metadata(operation, policy, sleep_fn).await.result
}

/// Like [`retry_with_policy`], also reporting attempts and total wait time.
pub async fn retry_with_metadata<F, Fut, T, E, P, S, SFut>(
    mut operation: F,
    mut policy: P,
    sleep_fn: S,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: TransientError + core::fmt::Display,
    P: RetryPolicy,
    S: Fn(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let mut attempt = 0u32;
    let mut total_wait_time = Duration::ZERO;

    loop {
        let error = match operation().await {
            Ok(value) => {
                return RetryResult { result: Ok(value), attempts: attempt + 1, total_wait_time }
            },
            Err(error) => error,
        };

        if error.is_permanent() {
            return RetryResult { result: Err(error), attempts: attempt + 1, total_wait_time };
        }

        let Some(delay) = policy.next_delay(attempt) else {
            tracing::warn!(attempts = attempt + 1, error = %error, "retries exhausted");
            return RetryResult { result: Err(error), attempts: attempt + 1, total_wait_time };
        };
        let delay = error.retry_after_hint().map_or(delay, |hint| hint.max(delay));

        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying transient failure");
        total_wait_time += delay;
        sleep_fn(delay).await;
        attempt += 1;
    }
}
