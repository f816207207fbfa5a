use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded retry with exponential backoff and jitter.
///
/// Used for the fire-and-forget document writes: a transient store failure is
/// retried a few times and then abandoned, leaving persisted state unchanged.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry
    pub initial_delay: Duration,
    /// Cap on the per-retry delay
    pub max_delay: Duration,
    /// Jitter as a fraction of the computed delay (0.5 = ±50%)
    pub jitter: f64,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(2),
            jitter: 0.5,
        }
    }

    /// Preset for fire-and-forget document writes (3 attempts, 250 ms base).
    #[must_use]
    pub fn document_write() -> Self {
        Self::new(3, Duration::from_millis(250))
    }

    /// Single attempt, no delays.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_ms = self.initial_delay.as_millis() as f64
            * 2f64.powi(i32::try_from(attempt - 1).unwrap_or(i32::MAX));
        #[allow(clippy::cast_precision_loss)]
        let capped = base_ms.min(self.max_delay.as_millis() as f64);

        let span = capped * self.jitter;
        let jittered = if span > 0.0 {
            (capped + rand::rng().random_range(-span..=span)).max(0.0)
        } else {
            capped
        };

        // Milliseconds are small and non-negative here.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = jittered as u64;
        Duration::from_millis(millis)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::document_write()
    }
}

/// Execute an async operation with retries.
///
/// Returns the first success, or the last error once all attempts failed.
///
/// # Errors
///
/// Propagates the operation's final error after `max_attempts` failures.
///
/// # Panics
///
/// Panics if `policy.max_attempts` is 0.
pub async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    assert!(
        policy.max_attempts >= 1,
        "RetryPolicy.max_attempts must be >= 1, got {}",
        policy.max_attempts
    );

    let mut last_error: Option<E> = None;

    for attempt in 0..policy.max_attempts {
        let delay = policy.delay_for_attempt(attempt);
        if !delay.is_zero() {
            sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        "{}: succeeded on attempt {}/{}",
                        operation_name,
                        attempt + 1,
                        policy.max_attempts
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                let remaining = policy.max_attempts - attempt - 1;
                if remaining > 0 {
                    debug!(
                        "{}: attempt {}/{} failed ({}), {} retries remaining",
                        operation_name,
                        attempt + 1,
                        policy.max_attempts,
                        e,
                        remaining
                    );
                } else {
                    warn!(
                        "{}: all {} attempts failed, last error: {}",
                        operation_name, policy.max_attempts, e
                    );
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.expect("at least one attempt should have been made"))
}
