//! Retry with exponential backoff.
//!
//! Only model acquisition at startup goes through here; every other
//! operation is single-attempt and surfaces its error immediately.

use std::{fmt::Display, time::Duration};

use tracing::{info, warn};

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero acts as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed retry.
    pub backoff_factor: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            backoff_factor: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use ragindex::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_after(1), Duration::from_secs(10));
    /// assert_eq!(policy.delay_after(2), Duration::from_secs(20));
    /// ```
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let factor = self.backoff_factor.max(1.0).powi(exponent);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// The last error of an operation that exhausted its attempts.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. Failed attempts are logged at
/// `warn`, followed by a blocking sleep of [`RetryPolicy::delay_after`].
pub fn retry_with_backoff<T, E, F>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
) -> std::result::Result<T, RetryExhausted<E>>
where
    E: Display,
    F: FnMut(u32) -> std::result::Result<T, E>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt >= max_attempts => {
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    %error,
                    "giving up"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    %error,
                    delay_secs = delay.as_secs_f64(),
                    "attempt failed, retrying"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
