//! Exponential backoff for idempotent requests

use log::warn;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::ApiError;

/// Upper bound for a single backoff delay, before jitter
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Errors that may carry the HTTP status of the failed attempt
pub trait RetryableError: fmt::Display {
    /// HTTP status of the failure, `None` when no response was received
    fn status(&self) -> Option<u16>;
}

impl RetryableError for ApiError {
    fn status(&self) -> Option<u16> {
        match self.status {
            0 => None,
            status => Some(status),
        }
    }
}

impl RetryableError for reqwest::Error {
    fn status(&self) -> Option<u16> {
        reqwest::Error::status(self).map(|s| s.as_u16())
    }
}

/// Whether a failure with this status is worth another attempt
///
/// Client errors are final, except 408 (timeout) and 429 (rate limited).
/// Server errors and failures without a status are retried.
pub fn is_retryable_status(status: Option<u16>) -> bool {
    match status {
        Some(408) | Some(429) => true,
        Some(status) if (400..500).contains(&status) => false,
        _ => true,
    }
}

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first
    pub max_attempts: u32,
    /// Delay before the second call; doubled for every further call
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }

    /// Run `operation` under this policy
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError,
    {
        with_retry(operation, self.max_attempts, self.initial_delay).await
    }
}

/// Call `operation` until it succeeds, fails permanently, or `max_attempts`
/// calls have been made
///
/// The delay starts at `initial_delay`, doubles after every failed attempt
/// and is jittered by a uniform factor in `[0.9, 1.1]`. When attempts run
/// out the last error is returned as is. A `max_attempts` of zero is
/// treated as one.
pub async fn with_retry<T, E, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = initial_delay;
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts || !is_retryable_status(err.status()) {
                    return Err(err);
                }

                let wait = jittered(delay);
                warn!(
                    "Request failed (attempt {}/{}): {}. Retrying in {:?}",
                    attempt, max_attempts, err, wait
                );
                sleep(wait).await;

                delay = delay.saturating_mul(2);
                attempt += 1;
            }
        }
    }
}

fn jittered(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.9..=1.1);
    delay.min(MAX_BACKOFF).mul_f64(factor)
}
