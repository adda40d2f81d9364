use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

const BACKOFF_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^(attempt - 1)` with ±10% jitter.
    Exponential,
    /// `base * attempt`.
    Linear,
}

/// How many times an operation is attempted and how long to sleep between
/// attempts. Delays never exceed `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u64,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u64, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff: Backoff::Exponential,
        }
    }

    pub fn linear(max_attempts: u64, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff: Backoff::Linear,
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::linear(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u64) -> Duration {
        let delay = match self.backoff {
            Backoff::Exponential => {
                let exp = BACKOFF_FACTOR.powi(attempt.saturating_sub(1).min(32) as i32);
                let base = self.base_delay.as_millis() as f64 * exp;
                let jitter = rand::rng().random_range(0.9..1.1);
                Duration::from_millis((base * jitter) as u64)
            }
            Backoff::Linear => self
                .base_delay
                .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX)),
        };
        delay.min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails with an error `is_retryable` rejects,
/// or `policy.max_attempts` attempts have been made. The last error is
/// returned unchanged.
///
/// `op` receives the 1-based attempt number.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
