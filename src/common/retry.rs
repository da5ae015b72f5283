//! Bounded retry with exponential backoff and jitter.
//!
//! The core components never retry on their own; wrappers such as
//! `RetryingStorage` and `RetryingDispatcher` layer this on top.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Randomise each delay by ±30%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or the
/// attempts run out. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: &str, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = jittered(backoff, policy.jitter);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "⚠️ {} failed: {}. Retrying",
                    operation,
                    e
                );

                tokio::time::sleep(delay).await;

                backoff = Duration::from_millis(
                    ((backoff.as_millis() as f64 * policy.backoff_multiplier)
                        .min(policy.max_backoff.as_millis() as f64)) as u64,
                );
            }
        }
    }
}

fn jittered(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let factor = 1.0 + rand::rng().random_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    } else {
        base
    }
}
