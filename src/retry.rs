//! Bounded retry with exponential backoff.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry schedule: up to `max_attempts` tries, sleeping `base_delay × 2^attempt` after each
/// failed attempt except the last.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    jitter: Option<f64>,
}

impl RetryPolicy {
    /// Policy with the given attempt budget (minimum one) and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter: None,
        }
    }

    /// Policy that never retries.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Add up to `fraction` of each delay as random extra wait.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = (fraction > 0.0).then_some(fraction);
        self
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor);
        match self.jitter {
            Some(fraction) => {
                let extra = rand::thread_rng().gen_range(0.0..=fraction);
                delay.mul_f64(1.0 + extra)
            }
            None => delay,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent, returning the last error.
    ///
    /// `op` receives the 0-based attempt number. Each failure is logged with `operation` as
    /// context.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt + 1 >= self.max_attempts => {
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        error = %error,
                        "Giving up after final attempt"
                    );
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}
