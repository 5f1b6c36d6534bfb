use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use serde::Deserialize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    /// Delay doubles after every failed attempt.
    Exponential,
}

/// Bounded retry with a delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::with_backoff(max_attempts, delay, Backoff::Fixed)
    }

    #[must_use]
    pub const fn with_backoff(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            delay,
            backoff,
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }

    /// Run `attempt` until it succeeds, the error is not retryable, or the
    /// attempts are used up. The last error is returned.
    ///
    /// # Errors
    /// Returns the error of the final attempt.
    pub async fn run<T, E, Op, Fut, P>(
        &self,
        operation: &str,
        mut attempt: Op,
        retryable: P,
    ) -> Result<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.attempts();
        let mut current = 1;

        loop {
            match attempt(current).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!("{operation} failed (attempt {current}/{max_attempts}): {error}");
                    if current >= max_attempts || !retryable(&error) {
                        return Err(error);
                    }

                    let delay = self.delay_after(current);
                    if !delay.is_zero() {
                        debug!("Retrying {operation} in {} seconds...", delay.as_secs_f32());
                        tokio::time::sleep(delay).await;
                    }
                    current += 1;
                }
            }
        }
    }
}
