use std::time::Duration;

use tracing::warn;

use crate::error::{AcquireError, Result};

/// Blocking pause between attempts. Swapped for a recording fake in tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed-delay retry: `attempts` tries in total, `delay` between each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            delay: Duration::from_secs(5),
        }
    }
}

/// The last error seen once a policy gives up.
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    pub error: AcquireError,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Runs `op` until it succeeds, returns a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub fn run<T, F>(
        &self,
        sleeper: &dyn Sleeper,
        label: &str,
        mut op: F,
    ) -> std::result::Result<T, Exhausted>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_retryable() || attempt >= attempts => {
                    return Err(Exhausted { attempts: attempt, error });
                }
                Err(error) => {
                    warn!(
                        attempt,
                        max = attempts,
                        error = %error,
                        "{} failed, retrying in {}s",
                        label,
                        self.delay.as_secs()
                    );
                    sleeper.sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}
