use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::errors::{CrawlerError, Result};

/// Re-invokes an operation on designated transient failures, with fixed or
/// exponentially growing delay between attempts.
///
/// The attempt cap is optional and unbounded by default; callers that need
/// a bound must set one. When the cap is reached the last attempt's error
/// is returned as-is; there is no distinct "exhausted" error kind, so
/// callers cannot tell a give-up from a plain failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delay: Duration,
    backoff_multiplier: u32,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Policy with a fixed delay between attempts and no attempt cap.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            backoff_multiplier: 1,
            max_attempts: None,
        }
    }

    /// Multiply the delay after each failed attempt.
    pub fn with_backoff(mut self, multiplier: u32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Cap the total number of attempts (including the first).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    /// Run `operation`, retrying while `is_retryable` accepts the error.
    ///
    /// Non-retryable errors propagate immediately. The delay is a plain
    /// `tokio::time::sleep`; no lock or transaction may be held across it.
    pub async fn run<T, Op, Fut, P>(&self, mut operation: Op, is_retryable: P) -> Result<T>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&CrawlerError) -> bool,
    {
        let mut delay = self.delay;
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => return Err(err),
                Err(err) => {
                    if let Some(max) = self.max_attempts {
                        if attempt >= max {
                            warn!("giving up after {attempt} attempts: {err}");
                            return Err(err);
                        }
                    }

                    warn!("{err}, retrying in {}s", delay.as_secs_f64());
                    tokio::time::sleep(delay).await;

                    delay = delay.saturating_mul(self.backoff_multiplier);
                    attempt += 1;
                }
            }
        }
    }
}
