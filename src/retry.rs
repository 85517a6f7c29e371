//! Bounded retry with a fixed interval.
//!
//! One policy type replaces the ad-hoc retry loops that otherwise grow at
//! every call site. The caller supplies the predicate deciding which errors
//! are worth another attempt; everything else returns immediately.

use std::time::Duration;

use tracing::warn;

use crate::error::{OpsError, Result};

/// A bounded, fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` counts the initial attempt.
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            interval,
        }
    }

    /// Run `op` until it succeeds, `retryable` rejects the error, or the
    /// attempt budget is spent. The last error is returned unchanged so the
    /// caller keeps the raw protocol text.
    pub async fn run<T, F, Fut, P>(&self, what: &str, retryable: P, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&OpsError) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && retryable(&err) => {
                    warn!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff = ?self.interval,
                        error = %err,
                        "retrying after backoff"
                    );
                    tokio::time::sleep(self.interval).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
