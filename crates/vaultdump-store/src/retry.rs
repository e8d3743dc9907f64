//! Bounded exponential retry around a [`RemoteStore`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{RemoteStore, StoreError, UploadError};

/// Exponential backoff with a total elapsed-time budget.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt.
    pub initial_interval: Duration,
    /// Growth factor applied after each failure.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_interval: Duration,
    /// Jitter as a fraction of the current delay (0 disables jitter).
    pub randomization_factor: f64,
    /// Total wall-clock budget across all attempts and delays.
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            randomization_factor: 0.5,
            max_elapsed_time: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Build the interval generator. The budget is enforced by the caller.
    fn backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            randomization_factor: self.randomization_factor,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

/// Summary of a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Wall-clock time from the first attempt to success.
    pub elapsed: Duration,
}

/// Uploads through a [`RemoteStore`] with retry and cancellation.
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn RemoteStore>,
    policy: RetryPolicy,
}

impl Uploader {
    /// Create an uploader.
    pub fn new(store: Arc<dyn RemoteStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Human-readable location of `key` in the underlying store.
    pub fn location(&self, key: &str) -> String {
        self.store.location(key)
    }

    /// Upload `local_path` to `key`, retrying failures until the budget runs
    /// out.
    ///
    /// Every attempt is bounded by what is left of the budget, and no retry is
    /// scheduled once its delay would reach the budget. Cancellation is
    /// checked before every attempt and raced against both the attempt and
    /// the backoff sleep; it is never retried.
    pub async fn store(
        &self,
        local_path: &Path,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadReport, UploadError> {
        let started = Instant::now();
        let deadline = started + self.policy.max_elapsed_time;
        let mut backoff = self.policy.backoff();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled { attempts });
            }

            attempts += 1;
            let allowed = deadline.saturating_duration_since(Instant::now());
            debug!(
                key,
                attempt = attempts,
                allowed_ms = allowed.as_millis() as u64,
                "upload attempt"
            );

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(key, attempt = attempts, "upload aborted by cancellation");
                    return Err(UploadError::Cancelled { attempts });
                }
                result = timeout(allowed, self.store.put_file(local_path, key)) => {
                    result.unwrap_or_else(|_| Err(StoreError::TimedOut {
                        key: key.to_string(),
                        after: allowed,
                    }))
                }
            };

            let error: StoreError = match result {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    info!(
                        location = %self.store.location(key),
                        attempts,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "upload succeeded"
                    );
                    return Ok(UploadReport { attempts, elapsed });
                }
                Err(e) => e,
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            let wait = backoff.next_backoff().unwrap_or(remaining);
            if wait >= remaining {
                return Err(exhausted(attempts, started.elapsed(), error));
            }

            warn!(
                key,
                attempt = attempts,
                error = %error,
                retry_in_ms = wait.as_millis() as u64,
                "upload attempt failed, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(key, attempts, "upload retry cancelled during backoff");
                    return Err(UploadError::Cancelled { attempts });
                }
                _ = sleep(wait) => {}
            }
        }
    }
}

fn exhausted(attempts: u32, elapsed: Duration, source: StoreError) -> UploadError {
    warn!(
        attempts,
        elapsed_ms = elapsed.as_millis() as u64,
        error = %source,
        "upload retry budget exhausted"
    );
    UploadError::Exhausted {
        attempts,
        elapsed,
        source,
    }
}
