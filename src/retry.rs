//! Caller-side retry helpers.
//!
//! The poll loop never retries on its own. Actions that need resilience use
//! one of these:
//!
//! - [`retry_with_backoff`] repeats an operation while it fails with a
//!   retryable [`Error`], sleeping between attempts.
//! - [`retry_residual`] repeats an idempotent bulk operation on whatever
//!   subset it left behind, up to a fixed number of attempts.
//!
//! # Example
//!
//! ```ignore
//! use shardkeeper::retry::{retry_with_backoff, RetryConfig};
//!
//! let config = RetryConfig::fixed(Duration::from_secs(120), 3);
//! retry_with_backoff(&config, "wait_for_idle_repository", || async {
//!     ensure_no_running_snapshot(client, "backups").await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};

use crate::{Error, Result};

/// Attempts the delete-indices action makes before giving up on a residual
pub const DELETE_ATTEMPTS: u32 = 3;

/// Backoff settings for [`retry_with_backoff`].
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the delay between retries
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in 0.5..1.5
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Constant delay without jitter, e.g. "retry every 120s, 3 times"
    pub fn fixed(interval: Duration, attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: interval,
            max_delay: interval,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Execute an async operation, retrying retryable failures with backoff.
///
/// Errors for which [`Error::is_retryable`] is false are returned at once.
/// Otherwise retries continue until success or until `max_attempts` is
/// reached, in which case the last error is returned.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => {
                debug!(operation = %operation_name, error = %e, "Not retrying");
                return Err(e);
            }
            Err(e) => {
                if config.max_attempts > 0 && attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let sleep_for = if config.jitter {
                    let factor = rand::thread_rng().gen_range(0.5..1.5);
                    Duration::from_secs_f64(delay.as_secs_f64() * factor)
                } else {
                    delay
                };

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = sleep_for.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(sleep_for).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// Result of [`retry_residual`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualOutcome {
    /// Attempts made
    pub attempts: u32,
    /// Items still outstanding after the last attempt
    pub remaining: Vec<String>,
}

impl ResidualOutcome {
    /// Whether nothing is left over
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Apply an idempotent bulk operation, then retry it on the residual subset.
///
/// Each call of `attempt` receives the items still outstanding, performs the
/// operation, re-queries the cluster and returns what is left. Stops as soon
/// as nothing is left or after `max_attempts` attempts. Errors from `attempt`
/// are returned as-is.
pub async fn retry_residual<F, Fut>(
    operation_name: &str,
    max_attempts: u32,
    items: Vec<String>,
    mut attempt: F,
) -> Result<ResidualOutcome>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<String>>>,
{
    if max_attempts == 0 {
        return Err(Error::configuration(format!(
            "{}: max_attempts must be at least 1",
            operation_name
        )));
    }

    let mut remaining = items;
    let mut attempts = 0u32;

    while !remaining.is_empty() && attempts < max_attempts {
        attempts += 1;
        let pending = remaining.len();
        remaining = attempt(remaining).await?;
        if remaining.is_empty() {
            debug!(operation = %operation_name, attempts, "All items processed");
        } else {
            warn!(
                operation = %operation_name,
                attempt = attempts,
                pending,
                remaining = remaining.len(),
                "Items left over, retrying the residual"
            );
        }
    }

    if !remaining.is_empty() {
        error!(
            operation = %operation_name,
            attempts,
            remaining = ?remaining,
            "Items still left over after max attempts"
        );
    }

    Ok(ResidualOutcome {
        attempts,
        remaining,
    })
}
