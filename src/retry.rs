//! Retry logic for page fetches
//!
//! The reader fails often and transiently (overloaded backend, expired session token, truncated
//! body). [`fetch_with_retry`] runs an attempt up to `max_attempts` times with a configurable
//! delay between attempts, which is fixed by default and can grow geometrically with optional
//! jitter. The wait between attempts is cancellable so abandoning a download never has to sit
//! out a retry delay.
//!
//! # Example
//!
//! ```no_run
//! use folio_dl::retry::{IsRetryable, fetch_with_retry};
//! use folio_dl::config::RetryConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         f.write_str("transient")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let cancel = CancellationToken::new();
//! let result = fetch_with_retry(&config, &cancel, |_, _| {}, |_attempt| async {
//!     Ok::<_, MyError>(())
//! })
//! .await;
//! # let _ = result;
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_)
            | FetchError::Http { .. }
            | FetchError::EmptyResponse
            | FetchError::MalformedResponse(_)
            | FetchError::MissingElement { .. }
            | FetchError::Auth(_) => true,
            FetchError::NoAuthToken | FetchError::Exhausted { .. } | FetchError::Cancelled => {
                false
            }
        }
    }
}

/// Why [`fetch_with_retry`] gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last_error: E,
    },
    /// An attempt failed with an error that must not be retried
    Permanent(E),
    /// The cancellation token fired
    Cancelled,
}

/// Run `operation` until it succeeds, fails permanently, runs out of attempts or is cancelled
///
/// `operation` receives the 1-based attempt number. `on_retry` is called with the failed
/// attempt number and its error each time a retry is scheduled.
pub async fn fetch_with_retry<F, Fut, T, E, R>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    R: FnMut(u32, &E),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay = config.delay;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation(attempt) => result,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!(error = %e, "Operation failed with non-retryable error");
                return Err(RetryError::Permanent(e));
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!(
                    error = %e,
                    attempts = attempt,
                    "Operation failed after all retry attempts exhausted"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error: e,
                });
            }
            Err(e) => {
                let wait = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "Operation failed, retrying"
                );
                on_retry(attempt, &e);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }

                let next = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next.min(config.max_delay);
            }
        }
    }
}

/// Spread `delay` uniformly over `delay..=2 * delay`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
