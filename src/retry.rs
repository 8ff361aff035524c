//! Retry classification and the fixed-wait retry executor
//!
//! The module connector signals transient overload through the in-body
//! `"try_again"` status rather than an HTTP status code, so retry
//! classification has to look at the decoded error, not the transport
//! layer alone. This module provides the [`IsRetryable`] trait for that
//! classification and the retry executors shared by the async and
//! blocking execution modes of the request engine.
//!
//! The policy is a bounded number of attempts with a fixed wait between
//! them. Retries for one logical call are strictly sequential; the engine
//! never races duplicate attempts of the same call.

use crate::error::{AmcError, Error};
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (connection resets, non-200 answers, `"try_again"`
/// statuses) should return `true`. Failures that another attempt cannot
/// fix (non-JSON bodies, empty bodies, application error statuses) should
/// return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for AmcError {
    fn is_retryable(&self) -> bool {
        match self {
            // Transport trouble and explicit try-again answers are transient
            AmcError::Transport { .. } | AmcError::Temporary => true,
            // An exhausted call was transient all the way down; callers
            // with their own outer policy (batch items) may try it again
            AmcError::Exhausted { .. } => true,
            // Malformed and empty bodies mean the request itself is bad
            AmcError::Malformed | AmcError::Empty => false,
            // Application error statuses are final results
            AmcError::NotOk { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Amc(e) => e.is_retryable(),
            // Connection-level failures of plain page fetches
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Session(_) | Error::Scrape(_) | Error::Forbidden(_) | Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with bounded retries and a fixed wait
///
/// # Arguments
///
/// * `attempt_limit` - Total attempts, counting the first (clamped to ≥ 1)
/// * `wait` - Fixed pause between attempts
/// * `operation` - Async closure performing one attempt
///
/// # Returns
///
/// The first successful result, the first non-retryable error, or
/// [`AmcError::Exhausted`] carrying the attempt count and the last
/// failure once the limit is reached.
pub(crate) async fn run_with_retries<F, Fut, T>(
    attempt_limit: u32,
    wait: Duration,
    mut operation: F,
) -> Result<T, AmcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AmcError>>,
{
    let attempt_limit = attempt_limit.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(attempts = attempt, "call succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < attempt_limit => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    attempt_limit,
                    wait_ms = wait.as_millis(),
                    "call failed, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(error = %e, attempts = attempt, "retry attempts exhausted");
                return Err(AmcError::Exhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "call failed with non-retryable error");
                return Err(e);
            }
        }
    }
}

/// Blocking twin of [`run_with_retries`]
///
/// Identical classification and attempt accounting; the wait is a thread
/// sleep instead of a task suspension. Backs the blocking execution mode
/// of the request engine.
pub(crate) fn run_with_retries_blocking<F, T>(
    attempt_limit: u32,
    wait: Duration,
    mut operation: F,
) -> Result<T, AmcError>
where
    F: FnMut() -> Result<T, AmcError>,
{
    let attempt_limit = attempt_limit.max(1);
    let mut attempt = 1u32;

    loop {
        match operation() {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(attempts = attempt, "call succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < attempt_limit => {
                tracing::warn!(
                    error = %e,
                    attempt,
                    attempt_limit,
                    wait_ms = wait.as_millis(),
                    "call failed, retrying"
                );
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                tracing::error!(error = %e, attempts = attempt, "retry attempts exhausted");
                return Err(AmcError::Exhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "call failed with non-retryable error");
                return Err(e);
            }
        }
    }
}
