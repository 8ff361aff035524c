//! Wave-based bulk fetch scheduling
//!
//! Bulk operations (member listings, bulk user lookup) drive many
//! requests against one third-party host. Throughput is shaped by two
//! independent controls: a counting gate caps simultaneous in-flight
//! requests, and dispatch proceeds in waves — at most `wave_size` tasks
//! are launched together and the whole wave drains before the next
//! starts, with an optional idle pause in between. The wave boundaries
//! are a deliberate courtesy rate limit; this must not be "optimized"
//! into an unconstrained pipeline.
//!
//! Tasks are independent: one item's failure never propagates to its
//! siblings. Results come back in item order regardless of completion
//! order.

use crate::config::BatchConfig;
use crate::retry::IsRetryable;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Run `task` over every item, in waves, under the concurrency gate
///
/// Returns one result per item, in item order. The gate only bounds how
/// many tasks are inside the network call at once; the wave size bounds
/// how many are dispatched before the scheduler waits for all of them.
pub(crate) async fn run_waves<T, R, F, Fut>(items: Vec<T>, config: &BatchConfig, task: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let gate = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
    let wave_size = config.wave_size.max(1);
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut remaining = items.into_iter();
    let mut wave_index = 0usize;

    loop {
        let wave: Vec<T> = remaining.by_ref().take(wave_size).collect();
        if wave.is_empty() {
            break;
        }
        wave_index += 1;
        tracing::debug!(wave = wave_index, size = wave.len(), total, "dispatching wave");

        let task = &task;
        let wave_futures = wave.into_iter().map(|item| {
            let gate = Arc::clone(&gate);
            async move {
                // The gate is never closed, so acquisition only fails if
                // it were; proceeding without a permit is the fallback.
                let _permit = gate.acquire_owned().await.ok();
                task(item).await
            }
        });
        results.extend(join_all(wave_futures).await);

        if remaining.len() > 0 && !config.wave_delay.is_zero() {
            tokio::time::sleep(config.wave_delay).await;
        }
    }

    results
}

/// Keep re-trying one batch item on transient failures
///
/// Transient failures back off for `item_backoff` and try again — by
/// default forever, preserving the service's observed client behavior
/// (a permanently unreachable host stalls the batch). When
/// `max_item_retries` is set, the item is abandoned once the cap is
/// reached. Non-transient failures abandon the item immediately. An
/// abandoned item yields `None` and is dropped from the aggregate.
pub(crate) async fn persistent<T, E, F, Fut>(config: &BatchConfig, mut op: F) -> Option<T>
where
    E: IsRetryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0u32;
    loop {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) if e.is_retryable() => {
                retries += 1;
                if let Some(cap) = config.max_item_retries {
                    if retries > cap {
                        tracing::warn!(error = %e, retries, "batch item abandoned at retry cap");
                        return None;
                    }
                }
                tracing::warn!(
                    error = %e,
                    retries,
                    backoff_ms = config.item_backoff.as_millis(),
                    "batch item failed, backing off"
                );
                tokio::time::sleep(config.item_backoff).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "batch item failed, skipping");
                return None;
            }
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AmcError;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    fn batch(concurrency_limit: usize, wave_size: usize, wave_delay: Duration) -> BatchConfig {
        BatchConfig {
            concurrency_limit,
            wave_size,
            wave_delay,
            item_backoff: Duration::from_millis(2),
            max_item_retries: None,
        }
    }

    #[tokio::test]
    async fn gate_caps_in_flight_and_waves_fully_drain() {
        let config = batch(10, 30, Duration::ZERO);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let wave_violation = Arc::new(AtomicBool::new(false));

        let items: Vec<usize> = (0..100).collect();
        let results = run_waves(items, &config, |index| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            let completed = completed.clone();
            let wave_violation = wave_violation.clone();
            async move {
                // A task of wave w may only start once every task of the
                // previous waves has completed
                let wave_floor = (index / 30) * 30;
                if completed.load(Ordering::SeqCst) < wave_floor {
                    wave_violation.store(true, Ordering::SeqCst);
                }

                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                completed.fetch_add(1, Ordering::SeqCst);
                index * 2
            }
        })
        .await;

        assert_eq!(results.len(), 100);
        // Item order is preserved regardless of completion order
        assert_eq!(results[0], 0);
        assert_eq!(results[99], 198);
        assert!(
            peak.load(Ordering::SeqCst) <= 10,
            "peak in-flight was {}",
            peak.load(Ordering::SeqCst)
        );
        assert!(
            !wave_violation.load(Ordering::SeqCst),
            "a task started before its wave was due"
        );
    }

    #[tokio::test]
    async fn results_keep_item_order_under_inverted_completion() {
        let config = batch(8, 8, Duration::ZERO);
        let items: Vec<u64> = (0..8).collect();
        let results = run_waves(items, &config, |i| async move {
            // Later items finish first
            tokio::time::sleep(Duration::from_millis(40 - i * 5)).await;
            i
        })
        .await;
        assert_eq!(results, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn wave_delay_separates_waves() {
        let config = batch(4, 1, Duration::from_millis(40));
        let start = std::time::Instant::now();
        let results = run_waves(vec![1, 2, 3], &config, |i| async move { i }).await;
        let elapsed = start.elapsed();

        assert_eq!(results, vec![1, 2, 3]);
        // Two inter-wave pauses between three waves; none after the last
        assert!(
            elapsed >= Duration::from_millis(80),
            "waves ran without the idle pause, took {elapsed:?}"
        );
        assert!(
            elapsed < Duration::from_millis(500),
            "a pause ran after the final wave, took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn empty_input_dispatches_nothing() {
        let config = batch(4, 4, Duration::ZERO);
        let results: Vec<u32> = run_waves(Vec::new(), &config, |i: u32| async move { i }).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn persistent_retries_transient_failures() {
        let config = batch(1, 1, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = persistent(&config, || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(AmcError::Transport {
                        reason: "connection refused".to_string(),
                    })
                } else {
                    Ok(7u32)
                }
            }
        })
        .await;

        assert_eq!(result, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn persistent_skips_on_non_retryable_failure() {
        let config = batch(1, 1, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Option<u32> = persistent(&config, || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AmcError::NotOk {
                    status: "no_permission".to_string(),
                })
            }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no retry on final statuses");
    }

    #[tokio::test]
    async fn persistent_honors_the_optional_retry_cap() {
        let mut config = batch(1, 1, Duration::ZERO);
        config.max_item_retries = Some(2);
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Option<u32> = persistent(&config, || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AmcError::Temporary)
            }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(
            calls.load(Ordering::SeqCst),
            3,
            "initial call plus two capped retries"
        );
    }
}
