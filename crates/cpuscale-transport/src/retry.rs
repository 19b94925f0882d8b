//! Bounded retry with a fixed backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, warn};

use cpuscale_core::{CancelSignal, Settings};

use crate::error::TransportError;

/// How many times a logical call is attempted and how long to wait between
/// attempts. The wait is constant; there is no growth and no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first. At least 1.
    pub max_retries: u32,
    /// Wait between a failed attempt and the next one.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            interval,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.restclient_max_retries,
            settings.restclient_retry_interval,
        )
    }

    /// Drive `attempt` until it succeeds, the budget is spent, or `cancel`
    /// fires.
    ///
    /// `attempt` receives the zero-based attempt index. Cancellation is
    /// observed both while an attempt is in flight and during the backoff
    /// wait; the in-flight attempt is dropped.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancelSignal,
        mut attempt: F,
    ) -> Result<T, TransportError>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut cancel = cancel.clone();
        let mut made: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(operation, made));
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(operation, made + 1)),
                result = attempt(made) => result,
            };
            made += 1;

            let err = match result {
                Ok(value) => {
                    debug!(%operation, attempts = made, "call succeeded");
                    return Ok(value);
                }
                Err(err) => err,
            };

            if made >= self.max_retries {
                error!(
                    %operation,
                    attempts = made,
                    error = %err,
                    "giving up after exhausting retries"
                );
                return Err(TransportError::Exhausted {
                    operation: operation.to_string(),
                    attempts: made,
                    last: err.to_string(),
                });
            }

            warn!(
                %operation,
                attempt = made,
                max_retries = self.max_retries,
                retry_in = ?self.interval,
                error = %err,
                "attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(operation, made)),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

fn cancelled(operation: &str, attempts: u32) -> TransportError {
    debug!(%operation, attempts, "call abandoned on cancellation");
    TransportError::Cancelled {
        operation: operation.to_string(),
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use cpuscale_core::cancel_pair;
    use tokio::time::Instant;

    /// Fails the first `failures` attempts, then succeeds with the attempt index.
    fn flaky(failures: u32, calls: Arc<AtomicU32>) -> impl FnMut(u32) -> std::future::Ready<Result<u32, String>> {
        move |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            if attempt < failures {
                std::future::ready(Err(format!("boom #{attempt}")))
            } else {
                std::future::ready(Ok(attempt))
            }
        }
    }

    #[test]
    fn default_policy_matches_documented_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.interval, Duration::from_secs(2));
        assert_eq!(
            RetryPolicy::from_settings(&Settings::default()),
            RetryPolicy::default()
        );
    }

    #[test]
    fn zero_retries_is_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_retries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_has_no_delay() {
        let (_trigger, cancel) = cancel_pair();
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let value = policy
            .run("GET test", &cancel, flaky(0, calls.clone()))
            .await
            .unwrap();

        assert_eq!(value, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_n_failures_with_n_delays() {
        let (_trigger, cancel) = cancel_pair();
        let policy = RetryPolicy::new(5, Duration::from_secs(2));

        for failures in 1..5u32 {
            let calls = Arc::new(AtomicU32::new(0));
            let start = Instant::now();

            let value = policy
                .run("GET test", &cancel, flaky(failures, calls.clone()))
                .await
                .unwrap();

            assert_eq!(value, failures);
            assert_eq!(calls.load(Ordering::SeqCst), failures + 1);
            assert_eq!(start.elapsed(), Duration::from_secs(2) * failures);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_call_stops_at_max_retries() {
        let (_trigger, cancel) = cancel_pair();
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let err = policy
            .run("PUT test", &cancel, flaky(u32::MAX, calls.clone()))
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts(), 3);
        // No wait after the last attempt.
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        match err {
            TransportError::Exhausted { operation, last, .. } => {
                assert_eq!(operation, "PUT test");
                assert_eq!(last, "boom #2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_budget_never_waits() {
        let (_trigger, cancel) = cancel_pair();
        let policy = RetryPolicy::new(1, Duration::from_secs(30));
        let calls = Arc::new(AtomicU32::new(0));

        let start = Instant::now();
        let err = policy
            .run("GET test", &cancel, flaky(1, calls.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Exhausted { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_makes_no_attempt() {
        let (trigger, cancel) = cancel_pair();
        trigger.cancel();
        let calls = Arc::new(AtomicU32::new(0));

        let err = RetryPolicy::default()
            .run("GET test", &cancel, flaky(0, calls.clone()))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_cuts_backoff_short() {
        let (trigger, cancel) = cancel_pair();
        let policy = RetryPolicy::new(10, Duration::from_secs(60));
        let calls = Arc::new(AtomicU32::new(0));

        let task = {
            let calls = calls.clone();
            tokio::spawn(async move {
                policy
                    .run("GET test", &cancel, flaky(u32::MAX, calls))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(90)).await;
        trigger.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        // Attempts at t=0 and t=60; cancelled while waiting for t=120.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_drops_in_flight_attempt() {
        let (trigger, cancel) = cancel_pair();
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let task = tokio::spawn(async move {
            policy
                .run("GET slow", &cancel, |_| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, String>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        trigger.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 1);
    }
}
