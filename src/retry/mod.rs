//! Retry with backoff for ledger operations.
//!
//! - Attempts are 1-indexed; the first attempt runs immediately
//! - Exponential backoff: `base_delay * 2^(attempt-1)`, capped at `max_delay`
//! - Non-retryable errors short-circuit on the first failure
//! - The error returned is always the last one the operation produced

use crate::error::LedgerError;
use crate::observer::{Event, Observer};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[cfg(test)]
mod proptests;

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Default upper bound for exponential delays.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// How often and how patiently to retry a failing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub exponential: bool,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            exponential: true,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Errors that know whether retrying them can help.
///
/// Unclassified errors are retried.
pub trait Retryable {
    fn is_retryable(&self) -> bool {
        true
    }
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        LedgerError::is_retryable(self)
    }
}

impl Retryable for std::io::Error {}

/// Delay to wait after the failed `attempt` (1-indexed).
pub fn compute_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    if !policy.exponential {
        return policy.base_delay;
    }
    let exponent = attempt.saturating_sub(1);
    let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
    policy
        .base_delay
        .checked_mul(factor)
        .unwrap_or(Duration::MAX)
        .min(policy.max_delay)
}

/// Run `operation` until it succeeds, fails fatally, or runs out of attempts.
///
/// After each failure that will be retried, the executor sleeps and then
/// emits one [`Event::RetryScheduled`]; nothing is emitted on success or on
/// the final failure.
pub async fn execute<F, Fut, T, E>(
    mut operation: F,
    policy: &RetryPolicy,
    observer: &dyn Observer,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_retryable() || attempt >= max_attempts {
                    return Err(err);
                }

                let delay = compute_delay(policy, attempt);
                sleep(delay).await;
                observer.emit(Event::RetryScheduled {
                    attempt,
                    max_attempts,
                    delay,
                    message: err.to_string(),
                });
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::observer::RecordingObserver;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(10),
            exponential: true,
            max_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_immediately() {
        let observer = RecordingObserver::new();
        let result = execute(
            || async { Ok::<_, LedgerError>(42) },
            &policy(3),
            &observer,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert!(observer.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();
        let observer = RecordingObserver::new();

        let result = execute(
            move || {
                let attempt = attempt_clone.clone();
                async move {
                    let count = attempt.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(LedgerError::transient("connection reset"))
                    } else {
                        Ok(42)
                    }
                }
            },
            &policy(3),
            &observer,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempt.load(Ordering::SeqCst), 3);
        assert_eq!(observer.events().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_max_attempts() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();
        let observer = RecordingObserver::new();

        let result = execute(
            move || {
                let attempt = attempt_clone.clone();
                async move {
                    let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
                    Err::<(), _>(LedgerError::transient(format!("failure {}", n)))
                }
            },
            &policy(3),
            &observer,
        )
        .await;

        assert_eq!(attempt.load(Ordering::SeqCst), 3);
        // The last error surfaces, not a wrapper.
        let err = result.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TransientNetwork);
        assert_eq!(err.message(), "failure 3");
        // Warnings for the two retried failures only.
        assert_eq!(
            observer.retry_delays(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_non_retryable_error_fails_immediately() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();
        let observer = RecordingObserver::new();

        let result = execute(
            move || {
                let attempt = attempt_clone.clone();
                async move {
                    attempt.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(LedgerError::remote_api(Some(404), "not found"))
                }
            },
            &policy(3),
            &observer,
        )
        .await;

        assert_eq!(
            result.unwrap_err().kind(),
            &ErrorKind::RemoteApi { status: Some(404) }
        );
        assert_eq!(attempt.load(Ordering::SeqCst), 1);
        assert!(observer.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_errors_are_retried() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();
        let observer = RecordingObserver::new();

        let result = execute(
            move || {
                let attempt = attempt_clone.clone();
                async move {
                    attempt.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "eof"))
                }
            },
            &policy(2),
            &observer,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempt.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_event_fields() {
        let observer = RecordingObserver::new();
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();

        let _ = execute(
            move || {
                let attempt = attempt_clone.clone();
                async move {
                    if attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(LedgerError::remote_api(Some(503), "unavailable"))
                    } else {
                        Ok(())
                    }
                }
            },
            &policy(4),
            &observer,
        )
        .await;

        assert_eq!(
            observer.events(),
            vec![Event::RetryScheduled {
                attempt: 1,
                max_attempts: 4,
                delay: Duration::from_millis(10),
                message: "remote API error (503): unavailable".to_string(),
            }]
        );
    }

    /// Records when each retry event arrives.
    struct TimedObserver {
        emitted_at: Mutex<Vec<Instant>>,
    }

    impl Observer for TimedObserver {
        fn emit(&self, _event: Event) {
            self.emitted_at.lock().unwrap().push(Instant::now());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_event_follows_the_sleep() {
        let observer = TimedObserver {
            emitted_at: Mutex::new(Vec::new()),
        };
        let start = Instant::now();

        let result = execute(
            || async { Err::<(), _>(LedgerError::transient("down")) },
            &policy(3),
            &observer,
        )
        .await;

        assert!(result.is_err());
        let emitted_at = observer.emitted_at.lock().unwrap().clone();
        assert_eq!(emitted_at.len(), 2);
        assert!(emitted_at[0] - start >= Duration::from_millis(10));
        assert!(emitted_at[1] - start >= Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_attempts_runs_once() {
        let attempt = Arc::new(AtomicU32::new(0));
        let attempt_clone = attempt.clone();
        let observer = RecordingObserver::new();

        let _ = execute(
            move || {
                let attempt = attempt_clone.clone();
                async move {
                    attempt.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(LedgerError::transient("down"))
                }
            },
            &policy(0),
            &observer,
        )
        .await;

        assert_eq!(attempt.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_calculation() {
        let p = policy(10);
        assert_eq!(compute_delay(&p, 1), Duration::from_millis(10));
        assert_eq!(compute_delay(&p, 2), Duration::from_millis(20));
        assert_eq!(compute_delay(&p, 3), Duration::from_millis(40));
        assert_eq!(compute_delay(&p, 4), Duration::from_millis(50)); // Capped
        assert_eq!(compute_delay(&p, 40), Duration::from_millis(50));

        let linear = RetryPolicy {
            exponential: false,
            ..p
        };
        assert_eq!(compute_delay(&linear, 1), Duration::from_millis(10));
        assert_eq!(compute_delay(&linear, 7), Duration::from_millis(10));
    }
}
