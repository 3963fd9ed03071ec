//! Storage retry: bounded attempts, exponential backoff, prompt
//! cancellation.
//!
//! The executor is a pure combinator — the policy value is immutable and
//! nothing is carried between calls. Only errors the store classifies as
//! transient are retried; everything else surfaces immediately.

use std::future::Future;
use std::time::{Duration, Instant};

use strata_ports::StoreError;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::CacheError;

/// Retry policy for storage round-trips.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap on any single backoff delay.
    pub max_delay: Duration,
    /// Jitter factor in `[0.0, 1.0]` applied to each delay.
    pub jitter_factor: f64,
    /// Overall budget across all attempts; `Duration::ZERO` disables it.
    pub expiration: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter_factor: 0.2,
            expiration: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt bound and base delay.
    #[must_use]
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Policy tuned for persistent storage: short first delay, tight cap,
    /// bounded overall budget.
    #[must_use]
    pub fn persistence() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            jitter_factor: 0.2,
            expiration: Duration::from_secs(10),
        }
    }

    /// Set the cap on any single backoff delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the jitter factor, clamped to `[0.0, 1.0]`.
    #[must_use]
    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    /// Set the overall budget across all attempts.
    #[must_use]
    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Backoff delay before retry number `attempt` (1-based).
    fn delay_for(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(32);
        let mut delay = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exponent));

        // Deterministic attempt-derived jitter, no RNG dependency.
        if self.jitter_factor > 0.0 {
            let jitter_range = (delay.as_millis() as f64 * self.jitter_factor) as u64;
            let jitter = (attempt as u64) % (jitter_range + 1);
            delay = delay.saturating_add(Duration::from_millis(jitter));
        }

        delay.min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails permanently, exhausts the
/// policy, or the caller's cancellation fires.
///
/// Both the attempt itself and every backoff sleep race the cancellation
/// token; a fired token returns [`CacheError::Cancelled`] promptly. When
/// attempts are exhausted the last storage error is surfaced as-is.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancellation: &CancellationToken,
    mut operation: F,
) -> Result<T, CacheError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = tokio::select! {
            result = operation() => result,
            () = cancellation.cancelled() => return Err(CacheError::Cancelled),
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "storage operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() || attempt >= policy.max_attempts {
            return Err(err.into());
        }

        let delay = policy.delay_for(attempt);
        if policy.expiration > Duration::ZERO
            && started.elapsed() + delay >= policy.expiration
        {
            return Err(err.into());
        }

        warn!(
            attempt,
            max_attempts = policy.max_attempts,
            ?delay,
            error = %err,
            "transient storage failure, retrying"
        );

        tokio::select! {
            () = sleep(delay) => {}
            () = cancellation.cancelled() => return Err(CacheError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(5)).with_jitter(0.0)
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let calls = AtomicUsize::new(0);
        let result = retry(&fast_policy(3), &CancellationToken::new(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, StoreError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = retry(&fast_policy(5), &CancellationToken::new(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(StoreError::Connection("refused".into()))
            } else {
                Ok("ok")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> =
            retry(&fast_policy(5), &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::not_found("CurrentExecution", "d1/w1"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match result.unwrap_err() {
            CacheError::Store(StoreError::NotFound { .. }) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_last_error() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> =
            retry(&fast_policy(3), &CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Busy("throttled".into()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            CacheError::Store(StoreError::Busy(_)) => {}
            other => panic!("expected Busy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_during_backoff_aborts() {
        let policy = RetryPolicy::new(10, Duration::from_secs(30)).with_jitter(0.0);
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let result: Result<(), _> = retry(&policy, &token, || async {
            Err(StoreError::Connection("refused".into()))
        })
        .await;

        assert!(matches!(result.unwrap_err(), CacheError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5), "must not wait out the backoff");
    }

    #[tokio::test]
    async fn cancellation_before_call_aborts_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<(), _> = retry(&fast_policy(3), &token, || async {
            std::future::pending::<Result<(), StoreError>>().await
        })
        .await;

        assert!(matches!(result.unwrap_err(), CacheError::Cancelled));
    }

    #[tokio::test]
    async fn expiration_bounds_the_loop() {
        let policy = RetryPolicy::new(100, Duration::from_millis(20))
            .with_jitter(0.0)
            .with_expiration(Duration::from_millis(50));
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = retry(&policy, &CancellationToken::new(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Busy("throttled".into()))
        })
        .await;

        assert!(result.is_err());
        assert!(calls.load(Ordering::SeqCst) < 100);
    }

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100))
            .with_jitter(0.0)
            .with_max_delay(Duration::from_millis(350));

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(8), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_factor() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100)).with_jitter(0.5);
        for attempt in 1..=5 {
            let base = RetryPolicy::new(10, Duration::from_millis(100))
                .with_jitter(0.0)
                .delay_for(attempt);
            let jittered = policy.delay_for(attempt);
            assert!(jittered >= base);
            assert!(jittered <= base + base.mul_f64(0.5) + Duration::from_millis(1));
        }
    }

    #[test]
    fn persistence_policy_is_bounded() {
        let policy = RetryPolicy::persistence();
        assert!(policy.max_attempts >= 2);
        assert!(policy.expiration > Duration::ZERO);
        assert!(policy.max_delay >= policy.base_delay);
    }
}
