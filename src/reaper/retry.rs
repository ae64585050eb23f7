//! Optimistic-concurrency retry combinator.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Result of one attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    Done(T),
    /// Lost a concurrent write; worth retrying.
    Conflict(E),
    /// Not retryable.
    Fatal(E),
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    /// Every attempt hit a conflict.
    Exhausted { attempts: u32, error: E },
    Failed { attempts: u32, error: E },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. }
            | RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Bounded retry with exponential backoff between conflicting attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimisticRetry {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
}

impl Default for OptimisticRetry {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(50), 2.0)
    }
}

impl OptimisticRetry {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the `attempt`-th conflict (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        self.base_delay.mul_f64(self.multiplier.max(1.0).powi(exponent))
    }

    /// `delay_for` plus up to half of it again, so racing writers spread out.
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        let spread = u64::try_from(delay.as_millis() / 2).unwrap_or(u64::MAX);
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::rng().random_range(0..=spread))
    }

    /// Run `operation` until it is done, fails fatally or runs out of attempts.
    /// The closure receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Attempt::Done(value) => {
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    };
                }
                Attempt::Fatal(error) => {
                    return RetryOutcome::Failed {
                        attempts: attempt,
                        error,
                    };
                }
                Attempt::Conflict(error) => {
                    if attempt >= self.max_attempts {
                        return RetryOutcome::Exhausted {
                            attempts: attempt,
                            error,
                        };
                    }
                    tokio::time::sleep(self.jittered_delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows() {
        let retry = OptimisticRetry::new(3, Duration::from_millis(50), 2.0);
        assert_eq!(retry.delay_for(1), Duration::from_millis(50));
        assert_eq!(retry.delay_for(2), Duration::from_millis(100));
        assert_eq!(retry.delay_for(3), Duration::from_millis(200));
    }

    #[test]
    fn test_jitter_stays_within_half_delay() {
        let retry = OptimisticRetry::new(3, Duration::from_millis(50), 2.0);
        for _ in 0..32 {
            let delay = retry.jittered_delay(2);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_conflicts() {
        let retry = OptimisticRetry::default();
        let outcome: RetryOutcome<&str, &str> = retry
            .run(|attempt| async move {
                if attempt < 3 {
                    Attempt::Conflict("stale")
                } else {
                    Attempt::Done("ok")
                }
            })
            .await;

        assert!(matches!(outcome, RetryOutcome::Succeeded { value: "ok", attempts: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let retry = OptimisticRetry::new(3, Duration::from_millis(10), 2.0);
        let outcome: RetryOutcome<(), &str> =
            retry.run(|_| async { Attempt::Conflict("stale") }).await;

        assert!(matches!(outcome, RetryOutcome::Exhausted { attempts: 3, error: "stale" }));
    }

    #[tokio::test]
    async fn test_fatal_stops_immediately() {
        let retry = OptimisticRetry::default();
        let mut calls = 0;
        let outcome: RetryOutcome<(), &str> = retry
            .run(|_| {
                calls += 1;
                async { Attempt::Fatal("broken") }
            })
            .await;

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts(), 1);
        assert!(matches!(outcome, RetryOutcome::Failed { .. }));
    }
}
