//! Bounded retry combinator used around model calls whose output fails to parse.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// `base * 2^(retry - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

/// Backoff shape named in configuration; the delay comes from `NORMALIZE_BACKOFF_MS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    None,
    Fixed,
    Exponential,
}

#[derive(Debug, Error)]
#[error("unknown backoff '{0}', expected none, fixed or exponential")]
pub struct UnknownBackoff(String);

impl FromStr for BackoffStrategy {
    type Err = UnknownBackoff;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(BackoffStrategy::None),
            "fixed" => Ok(BackoffStrategy::Fixed),
            "exponential" => Ok(BackoffStrategy::Exponential),
            _ => Err(UnknownBackoff(raw.to_string())),
        }
    }
}

impl Backoff {
    pub fn from_strategy(strategy: BackoffStrategy, delay: Duration) -> Self {
        match strategy {
            BackoffStrategy::None => Backoff::None,
            BackoffStrategy::Fixed => Backoff::Fixed(delay),
            BackoffStrategy::Exponential => Backoff::Exponential {
                base: delay,
                max: delay.saturating_mul(8),
            },
        }
    }

    /// Delay before retry number `retry` (1 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// No retry is started once this much time has passed since the first attempt.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(4),
            },
            max_elapsed: Some(Duration::from_secs(90)),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.normalize_max_attempts,
            backoff: Backoff::from_strategy(
                config.normalize_backoff,
                Duration::from_millis(config.normalize_backoff_ms),
            ),
            max_elapsed: Some(Duration::from_secs(config.normalize_max_elapsed_secs)),
        }
    }
}

/// How one attempt failed.
#[derive(Debug)]
pub enum AttemptError<E> {
    /// Worth another try (malformed model output).
    Retryable(E),
    /// Stop immediately (the model call itself failed).
    Fatal(E),
}

#[derive(Debug)]
pub enum RetryError<E> {
    Exhausted { attempts: u32, last: E },
    Fatal(E),
}

/// Runs `op` until it succeeds, fails fatally, or the policy is spent.
/// `op` receives the 1-based attempt number.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError<E>>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let started = Instant::now();
    let mut attempt = 1;

    loop {
        let last = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(err)) => return Err(RetryError::Fatal(err)),
            Err(AttemptError::Retryable(err)) => err,
        };

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last,
            });
        }

        let delay = policy.backoff.delay_for(attempt);
        if let Some(budget) = policy.max_elapsed {
            if started.elapsed() + delay >= budget {
                warn!(
                    "Attempt {}/{} failed ({}); retry budget of {}s spent, giving up",
                    attempt,
                    max_attempts,
                    last,
                    budget.as_secs()
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last,
                });
            }
        }

        warn!(
            "Attempt {}/{} failed ({}), retrying after {}ms...",
            attempt,
            max_attempts,
            last,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(3),
        };
        assert_eq!(backoff.delay_for(1), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(3));
        assert_eq!(backoff.delay_for(60), Duration::from_secs(3));
    }

    #[test]
    fn test_fixed_and_none_backoff() {
        assert_eq!(
            Backoff::Fixed(Duration::from_millis(250)).delay_for(5),
            Duration::from_millis(250)
        );
        assert_eq!(Backoff::None.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn test_backoff_from_configured_strategy() {
        let delay = Duration::from_millis(200);
        assert_eq!(
            Backoff::from_strategy(BackoffStrategy::Fixed, delay),
            Backoff::Fixed(delay)
        );
        assert_eq!(
            Backoff::from_strategy(BackoffStrategy::None, delay),
            Backoff::None
        );
        assert_eq!(
            Backoff::from_strategy(BackoffStrategy::Exponential, delay).delay_for(10),
            Duration::from_millis(1600)
        );
        assert_eq!(" FIXED ".parse::<BackoffStrategy>().unwrap(), BackoffStrategy::Fixed);
        assert!("jitter".parse::<BackoffStrategy>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Cell::new(0);
        let result: Result<&str, RetryError<String>> =
            run_with_retry(&RetryPolicy::default(), |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err(AttemptError::Retryable(format!("bad output #{attempt}")))
                    } else {
                        Ok("parsed")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "parsed");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_op_terminates_within_budget() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            max_attempts: 4,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
            max_elapsed: None,
        };
        let result: Result<(), _> = run_with_retry(&policy, |_| {
            calls.set(calls.get() + 1);
            async { Err(AttemptError::Retryable("still prose")) }
        })
        .await;
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last, "still prose");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = run_with_retry(&RetryPolicy::default(), |_| {
            calls.set(calls.get() + 1);
            async { Err(AttemptError::Fatal("quota exceeded")) }
        })
        .await;
        assert!(matches!(result, Err(RetryError::Fatal("quota exceeded"))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_budget_stops_retries_early() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff: Backoff::Fixed(Duration::from_secs(20)),
            max_elapsed: Some(Duration::from_secs(30)),
        };
        let result: Result<(), _> = run_with_retry(&policy, |_| {
            calls.set(calls.get() + 1);
            async { Err(AttemptError::Retryable("nope")) }
        })
        .await;
        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 2, .. })
        ));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_runs_once() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            max_attempts: 0,
            backoff: Backoff::None,
            max_elapsed: None,
        };
        let _: Result<(), _> = run_with_retry(&policy, |_| {
            calls.set(calls.get() + 1);
            async { Err(AttemptError::Retryable("x")) }
        })
        .await;
        assert_eq!(calls.get(), 1);
    }
}
