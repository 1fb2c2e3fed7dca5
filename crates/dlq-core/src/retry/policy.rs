//! Backoff schedule and retry/give-up decisions.

use std::time::Duration;

use super::error::ErrorKind;

/// What the scheduler should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Wait `delay`, then retry. `reset_offset` is set only for the one-time
    /// validator-changed recovery: the scheduler must discard its resume
    /// token and restart the task from byte 0 before retrying.
    Retry { delay: Duration, reset_offset: bool },
    /// Give up; the task moves to `failed`.
    NoRetry,
}

/// Stateless backoff calculator. Per-task attempt counts and the
/// validator-reset-already-used flag live in the scheduler, not here — a
/// `RetryPolicy` only turns `(attempt, kind)` into a decision.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// `attempt` is the number of attempts already made (1 after the first
    /// failure). `validator_reset_used` tells the policy whether this task
    /// already consumed its one-time validator-changed recovery.
    pub fn decide(&self, attempt: u32, kind: ErrorKind, validator_reset_used: bool) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::NetworkUnavailable | ErrorKind::ConnectionLost => RetryDecision::Retry {
                delay: self.backoff_delay(attempt),
                reset_offset: false,
            },
            ErrorKind::HttpTransient { retry_after, .. } => RetryDecision::Retry {
                delay: retry_after
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.backoff_delay(attempt)),
                reset_offset: false,
            },
            ErrorKind::ValidatorChanged => {
                if validator_reset_used {
                    RetryDecision::NoRetry
                } else {
                    RetryDecision::Retry {
                        delay: Duration::from_millis(0),
                        reset_offset: true,
                    }
                }
            }
            ErrorKind::HttpPermanent { .. }
            | ErrorKind::LocalIo
            | ErrorKind::InvalidResumeData
            | ErrorKind::Cancelled
            | ErrorKind::InternalInvariant => RetryDecision::NoRetry,
        }
    }

    /// Exponential backoff doubling from `base_delay`, capped at
    /// `max_delay`, with up to ±20% jitter so retries from many tasks don't
    /// converge on the same instant.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        let delay = (base * 2f64.powi(attempt.saturating_sub(1) as i32)).min(max);
        let jitter = delay * 0.2 * (rand::random::<f64>() - 0.5);
        let final_delay = (delay + jitter).max(0.0).round() as u64;
        Duration::from_millis(final_delay)
    }
}
