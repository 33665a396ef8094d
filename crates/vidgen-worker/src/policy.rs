//! Per-type retry and time-limit policy.

use std::time::Duration;

use vidgen_models::TaskType;

use crate::error::WorkerError;

/// Retry and time-limit policy for one task type.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed beyond the first attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub backoff_base: Duration,
    /// Soft time limit, polled cooperatively by handlers
    pub soft_limit: Duration,
    /// Hard time limit, enforced by the executor
    pub hard_limit: Duration,
}

impl RetryPolicy {
    /// Policy for a task type, from its declared tier.
    ///
    /// `veo_generate` is billable and not idempotent, so it never
    /// retries. The others get two retries with exponential backoff.
    pub fn for_task_type(task_type: TaskType) -> Self {
        Self {
            max_retries: task_type.max_retries(),
            backoff_base: Duration::from_secs(task_type.backoff_base_secs()),
            soft_limit: Duration::from_secs(task_type.soft_limit_secs()),
            hard_limit: Duration::from_secs(task_type.hard_limit_secs()),
        }
    }

    /// Backoff delay before dispatching `next_attempt` (1-based for
    /// the first retry). Doubles each retry: base, 2x base, 4x base...
    pub fn backoff_delay(&self, next_attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(next_attempt.saturating_sub(1)))
    }

    /// Decide whether a failed attempt should be re-dispatched.
    ///
    /// `attempt` is 0-based (0 = first dispatch). Only transient
    /// errors count; permanent errors, timeouts and observed
    /// cancellation never retry.
    pub fn should_retry(&self, error: &WorkerError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }
}
