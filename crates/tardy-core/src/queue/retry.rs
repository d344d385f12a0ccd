//! Retry policy: how long a failed task waits, and when to give up.

use std::time::Duration;

use tracing::Instrument;

use super::producer::due_after;
use super::{Rescheduled, TaskQueue};
use crate::domain::Task;
use crate::error::QueueError;

/// Ceiling on reschedules after handler failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    Limited(u32),
    Unlimited,
}

impl RetryLimit {
    /// Negative means unlimited.
    pub fn from_max_retries(max_retries: i64) -> Self {
        if max_retries < 0 {
            RetryLimit::Unlimited
        } else {
            RetryLimit::Limited(u32::try_from(max_retries).unwrap_or(u32::MAX))
        }
    }

    fn exhausted_by(self, retry_count: u32) -> bool {
        match self {
            RetryLimit::Limited(max) => retry_count >= max,
            RetryLimit::Unlimited => false,
        }
    }
}

/// Outcome of applying the policy to a failed task.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Write `task` back, due `delay` from now.
    Reschedule { task: Task, delay: Duration },
    GiveUp,
}

/// Doubling backoff: `max(base_wait, 2 × previous wait)`.
///
/// Example with base_wait=1s:
/// - first failure: 1s
/// - second: 2s
/// - third: 4s
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub limit: RetryLimit,
    pub base_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: RetryLimit::Unlimited,
            base_wait: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(limit: RetryLimit, base_wait: Duration) -> Self {
        Self { limit, base_wait }
    }

    pub fn next_wait(&self, previous: Duration) -> Duration {
        previous.saturating_mul(2).max(self.base_wait)
    }

    pub fn decide(&self, task: &Task) -> RetryDecision {
        if self.limit.exhausted_by(task.retry_count) {
            return RetryDecision::GiveUp;
        }
        let wait = self.next_wait(task.wait);
        RetryDecision::Reschedule {
            task: task.next_attempt(wait),
            delay: wait,
        }
    }
}

impl TaskQueue {
    /// Put a failed task back on the schedule with doubled backoff.
    ///
    /// # Errors
    /// - `MaxRetriesExceeded` when the ceiling is reached; the task is dropped
    /// - `TaskLost` when the reschedule write fails; the task is no longer in
    ///   the store anywhere
    pub async fn retry(&self, task: &Task) -> Result<Rescheduled, QueueError> {
        let (next, delay) = match self.retry_policy.decide(task) {
            RetryDecision::Reschedule { task, delay } => (task, delay),
            RetryDecision::GiveUp => {
                return Err(QueueError::MaxRetriesExceeded {
                    task_id: task.id,
                    retry_count: task.retry_count,
                });
            }
        };

        let execute_at = due_after(self.clock.now(), delay);
        let member = next.encode()?;
        self.insert_at(&member, execute_at)
            .instrument(self.span.clone())
            .await
            .map_err(|source| QueueError::TaskLost {
                task_id: next.id,
                source,
            })?;

        Ok(Rescheduled {
            task_id: next.id,
            retry_count: next.retry_count,
            wait: next.wait,
            execute_at,
        })
    }
}
