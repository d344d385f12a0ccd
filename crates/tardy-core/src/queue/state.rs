//! Consumer state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TaskId;

/// Where a worker's loop currently is.
///
/// State transitions:
/// - Idle -> Polling -> Idle (nothing due)
/// - Idle -> Polling -> Executing -> Idle (handler succeeded)
/// - Idle -> Polling -> Executing -> Retrying -> Idle (handler failed)
/// - any -> Stopped (shutdown observed at a tick boundary)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    Idle,
    Polling,
    Executing,
    Retrying,
    Stopped,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Stopped)
    }
}

/// A failed task written back to the schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rescheduled {
    pub task_id: TaskId,
    pub retry_count: u32,
    pub wait: Duration,
    pub execute_at: DateTime<Utc>,
}

/// What one tick of the consumer loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was due.
    Empty,
    /// The claim call itself failed; nothing was taken.
    ClaimFailed,
    /// A claimed entry could not be decoded and is gone for good.
    Corrupt,
    Succeeded { task_id: TaskId },
    Retried(Rescheduled),
    /// Retry ceiling reached; the task was dropped on purpose.
    Dropped { task_id: TaskId },
    /// The handler failed and the retry could not be written.
    Lost { task_id: TaskId },
}

impl TickOutcome {
    /// True when a handler ran in this tick.
    pub fn handled(&self) -> bool {
        !matches!(
            self,
            TickOutcome::Empty | TickOutcome::ClaimFailed | TickOutcome::Corrupt
        )
    }
}
