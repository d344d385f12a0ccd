//! Producer side: put tasks on the schedule.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::Instrument;

use super::TaskQueue;
use crate::domain::{Task, TaskId};
use crate::error::{QueueError, StoreError};

/// Sorted-set score for a due time: Unix seconds.
pub(super) fn score_of(execute_at: DateTime<Utc>) -> f64 {
    execute_at.timestamp() as f64
}

/// `now + delay`, clamped to the latest representable instant.
pub(super) fn due_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl TaskQueue {
    /// Schedule `payload` to become due at `execute_at`.
    ///
    /// Creates a fresh task (no retries, zero wait) and adds exactly one entry
    /// to the schedule.
    ///
    /// # Errors
    /// - `Serialization` when the payload cannot be represented as JSON
    /// - `Schedule` when the store insert fails; nothing was written
    pub async fn schedule_at<P: Serialize>(
        &self,
        payload: P,
        execute_at: DateTime<Utc>,
    ) -> Result<TaskId, QueueError> {
        let payload = serde_json::to_value(payload).map_err(QueueError::Serialization)?;
        let task = Task::new(self.ids.generate_task_id(), payload);
        let member = task.encode()?;

        self.span.in_scope(|| {
            tracing::debug!(task_id = %task.id, %execute_at, "producing task");
        });
        self.insert_at(&member, execute_at)
            .instrument(self.span.clone())
            .await
            .map_err(QueueError::Schedule)?;
        Ok(task.id)
    }

    /// Schedule `payload` to be due immediately.
    pub async fn schedule_now<P: Serialize>(&self, payload: P) -> Result<TaskId, QueueError> {
        let now = self.clock.now();
        self.schedule_at(payload, now).await
    }

    /// Schedule `payload` to be due `delay` from now.
    pub async fn schedule_in<P: Serialize>(
        &self,
        payload: P,
        delay: Duration,
    ) -> Result<TaskId, QueueError> {
        let execute_at = due_after(self.clock.now(), delay);
        self.schedule_at(payload, execute_at).await
    }

    /// Add an encoded task to the schedule, due at `execute_at`.
    pub(super) async fn insert_at(
        &self,
        member: &[u8],
        execute_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.bounded(
            self.store
                .insert_scored(self.keys.schedule(), score_of(execute_at), member),
        )
        .await
    }
}
