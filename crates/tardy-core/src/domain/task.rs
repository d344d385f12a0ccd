use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::TaskId;
use crate::error::QueueError;

/// A unit of work as it is stored in the schedule.
///
/// The store never looks inside: a task travels as one JSON blob. Every
/// retry writes a *new* value carrying the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub payload: serde_json::Value,
    /// Number of times the task has been rescheduled after a failure.
    pub retry_count: u32,
    /// Backoff used for the last reschedule (zero before the first retry).
    pub wait: Duration,
}

impl Task {
    /// A fresh task: no retries yet, no backoff.
    pub fn new(id: TaskId, payload: serde_json::Value) -> Self {
        Self {
            id,
            payload,
            retry_count: 0,
            wait: Duration::ZERO,
        }
    }

    /// The value that replaces this task after a failed attempt.
    pub fn next_attempt(&self, wait: Duration) -> Self {
        Self {
            id: self.id,
            payload: self.payload.clone(),
            retry_count: self.retry_count.saturating_add(1),
            wait,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, QueueError> {
        serde_json::to_vec(self).map_err(QueueError::Serialization)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, QueueError> {
        serde_json::from_slice(raw).map_err(|source| QueueError::CorruptTask {
            raw: raw.to_vec(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use ulid::Ulid;

    #[rstest]
    #[case(json!({"body": "1"}), 0, Duration::ZERO)]
    #[case(json!(null), 3, Duration::from_secs(4))]
    #[case(json!([1, "two", {"three": 3.5}]), 17, Duration::from_millis(1500))]
    fn encode_decode_preserves_every_field(
        #[case] payload: serde_json::Value,
        #[case] retry_count: u32,
        #[case] wait: Duration,
    ) {
        let task = Task {
            id: TaskId::from_ulid(Ulid::new()),
            payload,
            retry_count,
            wait,
        };
        let decoded = Task::decode(&task.encode().unwrap()).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn decode_garbage_is_corrupt_task() {
        let err = Task::decode(b"{not json").unwrap_err();
        match err {
            QueueError::CorruptTask { raw, .. } => assert_eq!(raw, b"{not json".to_vec()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn next_attempt_keeps_identity_and_bumps_count() {
        let task = Task::new(TaskId::from_ulid(Ulid::new()), json!({"body": "1"}));
        let next = task.next_attempt(Duration::from_secs(1));
        assert_eq!(next.id, task.id);
        assert_eq!(next.payload, task.payload);
        assert_eq!(next.retry_count, 1);
        assert_eq!(next.wait, Duration::from_secs(1));
    }
}
