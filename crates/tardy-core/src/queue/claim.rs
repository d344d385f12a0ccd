//! Atomic claim of the next due task.
//!
//! Finding the earliest due entry, removing it from the schedule and writing
//! the in-progress marker happen inside one store-side script. Two workers
//! can never walk away with the same entry, and a claimed entry is never
//! visible in the schedule again. The client must not split these steps
//! into separate calls.

use tracing::Instrument;

use super::TaskQueue;
use crate::domain::Task;
use crate::error::QueueError;

/// Claim script, `KEYS = [schedule, in_progress]`, `ARGV = [now]`.
///
/// Returns the claimed member, or nil when nothing is due.
pub const CLAIM_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #due == 0 then
  return false
end
local task = due[1]
redis.call('ZREM', KEYS[1], task)
redis.call('SET', KEYS[2], task)
return task
"#;

impl TaskQueue {
    /// Claim the task with the lowest due time that is `<= now`.
    ///
    /// `Ok(None)` means nothing is due. That is the normal empty-queue case.
    ///
    /// # Errors
    /// - `Claim` when the store call fails; nothing was taken
    /// - `CorruptTask` when the claimed bytes do not decode; the entry is
    ///   already out of the schedule and cannot safely be put back
    pub async fn claim(&self) -> Result<Option<Task>, QueueError> {
        self.claim_due().instrument(self.span.clone()).await
    }

    pub(super) async fn claim_due(&self) -> Result<Option<Task>, QueueError> {
        let now = self.clock.now().timestamp();
        let keys = [
            self.keys.schedule().to_string(),
            self.keys.in_progress().to_string(),
        ];
        let args = [now.to_string()];

        tracing::debug!(now, "fetching task to execute");
        let reply = self
            .bounded(self.store.run_script(&self.claim_script, &keys, &args))
            .await
            .map_err(QueueError::Claim)?;

        let Some(raw) = reply else {
            tracing::debug!("no tasks to execute");
            return Ok(None);
        };
        Task::decode(&raw).map(Some)
    }
}
