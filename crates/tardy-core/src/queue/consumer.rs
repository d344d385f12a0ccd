//! Consumer loop: one claim per tick, run the handler, retry on failure.
//!
//! Every per-tick error is logged and counted here; none of them stops the
//! loop. Only the shutdown signal does, and only between ticks.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use super::{TaskQueue, TickOutcome, WorkerState};
use crate::domain::TaskId;
use crate::error::{HandlerError, QueueError};
use crate::handler::{TaskContext, TaskHandler};

impl TaskQueue {
    /// Poll until `shutdown` turns `true` (or its sender is dropped).
    ///
    /// A running handler is never interrupted: shutdown is observed while
    /// waiting for the next tick and before each claim.
    pub async fn consume(&self, handler: &dyn TaskHandler, mut shutdown: watch::Receiver<bool>) {
        async {
            tracing::info!(
                poll_interval_ms = self.poll_interval.as_millis() as u64,
                "consumer started"
            );
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ = ticker.tick() => {}
                }

                if *shutdown.borrow() {
                    break;
                }
                let outcome = self.tick_inner(handler).await;
                tracing::trace!(handled = outcome.handled(), ?outcome, "tick finished");
            }

            self.set_state(WorkerState::Stopped);
            tracing::info!("stopping");
        }
        .instrument(self.span.clone())
        .await
    }

    /// Run exactly one iteration: claim, handle, and retry or clear.
    pub async fn tick(&self, handler: &dyn TaskHandler) -> TickOutcome {
        self.tick_inner(handler).instrument(self.span.clone()).await
    }

    async fn tick_inner(&self, handler: &dyn TaskHandler) -> TickOutcome {
        self.stats.record_poll();
        self.set_state(WorkerState::Polling);

        let task = match self.claim_due().await {
            Ok(Some(task)) => task,
            Ok(None) => {
                self.stats.record_empty();
                self.set_state(WorkerState::Idle);
                return TickOutcome::Empty;
            }
            Err(QueueError::CorruptTask { raw, source }) => {
                // The marker still holds the raw bytes; leave it for diagnosis.
                self.stats.record_corrupt();
                tracing::error!(
                    data_loss = true,
                    bytes = raw.len(),
                    error = %source,
                    "failed to unmarshal task and permanently lost it"
                );
                self.set_state(WorkerState::Idle);
                return TickOutcome::Corrupt;
            }
            Err(err) => {
                self.stats.record_claim_error();
                tracing::error!(error = %err, "failed to get task");
                self.set_state(WorkerState::Idle);
                return TickOutcome::ClaimFailed;
            }
        };

        self.stats.record_claimed();
        self.set_state(WorkerState::Executing);
        let ctx = TaskContext {
            worker_id: self.worker_id.clone(),
            queue_name: self.queue_name.clone(),
            retry_count: task.retry_count,
        };
        tracing::debug!(task_id = %task.id, retry_count = task.retry_count, "consuming task");

        // A panicking handler counts as a failed attempt.
        let attempt = AssertUnwindSafe(handler.handle(&ctx, task.id, &task.payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let err = HandlerError::new(format!("handler panicked: {}", panic_message(&*panic)));
                tracing::error!(task_id = %task.id, error = %err, "handler panicked");
                Err(err)
            });

        let outcome = match attempt {
            Ok(()) => {
                self.stats.record_succeeded();
                tracing::debug!(task_id = %task.id, "successfully consumed task");
                TickOutcome::Succeeded { task_id: task.id }
            }
            Err(err) => {
                tracing::debug!(
                    task_id = %task.id,
                    error = %err,
                    "failed to consume, retrying after backoff"
                );
                self.set_state(WorkerState::Retrying);
                match self.retry(&task).await {
                    Ok(rescheduled) => {
                        self.stats.record_retried();
                        tracing::info!(
                            task_id = %task.id,
                            retry_count = rescheduled.retry_count,
                            wait_ms = rescheduled.wait.as_millis() as u64,
                            execute_at = %rescheduled.execute_at,
                            "task rescheduled"
                        );
                        TickOutcome::Retried(rescheduled)
                    }
                    Err(QueueError::MaxRetriesExceeded { retry_count, .. }) => {
                        self.stats.record_dropped();
                        tracing::error!(
                            task_id = %task.id,
                            retry_count,
                            error = %err,
                            "task exceeded max retries and was dropped"
                        );
                        TickOutcome::Dropped { task_id: task.id }
                    }
                    Err(retry_err) => {
                        self.stats.record_lost();
                        tracing::error!(
                            task_id = %task.id,
                            data_loss = true,
                            error = %retry_err,
                            handler_error = %err,
                            "failed to run consume func and failed to enqueue it for retry"
                        );
                        TickOutcome::Lost { task_id: task.id }
                    }
                }
            }
        };

        self.clear_in_progress(task.id).await;
        self.set_state(WorkerState::Idle);
        outcome
    }

    /// Best effort: a failure is logged and never blocks the loop.
    async fn clear_in_progress(&self, task_id: TaskId) {
        if let Err(err) = self
            .bounded(self.store.delete_key(self.keys.in_progress()))
            .await
        {
            tracing::warn!(
                task_id = %task_id,
                error = %err,
                "failed to delete worker in progress task, might duplicate if worker restart now"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
