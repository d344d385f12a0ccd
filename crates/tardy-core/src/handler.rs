//! Task handlers: the application code the consumer loop calls.

use std::future::Future;

use async_trait::async_trait;

use crate::domain::TaskId;
use crate::error::HandlerError;

/// What a handler knows about the attempt it is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub worker_id: String,
    pub queue_name: String,
    /// 0 on the first attempt.
    pub retry_count: u32,
}

/// Handler for claimed tasks.
///
/// Delivery is at-least-once: the same `task_id` can arrive more than once,
/// so handlers must tolerate repeats.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &TaskContext,
        task_id: TaskId,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError>;
}

/// Adapter returned by [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`TaskHandler`].
///
/// ```ignore
/// let handler = handler_fn(|ctx, id, payload| async move {
///     tracing::info!(task_id = %id, worker = %ctx.worker_id, ?payload, "consumed");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(TaskContext, TaskId, serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext, TaskId, serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(
        &self,
        ctx: &TaskContext,
        task_id: TaskId,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        (self.f)(ctx.clone(), task_id, payload.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    fn ctx() -> TaskContext {
        TaskContext {
            worker_id: "w1".to_string(),
            queue_name: "q".to_string(),
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn fn_handler_passes_arguments_through() {
        let id = TaskId::from_ulid(Ulid::new());
        let handler = handler_fn(move |ctx, task_id, payload| async move {
            assert_eq!(ctx.worker_id, "w1");
            assert_eq!(task_id, id);
            assert_eq!(payload, json!({"body": "1"}));
            Ok(())
        });
        handler.handle(&ctx(), id, &json!({"body": "1"})).await.unwrap();
    }

    #[tokio::test]
    async fn fn_handler_propagates_failure() {
        let handler = handler_fn(|_, _, _| async { Err(HandlerError::new("boom")) });
        let err = handler
            .handle(&ctx(), TaskId::from_ulid(Ulid::new()), &json!(null))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "boom");
    }
}
