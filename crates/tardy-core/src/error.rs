use std::time::Duration;

use thiserror::Error;

use crate::domain::TaskId;

/// Failure reported by a [`Store`](crate::ports::Store) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("script not loaded: {0}")]
    NoScript(String),

    #[error("store error: {0}")]
    Backend(String),

    /// Raised by the in-memory store when a fault is switched on.
    #[error("injected fault: {0}")]
    Injected(&'static str),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::NoScriptError {
            StoreError::NoScript(err.to_string())
        } else if err.is_connection_refusal() || err.is_connection_dropped() {
            StoreError::Connection(err.to_string())
        } else if err.is_timeout() {
            StoreError::Backend(format!("timeout: {err}"))
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// Errors surfaced by [`TaskQueue`](crate::queue::TaskQueue).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to serialize task: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("failed to schedule task: {0}")]
    Schedule(#[source] StoreError),

    #[error("failed to claim task: {0}")]
    Claim(#[source] StoreError),

    /// The claimed bytes could not be decoded. The entry is already gone from
    /// the schedule, so the task is permanently lost.
    #[error("claimed task is corrupt and permanently lost: {source}")]
    CorruptTask {
        raw: Vec<u8>,
        #[source]
        source: serde_json::Error,
    },

    #[error("task {task_id} exceeded max retries ({retry_count})")]
    MaxRetriesExceeded { task_id: TaskId, retry_count: u32 },

    /// The handler failed and the retry could not be written back.
    #[error("task {task_id} lost: failed to reschedule for retry: {source}")]
    TaskLost {
        task_id: TaskId,
        #[source]
        source: StoreError,
    },

    #[error("failed to connect to store: {0}")]
    Connect(#[source] StoreError),

    #[error("failed to load claim script into store: {0}")]
    ScriptLoad(#[source] StoreError),

    #[error("invalid queue options: {0}")]
    InvalidOptions(String),
}

/// Failure signal returned by a task handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(format!("json decode: {err}"))
    }
}
