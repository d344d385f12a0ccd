//! Queue options.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::QueueError;

/// Everything needed to build a [`TaskQueue`](crate::queue::TaskQueue).
///
/// Durations are expressed in milliseconds so the options stay plain JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Logical queue; workers on the same queue share one schedule.
    pub queue_name: String,
    pub namespace: String,
    /// Identity of this worker, used for its in-progress key.
    pub worker_id: String,
    /// Store address, `host:port` or `redis://...`.
    pub storage_address: String,
    /// Negative means retry forever.
    pub max_retries: i64,
    pub operation_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Backoff for the first retry; doubled for every following one.
    pub base_wait_ms: u64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            queue_name: "default".to_string(),
            namespace: "default".to_string(),
            worker_id: "worker-0".to_string(),
            storage_address: "127.0.0.1:6379".to_string(),
            max_retries: -1,
            operation_timeout_ms: 60_000,
            poll_interval_ms: 1_000,
            base_wait_ms: 1_000,
        }
    }
}

impl QueueOptions {
    pub fn new(queue_name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn base_wait(&self) -> Duration {
        Duration::from_millis(self.base_wait_ms)
    }

    /// Load options from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            QueueError::InvalidOptions(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| QueueError::InvalidOptions(format!("cannot parse {}: {e}", path.display())))
    }

    /// Check the options before anything touches the store.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::InvalidOptions` for empty names or zero durations.
    pub fn validate(&self) -> Result<(), QueueError> {
        let names = [
            ("queue_name", &self.queue_name),
            ("namespace", &self.namespace),
            ("worker_id", &self.worker_id),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(QueueError::InvalidOptions(format!("{field} must not be empty")));
            }
            if value.contains(':') {
                return Err(QueueError::InvalidOptions(format!(
                    "{field} must not contain ':' (got {value:?})"
                )));
            }
        }
        let durations = [
            ("operation_timeout_ms", self.operation_timeout_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("base_wait_ms", self.base_wait_ms),
        ];
        for (field, value) in durations {
            if value == 0 {
                return Err(QueueError::InvalidOptions(format!("{field} must be > 0")));
            }
        }
        Ok(())
    }
}
