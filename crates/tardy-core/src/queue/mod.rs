//! Queue module: producer, atomic claim, retry/backoff and the consumer loop.
//!
//! One `TaskQueue` is one worker's handle on one logical queue. Producers and
//! consumers on the same `{namespace, queue_name}` share the schedule; each
//! worker has its own in-progress marker. Nothing is shared in process: all
//! coordination goes through the store.

mod claim;
mod consumer;
mod keys;
mod producer;
mod retry;
mod state;

pub use claim::CLAIM_SCRIPT;
pub use keys::QueueKeys;
pub use retry::{RetryDecision, RetryLimit, RetryPolicy};
pub use state::{Rescheduled, TickOutcome, WorkerState};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::Instrument;

use crate::config::QueueOptions;
use crate::error::{QueueError, StoreError};
use crate::impls::RedisStore;
use crate::observability::{ConsumerCounts, ConsumerStats};
use crate::ports::{Clock, IdGenerator, ScriptHandle, Store, SystemClock, UlidGenerator};

/// A worker's handle on a delayed, retryable queue.
///
/// Cheap to clone; clones share the store, counters and state.
#[derive(Clone)]
pub struct TaskQueue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    keys: QueueKeys,
    claim_script: ScriptHandle,
    retry_policy: RetryPolicy,
    queue_name: String,
    worker_id: String,
    operation_timeout: Duration,
    poll_interval: Duration,
    stats: Arc<ConsumerStats>,
    state: Arc<watch::Sender<WorkerState>>,
    span: tracing::Span,
}

impl TaskQueue {
    pub fn builder(options: QueueOptions) -> TaskQueueBuilder {
        TaskQueueBuilder::new(options)
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn stats(&self) -> ConsumerCounts {
        self.stats.snapshot()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watch the consumer loop move between states.
    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }

    /// Run one store call under the operation timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.operation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.operation_timeout)),
        }
    }
}

/// Wires a [`TaskQueue`] together and fails fast on bad options or a store
/// that refuses the claim script.
///
/// ```ignore
/// let queue = TaskQueue::builder(QueueOptions::new("emails", "shop"))
///     .store(Arc::new(InMemoryStore::new()))
///     .build()
///     .await?;
/// ```
pub struct TaskQueueBuilder {
    options: QueueOptions,
    store: Option<Arc<dyn Store>>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
}

impl TaskQueueBuilder {
    pub fn new(options: QueueOptions) -> Self {
        Self {
            options,
            store: None,
            clock: Arc::new(SystemClock),
            ids: None,
        }
    }

    /// Use this store instead of connecting to `storage_address`.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validate options, connect if needed, and load the claim script.
    ///
    /// # Errors
    /// - `InvalidOptions` for options that fail validation
    /// - `Connect` when no store was given and Redis is unreachable
    /// - `ScriptLoad` when the store rejects the claim script
    pub async fn build(self) -> Result<TaskQueue, QueueError> {
        let options = self.options;
        options.validate()?;

        let operation_timeout = options.operation_timeout();
        let poll_interval = options.poll_interval();
        let span = tracing::info_span!(
            "task_queue",
            namespace = %options.namespace,
            queue = %options.queue_name,
            worker = %options.worker_id,
        );

        let store: Arc<dyn Store> = match self.store {
            Some(store) => store,
            None => {
                let connect = RedisStore::connect(&options.storage_address);
                let redis = tokio::time::timeout(operation_timeout, connect)
                    .await
                    .map_err(|_| QueueError::Connect(StoreError::Timeout(operation_timeout)))?
                    .map_err(QueueError::Connect)?;
                Arc::new(redis)
            }
        };

        let claim_script = tokio::time::timeout(operation_timeout, store.load_script(CLAIM_SCRIPT))
            .instrument(span.clone())
            .await
            .map_err(|_| QueueError::ScriptLoad(StoreError::Timeout(operation_timeout)))?
            .map_err(QueueError::ScriptLoad)?;

        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&self.clock))));

        span.in_scope(|| tracing::debug!(script = %claim_script, "claim script loaded"));

        Ok(TaskQueue {
            store,
            clock: self.clock,
            ids,
            keys: QueueKeys::new(&options.namespace, &options.queue_name, &options.worker_id),
            claim_script,
            retry_policy: RetryPolicy::new(
                RetryLimit::from_max_retries(options.max_retries),
                options.base_wait(),
            ),
            queue_name: options.queue_name,
            worker_id: options.worker_id,
            operation_timeout,
            poll_interval,
            stats: Arc::new(ConsumerStats::default()),
            state: Arc::new(watch::Sender::new(WorkerState::Idle)),
            span,
        })
    }
}
