use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::handler::TaskHandler;
use crate::queue::TaskQueue;

/// Worker group handle.
/// - one consumer loop per `TaskQueue`, all on one shutdown signal
/// - dropping the group drops `shutdown_tx`, which also stops the loops
/// - `shutdown_and_join()` waits for every loop to finish its current tick
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn one consumer loop per queue handle.
    ///
    /// Give each handle its own `worker_id`, otherwise their in-progress
    /// markers overwrite each other.
    pub fn spawn(queues: Vec<TaskQueue>, handler: Arc<dyn TaskHandler>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(queues.len());
        for queue in queues {
            let handler = Arc::clone(&handler);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                queue.consume(handler.as_ref(), rx).await;
            }));
        }

        tracing::info!(workers = joins.len(), "worker group started");
        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// A receiver on the group's shutdown signal, for companion tasks.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Stop taking new claims. Running handlers are not cancelled.
    pub fn request_shutdown(&self) {
        // every loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all loops.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "consumer loop panicked");
            }
        }
        tracing::info!("worker group stopped");
    }
}
