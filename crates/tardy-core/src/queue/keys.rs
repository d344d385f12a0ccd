//! Store key layout.
//!
//! - schedule:    `taskqueue:{namespace}:tasks:{queue}`
//! - in-progress: `taskqueue:{namespace}:workers:{worker_id}:tasks:{queue}`
//!
//! Many queues and many workers can share one store without collisions.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    schedule: String,
    in_progress: String,
}

impl QueueKeys {
    pub fn new(namespace: &str, queue_name: &str, worker_id: &str) -> Self {
        Self {
            schedule: format!("taskqueue:{namespace}:tasks:{queue_name}"),
            in_progress: format!("taskqueue:{namespace}:workers:{worker_id}:tasks:{queue_name}"),
        }
    }

    /// Sorted set of pending tasks scored by due time.
    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    /// This worker's in-progress marker.
    pub fn in_progress(&self) -> &str {
        &self.in_progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        let keys = QueueKeys::new("simple", "dummy-consumer", "worker1");
        assert_eq!(keys.schedule(), "taskqueue:simple:tasks:dummy-consumer");
        assert_eq!(
            keys.in_progress(),
            "taskqueue:simple:workers:worker1:tasks:dummy-consumer"
        );
    }

    #[test]
    fn workers_share_schedule_but_not_marker() {
        let a = QueueKeys::new("ns", "q", "a");
        let b = QueueKeys::new("ns", "q", "b");
        assert_eq!(a.schedule(), b.schedule());
        assert_ne!(a.in_progress(), b.in_progress());
    }
}
