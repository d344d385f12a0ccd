//! tardy-core
//!
//! Delayed, retryable task queue on top of a scored-set store (Redis).
//!
//! # Modules
//! - **domain**: `Task`, `TaskId`, wire encoding
//! - **ports**: `Store`, `Clock`, `IdGenerator`
//! - **impls**: `InMemoryStore` (tests), `RedisStore` (production)
//! - **queue**: `TaskQueue`: producer, atomic claim, retry/backoff, consumer loop
//! - **handler**: `TaskHandler` and the closure adapter
//! - **worker**: `WorkerGroup`, many consumer loops on one shutdown signal
//! - **config**: `QueueOptions`
//! - **observability**: per-worker counters
//! - **error**: error types
//!
//! # Lifecycle
//! scheduled → claimed → executing → {completed | retried | lost}
//!
//! Delivery is at-least-once. A worker that dies between claim and completion
//! leaves its task under its in-progress key, not on the schedule.

pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod worker;

pub use config::QueueOptions;
pub use domain::{Task, TaskId};
pub use error::{HandlerError, QueueError, StoreError};
pub use handler::{TaskContext, TaskHandler, handler_fn};
pub use queue::{TaskQueue, TaskQueueBuilder, TickOutcome, WorkerState};
pub use worker::WorkerGroup;
