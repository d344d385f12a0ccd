//! Domain model: task identity and the stored task value.

pub mod ids;
pub mod task;

pub use ids::TaskId;
pub use task::Task;
