//! Store implementations.
//!
//! - **InMemoryStore**: tests and local development
//! - **RedisStore**: production, over a multiplexed redis connection

pub mod memory_store;
pub mod redis_store;

pub use self::memory_store::InMemoryStore;
pub use self::redis_store::RedisStore;
