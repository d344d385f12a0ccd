//! Store port: the narrow surface the queue needs from a scored-set store.
//!
//! Four operations are enough: ZADD, DEL, SCRIPT LOAD and EVALSHA. The claim
//! step only ever goes through `run_script`, so the store is the one place
//! where mutual exclusion between workers is decided.

use async_trait::async_trait;
use std::fmt;

use crate::error::StoreError;

/// Reference to a script registered with [`Store::load_script`].
///
/// For Redis this is the script's SHA1 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHandle(String);

impl ScriptHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Add `member` to the sorted set at `key` with `score`.
    async fn insert_scored(&self, key: &str, score: f64, member: &[u8]) -> Result<(), StoreError>;

    /// Remove `key` entirely. Absent keys are not an error.
    async fn delete_key(&self, key: &str) -> Result<(), StoreError>;

    /// Register a script and return a handle usable across calls.
    async fn load_script(&self, source: &str) -> Result<ScriptHandle, StoreError>;

    /// Run a registered script atomically on the store side.
    ///
    /// `Ok(None)` is a nil reply, not a failure.
    async fn run_script(
        &self,
        script: &ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<Vec<u8>>, StoreError>;
}
