//! Redis-backed store.
//!
//! Uses one multiplexed connection shared by every clone. Loaded script
//! sources are remembered so a `NOSCRIPT` reply (server restart, `SCRIPT
//! FLUSH`) can be answered by reloading and retrying once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::error::StoreError;
use crate::ports::{ScriptHandle, Store};

#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    scripts: Arc<RwLock<HashMap<ScriptHandle, String>>>,
}

impl RedisStore {
    /// Connect to `address`, either a `redis://` URL or a bare `host:port`.
    pub async fn connect(address: &str) -> Result<Self, StoreError> {
        let url = if address.contains("://") {
            address.to_string()
        } else {
            format!("redis://{address}")
        };
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        tracing::debug!(address = %address, "connected to redis");
        Ok(Self {
            conn,
            scripts: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    async fn eval_sha(
        &self,
        script: &ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("EVALSHA");
        cmd.arg(script.as_str()).arg(keys.len());
        for key in keys {
            cmd.arg(key);
        }
        for arg in args {
            cmd.arg(arg);
        }
        let reply: Option<Vec<u8>> = cmd.query_async(&mut conn).await?;
        Ok(reply)
    }

    fn known_source(&self, script: &ScriptHandle) -> Option<String> {
        self.scripts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(script)
            .cloned()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn insert_scored(&self, key: &str, score: f64, member: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member.to_vec())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn load_script(&self, source: &str) -> Result<ScriptHandle, StoreError> {
        let mut conn = self.conn.clone();
        let sha: String = redis::cmd("SCRIPT")
            .arg("LOAD")
            .arg(source)
            .query_async(&mut conn)
            .await?;
        let handle = ScriptHandle::new(sha);
        self.scripts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(handle.clone(), source.to_string());
        Ok(handle)
    }

    async fn run_script(
        &self,
        script: &ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        match self.eval_sha(script, keys, args).await {
            Err(StoreError::NoScript(msg)) => {
                let Some(source) = self.known_source(script) else {
                    return Err(StoreError::NoScript(msg));
                };
                tracing::warn!(script = %script, "script missing from redis, reloading");
                let reloaded = self.load_script(&source).await?;
                self.eval_sha(&reloaded, keys, args).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CLAIM_SCRIPT;

    fn redis_url() -> String {
        std::env::var("TARDY_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running redis (set TARDY_REDIS_URL)"]
    async fn claim_script_round_trip_against_redis() {
        let store = RedisStore::connect(&redis_url()).await.unwrap();
        let suffix = ulid::Ulid::new().to_string();
        let schedule = format!("tardy-test:{suffix}:tasks");
        let in_progress = format!("tardy-test:{suffix}:in-progress");
        let keys = vec![schedule.clone(), in_progress.clone()];

        let handle = store.load_script(CLAIM_SCRIPT).await.unwrap();
        store.insert_scored(&schedule, 100.0, b"due").await.unwrap();
        store.insert_scored(&schedule, 200.0, b"later").await.unwrap();

        let early = store.run_script(&handle, &keys, &["50".to_string()]).await.unwrap();
        assert_eq!(early, None);

        let due = store.run_script(&handle, &keys, &["150".to_string()]).await.unwrap();
        assert_eq!(due.as_deref(), Some(&b"due"[..]));

        store.delete_key(&schedule).await.unwrap();
        store.delete_key(&in_progress).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a running redis (set TARDY_REDIS_URL)"]
    async fn reloads_script_after_flush() {
        let store = RedisStore::connect(&redis_url()).await.unwrap();
        let handle = store.load_script(CLAIM_SCRIPT).await.unwrap();

        let mut conn = store.conn.clone();
        let _: () = redis::cmd("SCRIPT").arg("FLUSH").query_async(&mut conn).await.unwrap();

        let keys = vec!["tardy-test:empty".to_string(), "tardy-test:empty:wip".to_string()];
        let reply = store.run_script(&handle, &keys, &["0".to_string()]).await.unwrap();
        assert_eq!(reply, None);
    }
}
