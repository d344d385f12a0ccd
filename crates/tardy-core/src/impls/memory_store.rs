//! In-memory store for tests and local development.
//!
//! Holds sorted sets and plain keys behind one async mutex. The only script it
//! can run is the queue's claim script, executed natively while the lock is
//! held, which gives the same all-or-nothing behaviour Redis gives the Lua
//! version.

use std::cmp::Ordering as CmpOrdering;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::ports::{ScriptHandle, Store};
use crate::queue::CLAIM_SCRIPT;

/// Score with a total order so it can live in a `BTreeSet`.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.total_cmp(&other.0)
    }
}

/// Sorted set with Redis ordering: by score, then by member bytes.
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<Vec<u8>, Score>,
    ordered: BTreeSet<(Score, Vec<u8>)>,
}

impl SortedSet {
    fn insert(&mut self, score: f64, member: Vec<u8>) {
        if let Some(old) = self.scores.insert(member.clone(), Score(score)) {
            self.ordered.remove(&(old, member.clone()));
        }
        self.ordered.insert((Score(score), member));
    }

    /// Remove and return the lowest-scored member if its score is `<= max`.
    fn pop_min_at_most(&mut self, max: f64) -> Option<Vec<u8>> {
        let (score, _) = self.ordered.first()?;
        if score.0 > max {
            return None;
        }
        let (_, member) = self.ordered.pop_first()?;
        self.scores.remove(&member);
        Some(member)
    }

    fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    fn entries(&self) -> Vec<(f64, Vec<u8>)> {
        self.ordered
            .iter()
            .map(|(score, member)| (score.0, member.clone()))
            .collect()
    }
}

#[derive(Debug, Default)]
struct InMemoryStoreState {
    sorted_sets: HashMap<String, SortedSet>,
    values: HashMap<String, Vec<u8>>,
    scripts: HashMap<ScriptHandle, String>,
}

impl InMemoryStoreState {
    /// Native rendition of the claim script.
    fn claim(&mut self, keys: &[String], args: &[String]) -> Result<Option<Vec<u8>>, StoreError> {
        let [schedule_key, in_progress_key] = keys else {
            return Err(StoreError::Backend(format!(
                "claim script expects 2 keys, got {}",
                keys.len()
            )));
        };
        let now = args
            .first()
            .and_then(|raw| raw.parse::<f64>().ok())
            .ok_or_else(|| StoreError::Backend(format!("claim script: bad now argument {args:?}")))?;

        let Some(schedule) = self.sorted_sets.get_mut(schedule_key) else {
            return Ok(None);
        };
        let Some(member) = schedule.pop_min_at_most(now) else {
            return Ok(None);
        };
        if schedule.is_empty() {
            self.sorted_sets.remove(schedule_key);
        }
        self.values.insert(in_progress_key.clone(), member.clone());
        Ok(Some(member))
    }
}

/// In-memory [`Store`] with fault injection switches.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<InMemoryStoreState>,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
    fail_scripts: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `insert_scored` fail until switched off.
    pub fn fail_inserts(&self, on: bool) {
        self.fail_inserts.store(on, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, on: bool) {
        self.fail_deletes.store(on, Ordering::SeqCst);
    }

    /// Make both `load_script` and `run_script` fail.
    pub fn fail_scripts(&self, on: bool) {
        self.fail_scripts.store(on, Ordering::SeqCst);
    }

    /// Members of the sorted set at `key`, lowest score first.
    pub async fn members(&self, key: &str) -> Vec<(f64, Vec<u8>)> {
        let state = self.state.lock().await;
        state
            .sorted_sets
            .get(key)
            .map(SortedSet::entries)
            .unwrap_or_default()
    }

    /// Value of the plain key `key`.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().await.values.get(key).cloned()
    }

    /// Put a plain value, bypassing fault injection.
    pub async fn set(&self, key: &str, value: &[u8]) {
        self.state
            .lock()
            .await
            .values
            .insert(key.to_string(), value.to_vec());
    }

    fn script_handle(source: &str) -> ScriptHandle {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        ScriptHandle::new(format!("{:016x}", hasher.finish()))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_scored(&self, key: &str, score: f64, member: &[u8]) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("insert_scored"));
        }
        let mut state = self.state.lock().await;
        state
            .sorted_sets
            .entry(key.to_string())
            .or_default()
            .insert(score, member.to_vec());
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("delete_key"));
        }
        let mut state = self.state.lock().await;
        state.sorted_sets.remove(key);
        state.values.remove(key);
        Ok(())
    }

    async fn load_script(&self, source: &str) -> Result<ScriptHandle, StoreError> {
        if self.fail_scripts.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("load_script"));
        }
        let handle = Self::script_handle(source);
        let mut state = self.state.lock().await;
        state.scripts.insert(handle.clone(), source.to_string());
        Ok(handle)
    }

    async fn run_script(
        &self,
        script: &ScriptHandle,
        keys: &[String],
        args: &[String],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_scripts.load(Ordering::SeqCst) {
            return Err(StoreError::Injected("run_script"));
        }
        let mut state = self.state.lock().await;
        let Some(source) = state.scripts.get(script) else {
            return Err(StoreError::NoScript(script.to_string()));
        };
        if source != CLAIM_SCRIPT {
            return Err(StoreError::Backend(
                "in-memory store only runs the claim script".to_string(),
            ));
        }
        state.claim(keys, args)
    }
}
