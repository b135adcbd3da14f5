//! Job context: caches shared by sequential restore executions.
//!
//! Only one restore runs at a time, so the inner lock is never contended; it
//! exists so the context can be shared behind an `Arc` with the executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one job context instance. A cache clear produces a new id.
pub type ContextId = u64;

#[derive(Debug)]
pub struct JobContext {
    id: ContextId,
    cache: Mutex<HashMap<String, Value>>,
}

impl JobContext {
    pub fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries().insert(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobContext {
    fn default() -> Self {
        Self::new()
    }
}
