//! In-memory store, optionally starting out in the pending state.

use crate::{validate_key, KvStore, LoadOutcome};
use async_trait::async_trait;
use gm_core::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Debug)]
pub struct MemoryKvStore {
    inner: RwLock<HashMap<String, Vec<u8>>>,
    ready: AtomicBool,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            ready: AtomicBool::new(true),
        }
    }

    /// A store whose loads report `Pending` until [`mark_ready`] is called.
    ///
    /// [`mark_ready`]: MemoryKvStore::mark_ready
    pub fn pending() -> Self {
        Self {
            ready: AtomicBool::new(false),
            ..Self::new()
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn with_entry(self, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.inner.write().unwrap().insert(key.to_string(), value.into());
        self
    }

    /// Raw bytes currently stored under `key`.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.read().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn load(&self, key: &str) -> Result<LoadOutcome> {
        validate_key(key)?;
        if !self.ready.load(Ordering::SeqCst) {
            return Ok(LoadOutcome::Pending);
        }
        Ok(match self.inner.read().unwrap().get(key) {
            Some(data) => LoadOutcome::Found(data.clone()),
            None => LoadOutcome::NotFound,
        })
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        self.inner.write().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.write().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.inner.read().unwrap().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
