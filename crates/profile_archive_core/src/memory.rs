//! crates/profile_archive_core/src/memory.rs
//!
//! An in-process `KeyValueStore` with an optional byte quota. Used for
//! ephemeral runs and as the local backend in tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::ports::{KeyValueStore, StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryKeyValueStore {
    /// An unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses writes pushing the summed value length past `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Writes `value` without the quota check, e.g. to restore a snapshot
    /// that was taken under a larger limit.
    pub fn preload(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            let attempted = others + value.len();
            if attempted > quota {
                return Err(StoreError::QuotaExceeded { attempted, quota });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
