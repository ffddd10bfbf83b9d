//! services/api/src/adapters/file_store.rs
//!
//! A `KeyValueStore` persisted as one JSON object on disk. Every write
//! rewrites the whole file through a temporary sibling and a rename, so a
//! crash leaves either the old or the new contents.
//!
//! Writes are synchronous. Inside a multi-threaded tokio runtime they run
//! through `block_in_place`, so other tasks move off the writing worker.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use profile_archive_core::ports::{KeyValueStore, StoreError, StoreResult};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

pub struct FileKeyValueStore {
    path: PathBuf,
    quota_bytes: usize,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Opens the store at `path`, creating parent directories as needed.
    /// A missing file starts empty; an unreadable one is set aside and
    /// replaced by an empty store.
    pub fn open(path: impl Into<PathBuf>, quota_bytes: usize) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error("create directory", parent, e))?;
        }

        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    let aside = path.with_extension("corrupt");
                    warn!(
                        "Local store {} is unreadable ({}); moving it to {}",
                        path.display(),
                        e,
                        aside.display()
                    );
                    fs::rename(&path, &aside).map_err(|e| io_error("set aside", &path, e))?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_error("read", &path, e)),
        };
        debug!("Opened local store {} with {} key(s)", path.display(), entries.len());

        Ok(Self {
            path,
            quota_bytes,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("local store lock poisoned".to_string()))
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let raw = serde_json::to_string(entries)
            .map_err(|e| StoreError::Backend(format!("failed to serialize local store: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| io_error("create", &tmp, e))?;
        file.write_all(raw.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| io_error("write", &tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_error("replace", &self.path, e))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        let others: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, v)| v.len())
            .sum();
        let attempted = others + value.len();
        if attempted > self.quota_bytes {
            return Err(StoreError::QuotaExceeded {
                attempted,
                quota: self.quota_bytes,
            });
        }

        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = blocking(|| self.persist(&entries)) {
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.lock()?;
        if entries.remove(key).is_some() {
            blocking(|| self.persist(&entries))?;
        }
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Backend(format!("failed to {} {}: {}", action, path.display(), e))
}
