//! crates/profile_archive_core/src/local_store.rs
//!
//! CRUD for the session collection kept in a `KeyValueStore`, with the
//! capacity policy applied on every read and write. The collection lives under
//! a single key as a JSON array, newest first, payloads always compressed.
//!
//! Read-modify-write is not guarded: concurrent writers to the same store
//! (another process, another tab) race and the last writer wins.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capacity::{current_usage_bytes, evict_to, CapacityPolicy, StorageUsage};
use crate::domain::{merge_metadata, Metadata, Session, SessionId};
use crate::ports::{KeyValueStore, StoreError, StoreResult};

/// Key holding the session collection.
pub const SESSIONS_KEY: &str = "profile_sessions";
/// Key holding the crawler API credential.
pub const API_KEY_KEY: &str = "crawler_api_key";
const OVERRIDE_PREFIX: &str = "override:";

/// Result of reading the collection.
#[derive(Debug, Clone)]
pub struct LocalListing {
    pub sessions: Vec<Session>,
    /// Sessions dropped by proactive eviction during this read.
    pub evicted: usize,
    /// The stored collection was unreadable and has been discarded.
    pub reset: bool,
}

#[derive(Debug, Clone)]
pub struct LocalSaveOutcome {
    pub session: Session,
    pub evicted: usize,
    /// The first write overflowed and the aggressive retry was needed.
    pub emergency: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Clone)]
pub struct LocalSessionStore {
    store: Arc<dyn KeyValueStore>,
    policy: CapacityPolicy,
}

impl LocalSessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: CapacityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &CapacityPolicy {
        &self.policy
    }

    //=====================================================================================
    // Session collection
    //=====================================================================================

    /// Reads the collection. Near the quota it trims to the proactive keep
    /// count and writes the trimmed list back before returning it.
    pub fn list(&self) -> StoreResult<LocalListing> {
        let (sessions, reset) = self.read_collection()?;
        let usage = current_usage_bytes(self.store.as_ref())?;

        if self.policy.is_near_quota(usage) && sessions.len() > self.policy.proactive_keep {
            let before = sessions.len();
            let kept = evict_to(sessions, self.policy.proactive_keep);
            self.write_collection(&kept)?;
            info!(
                "Local storage at {} bytes; evicted {} older session(s)",
                usage,
                before - kept.len()
            );
            return Ok(LocalListing {
                evicted: before - kept.len(),
                sessions: kept,
                reset,
            });
        }

        Ok(LocalListing {
            sessions,
            evicted: 0,
            reset,
        })
    }

    /// The collection as stored. Never evicts; an unreadable collection is
    /// still discarded and reported through `reset`.
    pub fn sessions(&self) -> StoreResult<LocalListing> {
        let (sessions, reset) = self.read_collection()?;
        Ok(LocalListing {
            sessions,
            evicted: 0,
            reset,
        })
    }

    pub fn find(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        let (sessions, _) = self.read_collection()?;
        Ok(sessions.into_iter().find(|s| s.matches(id)))
    }

    /// Stores `session` at the head of the collection under a fresh local id.
    ///
    /// Evicts down to the proactive keep count when the store is nearly full,
    /// always enforces the hard session cap, and on a quota failure retries
    /// exactly once keeping only the new session and the emergency keep count.
    pub fn save(&self, mut session: Session) -> StoreResult<LocalSaveOutcome> {
        let (mut existing, _) = self.read_collection()?;
        session.id = SessionId::Local(next_local_id(&existing));
        session.remote_copy = None;

        let mut evicted = 0;
        let usage = current_usage_bytes(self.store.as_ref())?;
        if self.policy.is_near_quota(usage) {
            let before = existing.len();
            existing = evict_to(existing, self.policy.proactive_keep);
            evicted += before - existing.len();
        }

        let before = existing.len();
        let mut retained = evict_to(existing, self.policy.max_sessions.saturating_sub(1));
        evicted += before - retained.len();
        retained.insert(0, session.clone());

        match self.write_collection(&retained) {
            Ok(()) => Ok(LocalSaveOutcome {
                session,
                evicted,
                emergency: false,
            }),
            Err(StoreError::QuotaExceeded { attempted, quota }) => {
                warn!(
                    "Session write of {} bytes exceeded the {} byte quota; retrying with fewer sessions",
                    attempted, quota
                );
                let before = retained.len();
                retained.truncate(1 + self.policy.emergency_keep);
                evicted += before - retained.len();
                self.write_collection(&retained)?;
                Ok(LocalSaveOutcome {
                    session,
                    evicted,
                    emergency: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Removes every record named by `id`, including local copies of a
    /// migrated remote session.
    pub fn delete(&self, id: &SessionId) -> StoreResult<DeleteOutcome> {
        let (sessions, _) = self.read_collection()?;
        let before = sessions.len();
        let remaining: Vec<Session> = sessions.into_iter().filter(|s| !s.matches(id)).collect();
        if remaining.len() == before {
            return Ok(DeleteOutcome::NotFound);
        }
        self.write_collection(&remaining)?;
        Ok(DeleteOutcome::Deleted)
    }

    /// Shallow-merges `patch` into the matching session's metadata.
    /// Returns `false`, without writing, when nothing matched.
    pub fn update_metadata(&self, id: &SessionId, patch: Metadata) -> StoreResult<bool> {
        let (mut sessions, _) = self.read_collection()?;
        let Some(session) = sessions.iter_mut().find(|s| s.matches(id)) else {
            return Ok(false);
        };
        merge_metadata(&mut session.metadata, patch);
        session.updated_at = Some(Utc::now());
        self.write_collection(&sessions)?;
        Ok(true)
    }

    /// Records that the local session `id` now also exists remotely as `remote_id`.
    pub fn mark_copied(&self, id: &SessionId, remote_id: Uuid) -> StoreResult<bool> {
        let (mut sessions, _) = self.read_collection()?;
        let Some(session) = sessions.iter_mut().find(|s| s.id == *id) else {
            return Ok(false);
        };
        session.remote_copy = Some(remote_id);
        self.write_collection(&sessions)?;
        Ok(true)
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.store.remove(SESSIONS_KEY)
    }

    pub fn usage(&self) -> StoreResult<StorageUsage> {
        let (sessions, _) = self.read_collection()?;
        Ok(StorageUsage {
            used_bytes: current_usage_bytes(self.store.as_ref())?,
            session_count: sessions.len(),
            quota_bytes: self.policy.quota_bytes,
        })
    }

    fn read_collection(&self) -> StoreResult<(Vec<Session>, bool)> {
        let Some(raw) = self.store.get(SESSIONS_KEY)? else {
            return Ok((Vec::new(), false));
        };
        match serde_json::from_str::<Vec<Session>>(&raw) {
            Ok(sessions) => Ok((sessions, false)),
            Err(e) => {
                warn!("Discarding unreadable local session collection: {}", e);
                self.store.remove(SESSIONS_KEY)?;
                Ok((Vec::new(), true))
            }
        }
    }

    fn write_collection(&self, sessions: &[Session]) -> StoreResult<()> {
        let raw = serde_json::to_string(sessions)
            .map_err(|e| StoreError::Backend(format!("failed to serialize sessions: {}", e)))?;
        self.store.set(SESSIONS_KEY, &raw)
    }

    //=====================================================================================
    // Side values
    //=====================================================================================

    pub fn api_key(&self) -> StoreResult<Option<String>> {
        self.store.get(API_KEY_KEY)
    }

    pub fn set_api_key(&self, key: &str) -> StoreResult<()> {
        self.store.set(API_KEY_KEY, key.trim())
    }

    pub fn clear_api_key(&self) -> StoreResult<()> {
        self.store.remove(API_KEY_KEY)
    }

    pub fn field_override(&self, session: &SessionId, field: &str) -> StoreResult<Option<String>> {
        self.store.get(&override_key(session, field))
    }

    pub fn set_field_override(&self, session: &SessionId, field: &str, value: &str) -> StoreResult<()> {
        self.store.set(&override_key(session, field), value)
    }

    /// Drops every override stored for `session`, returning how many there were.
    pub fn clear_overrides(&self, session: &SessionId) -> StoreResult<usize> {
        let prefix = override_key(session, "");
        let keys: Vec<String> = self
            .store
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(&prefix))
            .collect();
        for key in &keys {
            self.store.remove(key)?;
        }
        Ok(keys.len())
    }
}

fn override_key(session: &SessionId, field: &str) -> String {
    format!("{}{}:{}", OVERRIDE_PREFIX, session, field)
}

/// Millisecond timestamp, bumped until it is unused in `existing`.
fn next_local_id(existing: &[Session]) -> String {
    let mut candidate = Utc::now().timestamp_millis();
    loop {
        let id = candidate.to_string();
        let taken = existing
            .iter()
            .any(|s| matches!(&s.id, SessionId::Local(local) if *local == id));
        if !taken {
            return id;
        }
        candidate += 1;
    }
}
