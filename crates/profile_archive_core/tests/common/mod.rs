//! Shared fakes for the coordinator tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use profile_archive_core::capacity::CapacityPolicy;
use profile_archive_core::domain::{merge_metadata, Metadata, Session, SessionId};
use profile_archive_core::ports::{
    ConfirmPrompt, Confirmation, PortError, PortResult, RemoteSessionStore,
};
use profile_archive_core::{
    LocalSessionStore, MemoryKeyValueStore, RemoteSessions, SessionCoordinator,
    StaticConfirmation,
};
use serde_json::json;
use uuid::Uuid;

/// In-memory remote store with switchable failure modes.
#[derive(Default)]
pub struct FakeRemote {
    pub rows: Mutex<Vec<Session>>,
    pub offline: AtomicBool,
    pub schema_missing: AtomicBool,
    pub broken: AtomicBool,
    /// Fail every n-th insert (1-based); 0 disables.
    pub fail_insert_every: AtomicUsize,
    pub inserts: AtomicUsize,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    async fn gate(&self) -> PortResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("driver panicked".to_string()));
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("connection refused".to_string()));
        }
        if self.schema_missing.load(Ordering::SeqCst) {
            return Err(PortError::SchemaMissing("relation \"sessions\" does not exist".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSessionStore for FakeRemote {
    async fn probe(&self) -> PortResult<()> {
        self.gate().await
    }

    async fn list_sessions(&self) -> PortResult<Vec<Session>> {
        self.gate().await?;
        let mut rows = self.rows.lock().unwrap().clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_session(&self, id: Uuid) -> PortResult<Session> {
        self.gate().await?;
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == SessionId::Remote(id))
            .cloned()
            .ok_or_else(|| PortError::NotFound(id.to_string()))
    }

    async fn insert_session(&self, session: &Session) -> PortResult<Session> {
        self.gate().await?;
        let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        let every = self.fail_insert_every.load(Ordering::SeqCst);
        if every > 0 && n % every == 0 {
            return Err(PortError::Rejected("payload too large".to_string()));
        }
        let stored = Session {
            id: SessionId::Remote(Uuid::new_v4()),
            updated_at: Some(Utc::now()),
            remote_copy: None,
            profile: None,
            posts: None,
            ..session.clone()
        };
        self.rows.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update_session(&self, id: Uuid, session: &Session) -> PortResult<Session> {
        self.gate().await?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == SessionId::Remote(id))
            .ok_or_else(|| PortError::NotFound(id.to_string()))?;
        row.name = session.name.clone();
        row.compressed_profile = session.compressed_profile.clone();
        row.compressed_posts = session.compressed_posts.clone();
        row.metadata = session.metadata.clone();
        row.updated_at = Some(Utc::now());
        Ok(row.clone())
    }

    async fn delete_session(&self, id: Uuid) -> PortResult<bool> {
        self.gate().await?;
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|s| s.id != SessionId::Remote(id));
        Ok(rows.len() < before)
    }

    async fn merge_metadata(&self, id: Uuid, patch: &Metadata) -> PortResult<Session> {
        self.gate().await?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|s| s.id == SessionId::Remote(id))
            .ok_or_else(|| PortError::NotFound(id.to_string()))?;
        merge_metadata(&mut row.metadata, patch.clone());
        row.updated_at = Some(Utc::now());
        Ok(row.clone())
    }
}

/// Records every prompt and answers with a fixed value.
pub struct RecordingConfirmation {
    pub answer: bool,
    pub prompts: Mutex<Vec<ConfirmPrompt>>,
}

impl RecordingConfirmation {
    pub fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Confirmation for RecordingConfirmation {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.answer
    }
}

pub fn local_store() -> LocalSessionStore {
    LocalSessionStore::new(Arc::new(MemoryKeyValueStore::new()), CapacityPolicy::default())
}

pub fn coordinator(local: LocalSessionStore, remote: Option<Arc<FakeRemote>>) -> SessionCoordinator {
    SessionCoordinator::new(
        local,
        remote.map(|r| RemoteSessions::new(r).with_timeout(Duration::from_millis(200))),
        Arc::new(StaticConfirmation(false)),
    )
}

pub fn profile(title: &str) -> serde_json::Value {
    json!([{ "title": title, "followers": 120 }])
}

pub fn posts() -> serde_json::Value {
    json!([{ "text": "hello", "timestamp": "2024-01-01T00:00:00Z" }])
}
