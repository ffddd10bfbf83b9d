//! crates/profile_archive_core/src/remote.rs
//!
//! The remote store adapter. Wraps a `RemoteSessionStore` port, bounds every
//! call with a timeout, decodes payloads, and turns the anticipated failure
//! modes (network, missing table, not found) into `None`/`false`.
//! Only `PortError::Unexpected` escapes as an error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::{Metadata, Session, SessionId};
use crate::error::{CoreError, CoreResult};
use crate::ports::{PortError, PortResult, RemoteSessionStore};

/// Outcome of the startup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Connected,
    /// Reachable, but the sessions table does not exist.
    SchemaMissing,
    Unreachable,
}

#[derive(Clone)]
pub struct RemoteSessions {
    store: Arc<dyn RemoteSessionStore>,
    timeout: Duration,
}

impl RemoteSessions {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(store: Arc<dyn RemoteSessionStore>) -> Self {
        Self {
            store,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn connectivity_check(&self) -> Connectivity {
        match self.bounded("probe", self.store.probe()).await {
            Ok(()) => Connectivity::Connected,
            Err(PortError::SchemaMissing(reason)) => {
                warn!("Remote store reachable but schema is missing: {}", reason);
                Connectivity::SchemaMissing
            }
            Err(e) => {
                warn!("Remote store connectivity check failed: {}", e);
                Connectivity::Unreachable
            }
        }
    }

    /// All remote sessions, newest first, decoded. `None` means the remote
    /// could not be read, which is different from an empty list.
    pub async fn list(&self) -> CoreResult<Option<Vec<Session>>> {
        let result = self.bounded("list", self.store.list_sessions()).await;
        Ok(absorb("list", result)?.map(|sessions| {
            debug!("Loaded {} session(s) from remote store", sessions.len());
            sessions.into_iter().map(Session::hydrate).collect()
        }))
    }

    pub async fn fetch(&self, id: Uuid) -> CoreResult<Option<Session>> {
        let result = self.bounded("fetch", self.store.get_session(id)).await;
        Ok(absorb("fetch", result)?.map(Session::hydrate))
    }

    /// Updates in place when `session` already has a remote id, otherwise
    /// inserts and adopts the server-assigned id.
    pub async fn save(&self, session: &Session) -> CoreResult<Option<Session>> {
        let result = match &session.id {
            SessionId::Remote(id) => {
                self.bounded("update", self.store.update_session(*id, session))
                    .await
            }
            SessionId::Local(_) => self.bounded("insert", self.store.insert_session(session)).await,
        };
        Ok(absorb("save", result)?.map(|saved| saved.with_payload_from(session).hydrate()))
    }

    /// `false` on failure or when no row matched.
    pub async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        let result = self.bounded("delete", self.store.delete_session(id)).await;
        Ok(absorb("delete", result)?.unwrap_or(false))
    }

    pub async fn update_metadata(&self, id: Uuid, patch: &Metadata) -> CoreResult<Option<Session>> {
        let result = self
            .bounded("update_metadata", self.store.merge_metadata(id, patch))
            .await;
        Ok(absorb("update_metadata", result)?.map(Session::hydrate))
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = PortResult<T>>,
    ) -> PortResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PortError::Unavailable(format!(
                "{} timed out after {:?}",
                operation, self.timeout
            ))),
        }
    }
}

fn absorb<T>(operation: &str, result: PortResult<T>) -> CoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_expected() => {
            warn!("Remote {} failed: {}", operation, e);
            Ok(None)
        }
        Err(e) => {
            error!("Remote {} failed unexpectedly: {}", operation, e);
            Err(CoreError::Remote(e))
        }
    }
}
