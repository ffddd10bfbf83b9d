//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and how it is assembled from config.

use std::sync::Arc;

use profile_archive_core::capacity::CapacityPolicy;
use profile_archive_core::ports::{Confirmation, KeyValueStore, RemoteSessionStore};
use profile_archive_core::{LocalSessionStore, RemoteSessions, SessionCoordinator};

use crate::config::Config;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the coordinator from its adapters. `remote = None` runs the
    /// service against local storage only.
    pub fn new(
        config: Arc<Config>,
        local: Arc<dyn KeyValueStore>,
        remote: Option<Arc<dyn RemoteSessionStore>>,
        confirmation: Arc<dyn Confirmation>,
    ) -> Self {
        let local = LocalSessionStore::new(local, CapacityPolicy::with_quota(config.local_quota_bytes));
        let remote = remote.map(|store| RemoteSessions::new(store).with_timeout(config.remote_timeout));
        Self {
            coordinator: Arc::new(SessionCoordinator::new(local, remote, confirmation)),
            config,
        }
    }
}
