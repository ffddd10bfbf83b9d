//! crates/profile_archive_core/src/coordinator.rs
//!
//! The session coordinator: the single entry point for load, save, delete,
//! metadata updates and migration. It owns the choice between the local and
//! remote backends and is the only place where a failure on one side can be
//! recovered by falling back to the other.
//!
//! Deletes touch both backends independently with no transaction; a crash in
//! between can leave one side behind. Overlapping mutating calls on the same
//! session are not serialized against each other.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::capacity::StorageUsage;
use crate::domain::{
    Metadata, Origin, ReportClassification, Session, SessionId, StatusMessage, CLASSIFICATION_KEY,
    REPORT_KEY,
};
use crate::error::{CoreError, CoreResult};
use crate::intake::{CrawlOutcome, SessionDraft};
use crate::local_store::{DeleteOutcome, LocalListing, LocalSessionStore};
use crate::ports::{ConfirmPrompt, Confirmation};
use crate::remote::{Connectivity, RemoteSessions};

//=========================================================================================
// Backend State
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    NotConfigured,
    SchemaMissing,
    Unreachable,
}

/// `Unknown` until the first connectivity check; never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Unknown,
    Connected,
    Degraded(DegradedReason),
}

impl BackendState {
    fn notice(&self) -> Option<StatusMessage> {
        match self {
            BackendState::Unknown => None,
            BackendState::Connected => Some(StatusMessage::info("Connected to remote storage.")),
            BackendState::Degraded(DegradedReason::NotConfigured) => Some(StatusMessage::info(
                "Remote storage is not configured; sessions are kept in local storage.",
            )),
            BackendState::Degraded(DegradedReason::SchemaMissing) => Some(StatusMessage::info(
                "Remote storage is reachable but has no sessions table; working from local storage.",
            )),
            BackendState::Degraded(DegradedReason::Unreachable) => Some(StatusMessage::info(
                "Remote storage is unreachable; working from local storage for now.",
            )),
        }
    }
}

//=========================================================================================
// Operation Reports
//=========================================================================================

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub sessions: Vec<Session>,
    /// Which backend the sessions came from.
    pub source: Origin,
    /// Remote is empty while local storage still holds sessions.
    pub migration_suggested: bool,
    pub notices: Vec<StatusMessage>,
}

#[derive(Debug, Clone)]
pub struct SaveReport {
    pub session: Session,
    pub notices: Vec<StatusMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    pub remote_removed: bool,
    pub local_removed: bool,
}

impl DeleteReport {
    /// Successful if either side confirmed a removal.
    pub fn removed(&self) -> bool {
        self.remote_removed || self.local_removed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub migrated: usize,
    pub failed: usize,
    /// Local sessions that already have a remote copy.
    pub skipped: usize,
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} migrated, {} failed", self.migrated, self.failed)?;
        if self.skipped > 0 {
            write!(f, ", {} already copied", self.skipped)?;
        }
        Ok(())
    }
}

//=========================================================================================
// The Coordinator
//=========================================================================================

pub struct SessionCoordinator {
    local: LocalSessionStore,
    remote: Option<RemoteSessions>,
    confirmation: Arc<dyn Confirmation>,
    state: Mutex<BackendState>,
    connectivity_reported: AtomicBool,
}

impl SessionCoordinator {
    /// `remote = None` runs permanently against local storage.
    pub fn new(
        local: LocalSessionStore,
        remote: Option<RemoteSessions>,
        confirmation: Arc<dyn Confirmation>,
    ) -> Self {
        Self {
            local,
            remote,
            confirmation,
            state: Mutex::new(BackendState::Unknown),
            connectivity_reported: AtomicBool::new(false),
        }
    }

    /// Direct access to the local store, e.g. for the API key and field overrides.
    pub fn local(&self) -> &LocalSessionStore {
        &self.local
    }

    /// Runs the connectivity check once and fixes the backend state for the
    /// lifetime of the coordinator. Later calls return the settled state.
    pub async fn start(&self) -> BackendState {
        let mut state = self.state.lock().await;
        if *state != BackendState::Unknown {
            return *state;
        }
        let next = match &self.remote {
            None => BackendState::Degraded(DegradedReason::NotConfigured),
            Some(remote) => match remote.connectivity_check().await {
                Connectivity::Connected => BackendState::Connected,
                Connectivity::SchemaMissing => BackendState::Degraded(DegradedReason::SchemaMissing),
                Connectivity::Unreachable => BackendState::Degraded(DegradedReason::Unreachable),
            },
        };
        info!("Session storage backend: {:?}", next);
        *state = next;
        next
    }

    /// The remote adapter, if the backend is connected.
    async fn connected_remote(&self) -> Option<&RemoteSessions> {
        match self.start().await {
            BackendState::Connected => self.remote.as_ref(),
            _ => None,
        }
    }

    /// The connectivity status, the first time anyone asks.
    async fn connectivity_notice(&self) -> Option<StatusMessage> {
        let state = self.start().await;
        if self.connectivity_reported.swap(true, Ordering::SeqCst) {
            return None;
        }
        state.notice()
    }

    //=====================================================================================
    // Load / Open
    //=====================================================================================

    pub async fn load(&self) -> CoreResult<LoadReport> {
        let mut notices: Vec<StatusMessage> = self.connectivity_notice().await.into_iter().collect();

        if let Some(remote) = self.connected_remote().await {
            match remote.list().await? {
                Some(sessions) => {
                    let mut migration_suggested = false;
                    if sessions.is_empty() {
                        let listing = self.local.list()?;
                        notices.extend(listing_notices(&listing));
                        if !listing.sessions.is_empty() {
                            migration_suggested = true;
                            notices.push(StatusMessage::info(format!(
                                "{} locally stored session(s) can be copied to remote storage.",
                                listing.sessions.len()
                            )));
                        }
                    }
                    return Ok(LoadReport {
                        sessions,
                        source: Origin::Remote,
                        migration_suggested,
                        notices,
                    });
                }
                None => notices.push(StatusMessage::warning(
                    "Remote storage did not respond; showing locally stored sessions.",
                )),
            }
        }

        let listing = self.local.list()?;
        notices.extend(listing_notices(&listing));
        Ok(LoadReport {
            sessions: listing.sessions.into_iter().map(Session::hydrate).collect(),
            source: Origin::Local,
            migration_suggested: false,
            notices,
        })
    }

    /// One session with both payloads decoded.
    pub async fn open(&self, id: &SessionId) -> CoreResult<Session> {
        let mut found = None;
        if let SessionId::Remote(remote_id) = id {
            if let Some(remote) = self.connected_remote().await {
                found = remote.fetch(*remote_id).await?;
            }
        }
        if found.is_none() {
            found = self.local.find(id)?;
        }

        let session = found
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?
            .hydrate();
        if !session.is_decoded() {
            return Err(CoreError::Corrupted(id.to_string()));
        }
        Ok(session)
    }

    //=====================================================================================
    // Save
    //=====================================================================================

    /// Encodes the draft, then tries remote storage when connected and falls
    /// back to local storage. The returned session always carries the decoded payload.
    pub async fn save(&self, draft: SessionDraft) -> CoreResult<SaveReport> {
        draft.validate()?;
        let session = draft.into_session()?;
        let mut notices: Vec<StatusMessage> = self.connectivity_notice().await.into_iter().collect();

        if let Some(remote) = self.connected_remote().await {
            match remote.save(&session).await? {
                Some(saved) => {
                    info!("Saved session '{}' remotely as {}", saved.name, saved.id);
                    notices.push(StatusMessage::success("Session saved to remote storage."));
                    return Ok(SaveReport {
                        session: saved,
                        notices,
                    });
                }
                None => notices.push(StatusMessage::warning(
                    "Remote save failed; the session was kept in local storage instead.",
                )),
            }
        }

        self.make_room_for(&session, &mut notices).await?;
        let outcome = self.local.save(session)?;
        if outcome.evicted > 0 {
            notices.push(StatusMessage::info(format!(
                "Removed {} older session(s) automatically to free local storage.",
                outcome.evicted
            )));
        }
        info!("Saved session '{}' locally as {}", outcome.session.name, outcome.session.id);
        notices.push(StatusMessage::success("Session saved locally."));
        Ok(SaveReport {
            session: outcome.session,
            notices,
        })
    }

    /// Saves the results of a finished crawl. A timed-out or failed crawl is
    /// reported like any other invalid input.
    pub async fn save_crawl(&self, name: &str, outcome: CrawlOutcome) -> CoreResult<SaveReport> {
        let draft = SessionDraft::from_crawl(name, outcome)?;
        self.save(draft).await
    }

    /// Asks whether to clear local sessions when the pending write would not fit.
    async fn make_room_for(&self, session: &Session, notices: &mut Vec<StatusMessage>) -> CoreResult<()> {
        let usage = self.local.usage()?;
        if !self
            .local
            .policy()
            .would_overflow(usage.used_bytes, session.size_bytes())
        {
            return Ok(());
        }
        let prompt = ConfirmPrompt::ClearLocalSessions {
            used_bytes: usage.used_bytes,
            quota_bytes: usage.quota_bytes,
        };
        if self.confirmation.confirm(&prompt).await {
            warn!("Clearing {} local session(s) to make room", usage.session_count);
            self.local.clear()?;
            notices.push(StatusMessage::warning("Local sessions were cleared to make room."));
        }
        Ok(())
    }

    //=====================================================================================
    // Delete / Update
    //=====================================================================================

    /// Remote first when the id is remote and the backend connected, then
    /// local regardless, so a stray local copy goes too.
    pub async fn delete(&self, id: &SessionId) -> CoreResult<DeleteReport> {
        let remote_result = match (id, self.connected_remote().await) {
            (SessionId::Remote(remote_id), Some(remote)) => remote.delete(*remote_id).await,
            _ => Ok(false),
        };
        let local_result = self.local.delete(id);

        let report = DeleteReport {
            remote_removed: remote_result?,
            local_removed: local_result? == DeleteOutcome::Deleted,
        };
        if report.removed() {
            self.local.clear_overrides(id)?;
            info!("Deleted session {}", id);
        }
        Ok(report)
    }

    /// Routes by origin like `delete`, but writes to exactly one backend.
    /// Returns whether a session was updated.
    pub async fn update_metadata(&self, id: &SessionId, patch: Metadata) -> CoreResult<bool> {
        if let SessionId::Remote(remote_id) = id {
            if let Some(remote) = self.connected_remote().await {
                return Ok(remote.update_metadata(*remote_id, &patch).await?.is_some());
            }
        }
        Ok(self.local.update_metadata(id, patch)?)
    }

    /// Stores generated narrative output on the session.
    pub async fn attach_report(
        &self,
        id: &SessionId,
        report: &str,
        classification: &ReportClassification,
    ) -> CoreResult<bool> {
        let mut patch = Metadata::new();
        patch.insert(REPORT_KEY.to_string(), Value::String(report.to_string()));
        patch.insert(
            CLASSIFICATION_KEY.to_string(),
            json!({
                "level": classification.level,
                "description": classification.description,
                "color": classification.color,
            }),
        );
        self.update_metadata(id, patch).await
    }

    //=====================================================================================
    // Migration
    //=====================================================================================

    /// Copies every local session to remote storage. Local originals are kept
    /// and the collection is read without eviction; failures are counted, not retried.
    pub async fn migrate(&self) -> CoreResult<MigrationSummary> {
        let Some(remote) = self.connected_remote().await else {
            return Err(CoreError::MigrationUnavailable(
                "remote storage is not connected".to_string(),
            ));
        };
        let listing = self.local.sessions()?;
        if listing.sessions.is_empty() {
            return Err(CoreError::MigrationUnavailable(
                "there are no locally stored sessions".to_string(),
            ));
        }

        let mut summary = MigrationSummary::default();
        for session in listing.sessions {
            if session.remote_copy.is_some() {
                summary.skipped += 1;
                continue;
            }
            let session = session.hydrate();
            if !session.is_decoded() {
                warn!("Not migrating {}: stored payload is unreadable", session.id);
                summary.failed += 1;
                continue;
            }
            match remote.save(&session).await? {
                Some(saved) => {
                    // The remote copy exists either way; a failed mark only
                    // means a later migration may copy this session again.
                    if let Some(remote_id) = saved.id.remote() {
                        if let Err(e) = self.local.mark_copied(&session.id, remote_id) {
                            warn!(
                                "Migrated {} as {} but could not record the copy locally: {}",
                                session.id, remote_id, e
                            );
                        }
                    }
                    summary.migrated += 1;
                }
                None => summary.failed += 1,
            }
        }

        info!("Migration finished: {}", summary);
        Ok(summary)
    }

    /// Asks before migrating. `None` if there was nothing to offer or the
    /// offer was declined.
    pub async fn offer_migration(&self) -> CoreResult<Option<MigrationSummary>> {
        if self.connected_remote().await.is_none() {
            return Ok(None);
        }
        let pending = self
            .local
            .sessions()?
            .sessions
            .iter()
            .filter(|s| s.remote_copy.is_none())
            .count();
        if pending == 0 {
            return Ok(None);
        }
        let prompt = ConfirmPrompt::MigrateLocalSessions { count: pending };
        if !self.confirmation.confirm(&prompt).await {
            return Ok(None);
        }
        self.migrate().await.map(Some)
    }

    pub fn usage(&self) -> CoreResult<StorageUsage> {
        Ok(self.local.usage()?)
    }
}

fn listing_notices(listing: &LocalListing) -> Vec<StatusMessage> {
    let mut notices = Vec::new();
    if listing.reset {
        notices.push(StatusMessage::warning(
            "Locally stored sessions were unreadable and have been cleared.",
        ));
    }
    if listing.evicted > 0 {
        notices.push(StatusMessage::info(format!(
            "Removed {} older session(s) automatically to free local storage.",
            listing.evicted
        )));
    }
    notices
}
