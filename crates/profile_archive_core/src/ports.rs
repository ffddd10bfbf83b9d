//! crates/profile_archive_core/src/ports.rs
//!
//! Defines the service contracts (traits) at the edges of the session core.
//! These traits keep the core independent of the concrete key-value storage,
//! the remote document store and whatever UI answers confirmation prompts.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Metadata, Session};

//=========================================================================================
// Port Error and Result Types
//=========================================================================================

/// Errors reported by a remote session store.
///
/// Everything except `Unexpected` is an anticipated failure mode that the
/// remote adapter absorbs into a `None`/`false` result.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    #[error("Remote schema missing: {0}")]
    SchemaMissing(String),
    #[error("Request rejected by the remote store: {0}")]
    Rejected(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    pub fn is_expected(&self) -> bool {
        !matches!(self, PortError::Unexpected(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Errors reported by a local key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage quota exceeded: {attempted} bytes would exceed the {quota} byte limit")]
    QuotaExceeded { attempted: usize, quota: usize },
    #[error("Local storage failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

//=========================================================================================
// Storage Ports (Traits)
//=========================================================================================

/// String-to-string storage with a capacity ceiling, in the manner of browser
/// local storage. Operations are synchronous and last-writer-wins.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Fails with `StoreError::QuotaExceeded` when the write would not fit.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    fn remove(&self, key: &str) -> StoreResult<()>;

    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// One row per session in a remote relational table.
///
/// Sessions cross this boundary with their payloads compressed; decoding is
/// the core's job.
#[async_trait]
pub trait RemoteSessionStore: Send + Sync {
    /// A trivial existence read. `SchemaMissing` means reachable but no table.
    async fn probe(&self) -> PortResult<()>;

    /// All sessions, newest first.
    async fn list_sessions(&self) -> PortResult<Vec<Session>>;

    async fn get_session(&self, id: Uuid) -> PortResult<Session>;

    /// Inserts a new row; the returned session carries the server-assigned id.
    async fn insert_session(&self, session: &Session) -> PortResult<Session>;

    async fn update_session(&self, id: Uuid, session: &Session) -> PortResult<Session>;

    /// Returns `false` when no row matched.
    async fn delete_session(&self, id: Uuid) -> PortResult<bool>;

    /// Server-side shallow merge of `patch` into the metadata column, stamping `updated_at`.
    async fn merge_metadata(&self, id: Uuid, patch: &Metadata) -> PortResult<Session>;
}

//=========================================================================================
// Confirmation Port
//=========================================================================================

/// Questions the core needs a human (or a policy) to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmPrompt {
    /// The next local write would overflow the quota; clear stored sessions first?
    ClearLocalSessions { used_bytes: usize, quota_bytes: usize },
    /// Remote storage is empty while local storage holds sessions; copy them over?
    MigrateLocalSessions { count: usize },
}

impl ConfirmPrompt {
    pub fn message(&self) -> String {
        match self {
            ConfirmPrompt::ClearLocalSessions {
                used_bytes,
                quota_bytes,
            } => format!(
                "Local storage is full ({} of {}). Remove stored sessions and continue?",
                crate::capacity::format_bytes(*used_bytes),
                crate::capacity::format_bytes(*quota_bytes)
            ),
            ConfirmPrompt::MigrateLocalSessions { count } => format!(
                "{} locally stored session(s) can be copied to remote storage. Copy them now?",
                count
            ),
        }
    }
}

#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> bool;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct StaticConfirmation(pub bool);

#[async_trait]
impl Confirmation for StaticConfirmation {
    async fn confirm(&self, _prompt: &ConfirmPrompt) -> bool {
        self.0
    }
}
