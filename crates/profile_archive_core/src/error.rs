//! crates/profile_archive_core/src/error.rs
//!
//! The error boundary of the session core. Adapters report expected failures
//! as values; whatever reaches a `CoreError` is something the caller must see.

use crate::codec::CodecError;
use crate::intake::IntakeError;
use crate::ports::{PortError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid session input: {0}")]
    Intake(#[from] IntakeError),

    #[error("Failed to encode session payload: {0}")]
    Codec(#[from] CodecError),

    /// Eviction and the single retry both failed.
    #[error("Local storage is full ({0}). Delete old sessions, export the ones you need, or clear stored data, then try again.")]
    StorageFull(String),

    #[error("Local storage error: {0}")]
    LocalStorage(String),

    #[error("Remote storage error: {0}")]
    Remote(#[from] PortError),

    #[error("Session {0} could not be restored from its stored data")]
    Corrupted(String),

    #[error("Session {0} not found")]
    NotFound(String),

    #[error("Migration is not available: {0}")]
    MigrationUnavailable(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::QuotaExceeded { .. } => CoreError::StorageFull(err.to_string()),
            StoreError::Backend(message) => CoreError::LocalStorage(message),
        }
    }
}

/// A convenience type alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;
