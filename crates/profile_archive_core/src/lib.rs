pub mod capacity;
pub mod codec;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod intake;
pub mod local_store;
pub mod memory;
pub mod ports;
pub mod remote;

pub use capacity::{CapacityPolicy, StorageUsage};
pub use coordinator::{
    BackendState, DegradedReason, DeleteReport, LoadReport, MigrationSummary, SaveReport,
    SessionCoordinator,
};
pub use domain::{
    Metadata, Origin, ReportClassification, Session, SessionId, Severity, StatusMessage,
};
pub use error::{CoreError, CoreResult};
pub use intake::{CrawlOutcome, CrawlResult, IntakeError, SessionDraft};
pub use local_store::LocalSessionStore;
pub use memory::MemoryKeyValueStore;
pub use ports::{
    ConfirmPrompt, Confirmation, KeyValueStore, PortError, PortResult, RemoteSessionStore,
    StaticConfirmation, StoreError, StoreResult,
};
pub use remote::{Connectivity, RemoteSessions};
