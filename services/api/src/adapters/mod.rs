pub mod confirm;
pub mod db;
pub mod file_store;

pub use confirm::PolicyConfirmation;
pub use db::PgSessionStore;
pub use file_store::FileKeyValueStore;
