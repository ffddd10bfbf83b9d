//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RemoteSessionStore` port from the core crate. It keeps sessions in a
//! single PostgreSQL table using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use profile_archive_core::domain::{Metadata, Session, SessionId};
use profile_archive_core::ports::{PortError, PortResult, RemoteSessionStore};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Written to every row so later layouts can be told apart.
pub const SCHEMA_VERSION: i32 = 1;

/// SQLSTATE for "undefined table".
const UNDEFINED_TABLE: &str = "42P01";

const SESSION_COLUMNS: &str =
    "id, name, compressed_profile_data, compressed_posts_data, metadata, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RemoteSessionStore` port.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new `PgSessionStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    name: String,
    compressed_profile_data: String,
    compressed_posts_data: String,
    metadata: Option<Json<Value>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    fn to_domain(self) -> Session {
        let metadata = match self.metadata.map(|json| json.0) {
            Some(Value::Object(map)) => map,
            _ => Metadata::new(),
        };
        Session {
            id: SessionId::Remote(self.id),
            name: self.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
            compressed_profile: self.compressed_profile_data,
            compressed_posts: self.compressed_posts_data,
            metadata,
            remote_copy: None,
            profile: None,
            posts: None,
        }
    }
}

/// Maps driver failures onto the port's error kinds. Connectivity problems
/// and server-side rejections are expected; decoding problems are not.
fn map_db_error(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound("session not found".to_string()),
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE) => {
            PortError::SchemaMissing(db.message().to_string())
        }
        sqlx::Error::Database(db) => PortError::Rejected(db.message().to_string()),
        e @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => PortError::Unavailable(e.to_string()),
        e => PortError::Unexpected(e.to_string()),
    }
}

fn size_column(encoded: &str) -> i32 {
    i32::try_from(encoded.len()).unwrap_or(i32::MAX)
}

//=========================================================================================
// `RemoteSessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteSessionStore for PgSessionStore {
    async fn probe(&self) -> PortResult<()> {
        sqlx::query("SELECT 1 FROM sessions LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn list_sessions(&self) -> PortResult<Vec<Session>> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM sessions ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(records.into_iter().map(SessionRecord::to_domain).collect())
    }

    async fn get_session(&self, id: Uuid) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {} FROM sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Session {} not found", id)),
            _ => map_db_error(e),
        })?;

        Ok(record.to_domain())
    }

    async fn insert_session(&self, session: &Session) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO sessions (name, compressed_profile_data, compressed_posts_data, \
             profile_data_size, posts_data_size, metadata, schema_version, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(&session.name)
        .bind(&session.compressed_profile)
        .bind(&session.compressed_posts)
        .bind(size_column(&session.compressed_profile))
        .bind(size_column(&session.compressed_posts))
        .bind(Json(&session.metadata))
        .bind(SCHEMA_VERSION)
        .bind(session.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(record.to_domain())
    }

    async fn update_session(&self, id: Uuid, session: &Session) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE sessions SET name = $2, compressed_profile_data = $3, \
             compressed_posts_data = $4, profile_data_size = $5, posts_data_size = $6, \
             metadata = $7, updated_at = now() WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(&session.name)
        .bind(&session.compressed_profile)
        .bind(&session.compressed_posts)
        .bind(size_column(&session.compressed_profile))
        .bind(size_column(&session.compressed_posts))
        .bind(Json(&session.metadata))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        record
            .map(SessionRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", id)))
    }

    async fn delete_session(&self, id: Uuid) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn merge_metadata(&self, id: Uuid, patch: &Metadata) -> PortResult<Session> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE sessions SET metadata = COALESCE(metadata, '{{}}'::jsonb) || $2, \
             updated_at = now() WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(Json(patch))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        record
            .map(SessionRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", id)))
    }
}
