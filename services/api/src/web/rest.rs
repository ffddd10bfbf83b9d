//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the session endpoints and the master
//! definition for the OpenAPI specification. Handlers only translate between
//! HTTP and the session coordinator; every storage decision happens in the core.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use profile_archive_core::capacity::format_bytes;
use profile_archive_core::domain::{Metadata, ReportClassification, Session, SessionId, Severity, StatusMessage};
use profile_archive_core::error::CoreError;
use profile_archive_core::intake::{CrawlOutcome, CrawlResult, SessionDraft};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};

use crate::web::settings;
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_sessions_handler,
        create_session_handler,
        upload_session_handler,
        crawl_session_handler,
        get_session_handler,
        delete_session_handler,
        update_metadata_handler,
        attach_report_handler,
        migrate_handler,
        storage_handler,
        settings::get_api_key_handler,
        settings::set_api_key_handler,
        settings::clear_api_key_handler,
    ),
    components(
        schemas(
            Notice,
            SessionSummary,
            SessionDetail,
            ListSessionsResponse,
            CreateSessionRequest,
            SaveSessionResponse,
            CrawlRequest,
            DeleteSessionResponse,
            MetadataPatchRequest,
            ReportRequest,
            UpdateResponse,
            MigrationResponse,
            StorageResponse,
            settings::ApiKeyStatus,
            settings::SetApiKeyRequest,
        )
    ),
    tags(
        (name = "Profile Archive API", description = "Save, restore and migrate profile analysis sessions.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A status message for toast display.
#[derive(Debug, Serialize, ToSchema)]
pub struct Notice {
    /// One of `info`, `success`, `warning`, `error`.
    pub severity: String,
    pub text: String,
}

impl From<StatusMessage> for Notice {
    fn from(message: StatusMessage) -> Self {
        let severity = match message.severity {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        Self {
            severity: severity.to_string(),
            text: message.text,
        }
    }
}

fn notices(messages: Vec<StatusMessage>) -> Vec<Notice> {
    messages.into_iter().map(Notice::from).collect()
}

/// A session as listed, without its payloads.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSummary {
    /// `local` or `remote`.
    pub origin: String,
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Combined length of the encoded payloads.
    pub size_bytes: usize,
    #[schema(value_type = Object)]
    pub metadata: Metadata,
    /// Set on local sessions that have been copied to remote storage.
    pub remote_copy: Option<String>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            origin: session.origin().as_str().to_string(),
            id: session.id.raw(),
            name: session.name.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            size_bytes: session.size_bytes(),
            metadata: session.metadata.clone(),
            remote_copy: session.remote_copy.map(|id| id.to_string()),
        }
    }
}

/// A session with its decoded payloads.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    #[schema(value_type = Object)]
    pub profile: Value,
    #[schema(value_type = Object)]
    pub posts: Value,
}

impl From<Session> for SessionDetail {
    fn from(session: Session) -> Self {
        let summary = SessionSummary::from(&session);
        Self {
            summary,
            profile: session.profile.unwrap_or(Value::Null),
            posts: session.posts.unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListSessionsResponse {
    /// Which backend the sessions came from.
    pub source: String,
    pub sessions: Vec<SessionSummary>,
    /// Remote storage is empty while local storage still holds sessions.
    pub migration_suggested: bool,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    pub name: String,
    #[schema(value_type = Object)]
    pub profile: Value,
    #[schema(value_type = Object)]
    pub posts: Value,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Metadata,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaveSessionResponse {
    pub session: SessionDetail,
    pub notices: Vec<Notice>,
}

/// The hand-off from the crawler workflow. `error` marks a failed run,
/// `timed_out_after` a run abandoned after that many status checks.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CrawlRequest {
    pub name: String,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub results: Vec<CrawlResult>,
    pub timed_out_after: Option<u32>,
    pub error: Option<String>,
}

impl CrawlRequest {
    fn into_parts(self) -> (String, CrawlOutcome) {
        let outcome = match (self.error, self.timed_out_after) {
            (Some(reason), _) => CrawlOutcome::Failed(reason),
            (None, Some(attempts)) => CrawlOutcome::TimedOut { attempts },
            (None, None) => CrawlOutcome::Completed(self.results),
        };
        (self.name, outcome)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteSessionResponse {
    pub removed: bool,
    pub remote_removed: bool,
    pub local_removed: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MetadataPatchRequest {
    /// Keys to set; keys not named here are left untouched.
    #[schema(value_type = Object)]
    pub patch: Metadata,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportRequest {
    pub report: String,
    pub level: String,
    pub description: String,
    pub color: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateResponse {
    pub updated: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MigrationResponse {
    pub migrated: usize,
    pub failed: usize,
    pub skipped: usize,
    /// E.g. "2 migrated, 1 failed".
    pub summary: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StorageResponse {
    pub used_bytes: usize,
    pub quota_bytes: usize,
    pub session_count: usize,
    pub percent_used: f64,
    /// Human-readable, e.g. "1.5 MB of 5 MB".
    pub display: String,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

type HandlerError = (StatusCode, String);

pub(crate) fn core_error_response(context: &str, e: CoreError) -> HandlerError {
    let status = match &e {
        CoreError::Intake(_) | CoreError::Codec(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Corrupted(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::MigrationUnavailable(_) => StatusCode::CONFLICT,
        CoreError::StorageFull(_) => StatusCode::INSUFFICIENT_STORAGE,
        CoreError::Remote(_) => StatusCode::BAD_GATEWAY,
        CoreError::LocalStorage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("{}: {:?}", context, e);
    } else {
        warn!("{}: {}", context, e);
    }
    (status, e.to_string())
}

fn parse_session_id(origin: &str, id: &str) -> Result<SessionId, HandlerError> {
    SessionId::parse(origin, id).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("'{}/{}' is not a valid session id", origin, id),
        )
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List all sessions from the active backend, newest first.
#[utoipa::path(
    get,
    path = "/sessions",
    responses(
        (status = 200, description = "Sessions listed", body = ListSessionsResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_sessions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let report = app_state
        .coordinator
        .load()
        .await
        .map_err(|e| core_error_response("Failed to load sessions", e))?;

    Ok(Json(ListSessionsResponse {
        source: report.source.as_str().to_string(),
        sessions: report.sessions.iter().map(SessionSummary::from).collect(),
        migration_suggested: report.migration_suggested,
        notices: notices(report.notices),
    }))
}

/// Save a new session from JSON payloads.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session saved", body = SaveSessionResponse),
        (status = 400, description = "Invalid session input"),
        (status = 507, description = "Local storage is full")
    )
)]
pub async fn create_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let draft = SessionDraft::new(request.name, request.profile, request.posts)
        .with_metadata(request.metadata);
    save_draft(&app_state, draft).await
}

/// Save a new session from an uploaded profile file and posts file.
///
/// Accepts a multipart/form-data request with `name`, `profile` and `posts` parts.
#[utoipa::path(
    post,
    path = "/sessions/upload",
    request_body(content_type = "multipart/form-data", description = "Session name plus the profile and posts JSON files."),
    responses(
        (status = 201, description = "Session saved", body = SaveSessionResponse),
        (status = 400, description = "Bad request (e.g., missing part or unrecognized file shape)"),
        (status = 507, description = "Local storage is full")
    )
)]
pub async fn upload_session_handler(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let mut name = None;
    let mut profile = None;
    let mut posts = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let part = field.name().unwrap_or_default().to_string();
        let text = field.text().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read part '{}': {}", part, e),
            )
        })?;
        match part.as_str() {
            "name" => name = Some(text),
            "profile" => profile = Some(text),
            "posts" => posts = Some(text),
            _ => {}
        }
    }

    let missing = |part: &str| (StatusCode::BAD_REQUEST, format!("Multipart form must include a '{}' part", part));
    let name = name.ok_or_else(|| missing("name"))?;
    let profile = profile.ok_or_else(|| missing("profile"))?;
    let posts = posts.ok_or_else(|| missing("posts"))?;

    let draft = SessionDraft::from_uploads(name, &profile, &posts)
        .map_err(|e| core_error_response("Rejected upload", e.into()))?;
    save_draft(&app_state, draft).await
}

/// Save the results of a crawl run as a multi-account session.
#[utoipa::path(
    post,
    path = "/sessions/crawl",
    request_body = CrawlRequest,
    responses(
        (status = 201, description = "Session saved", body = SaveSessionResponse),
        (status = 400, description = "The crawl failed, timed out or returned nothing"),
        (status = 507, description = "Local storage is full")
    )
)]
pub async fn crawl_session_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CrawlRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let (name, outcome) = request.into_parts();
    let report = app_state
        .coordinator
        .save_crawl(&name, outcome)
        .await
        .map_err(|e| core_error_response("Failed to save crawl results", e))?;

    Ok((
        StatusCode::CREATED,
        Json(SaveSessionResponse {
            session: SessionDetail::from(report.session),
            notices: notices(report.notices),
        }),
    ))
}

async fn save_draft(
    app_state: &AppState,
    draft: SessionDraft,
) -> Result<(StatusCode, Json<SaveSessionResponse>), HandlerError> {
    let report = app_state
        .coordinator
        .save(draft)
        .await
        .map_err(|e| core_error_response("Failed to save session", e))?;

    Ok((
        StatusCode::CREATED,
        Json(SaveSessionResponse {
            session: SessionDetail::from(report.session),
            notices: notices(report.notices),
        }),
    ))
}

/// Open one session with its payloads decoded.
#[utoipa::path(
    get,
    path = "/sessions/{origin}/{id}",
    params(
        ("origin" = String, Path, description = "`local` or `remote`"),
        ("id" = String, Path, description = "The session id within its origin")
    ),
    responses(
        (status = 200, description = "Session restored", body = SessionDetail),
        (status = 404, description = "Session not found"),
        (status = 422, description = "Stored data could not be restored")
    )
)]
pub async fn get_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path((origin, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, HandlerError> {
    let id = parse_session_id(&origin, &id)?;
    let session = app_state
        .coordinator
        .open(&id)
        .await
        .map_err(|e| core_error_response("Failed to open session", e))?;
    Ok(Json(SessionDetail::from(session)))
}

/// Delete a session from every backend that holds it.
#[utoipa::path(
    delete,
    path = "/sessions/{origin}/{id}",
    params(
        ("origin" = String, Path, description = "`local` or `remote`"),
        ("id" = String, Path, description = "The session id within its origin")
    ),
    responses(
        (status = 200, description = "Deletion attempted", body = DeleteSessionResponse),
        (status = 502, description = "Remote storage failed unexpectedly")
    )
)]
pub async fn delete_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path((origin, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, HandlerError> {
    let id = parse_session_id(&origin, &id)?;
    let report = app_state
        .coordinator
        .delete(&id)
        .await
        .map_err(|e| core_error_response("Failed to delete session", e))?;

    Ok(Json(DeleteSessionResponse {
        removed: report.removed(),
        remote_removed: report.remote_removed,
        local_removed: report.local_removed,
    }))
}

/// Shallow-merge keys into a session's metadata.
#[utoipa::path(
    patch,
    path = "/sessions/{origin}/{id}/metadata",
    params(
        ("origin" = String, Path, description = "`local` or `remote`"),
        ("id" = String, Path, description = "The session id within its origin")
    ),
    request_body = MetadataPatchRequest,
    responses(
        (status = 200, description = "Update attempted", body = UpdateResponse)
    )
)]
pub async fn update_metadata_handler(
    State(app_state): State<Arc<AppState>>,
    Path((origin, id)): Path<(String, String)>,
    Json(request): Json<MetadataPatchRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let id = parse_session_id(&origin, &id)?;
    let updated = app_state
        .coordinator
        .update_metadata(&id, request.patch)
        .await
        .map_err(|e| core_error_response("Failed to update metadata", e))?;
    Ok(Json(UpdateResponse { updated }))
}

/// Store a generated report and its classification on a session.
#[utoipa::path(
    put,
    path = "/sessions/{origin}/{id}/report",
    params(
        ("origin" = String, Path, description = "`local` or `remote`"),
        ("id" = String, Path, description = "The session id within its origin")
    ),
    request_body = ReportRequest,
    responses(
        (status = 200, description = "Update attempted", body = UpdateResponse)
    )
)]
pub async fn attach_report_handler(
    State(app_state): State<Arc<AppState>>,
    Path((origin, id)): Path<(String, String)>,
    Json(request): Json<ReportRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let id = parse_session_id(&origin, &id)?;
    let classification = ReportClassification {
        level: request.level,
        description: request.description,
        color: request.color,
    };
    let updated = app_state
        .coordinator
        .attach_report(&id, &request.report, &classification)
        .await
        .map_err(|e| core_error_response("Failed to store report", e))?;
    Ok(Json(UpdateResponse { updated }))
}

/// Copy every locally stored session to remote storage.
#[utoipa::path(
    post,
    path = "/migrate",
    responses(
        (status = 200, description = "Migration finished", body = MigrationResponse),
        (status = 409, description = "Remote storage is not connected or there is nothing to migrate")
    )
)]
pub async fn migrate_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let summary = app_state
        .coordinator
        .migrate()
        .await
        .map_err(|e| core_error_response("Migration failed", e))?;

    Ok(Json(MigrationResponse {
        migrated: summary.migrated,
        failed: summary.failed,
        skipped: summary.skipped,
        summary: summary.to_string(),
    }))
}

/// Local storage usage against the quota.
#[utoipa::path(
    get,
    path = "/storage",
    responses(
        (status = 200, description = "Current usage", body = StorageResponse)
    )
)]
pub async fn storage_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HandlerError> {
    let usage = app_state
        .coordinator
        .usage()
        .map_err(|e| core_error_response("Failed to read storage usage", e))?;

    Ok(Json(StorageResponse {
        used_bytes: usage.used_bytes,
        quota_bytes: usage.quota_bytes,
        session_count: usage.session_count,
        percent_used: usage.percent_used(),
        display: format!(
            "{} of {}",
            format_bytes(usage.used_bytes),
            format_bytes(usage.quota_bytes)
        ),
    }))
}
