pub mod rest;
pub mod settings;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};

pub use rest::{
    attach_report_handler, crawl_session_handler, create_session_handler, delete_session_handler,
    get_session_handler, list_sessions_handler, migrate_handler, storage_handler,
    update_metadata_handler, upload_session_handler,
};
pub use settings::{clear_api_key_handler, get_api_key_handler, set_api_key_handler};
pub use state::AppState;

/// Uploads carry two JSON files; keep them well above the local quota.
const BODY_LIMIT_BYTES: usize = 20 * 1024 * 1024;

/// All API routes with their shared state applied.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions_handler).post(create_session_handler))
        .route("/sessions/upload", post(upload_session_handler))
        .route("/sessions/crawl", post(crawl_session_handler))
        .route(
            "/sessions/{origin}/{id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/sessions/{origin}/{id}/metadata", patch(update_metadata_handler))
        .route("/sessions/{origin}/{id}/report", put(attach_report_handler))
        .route("/migrate", post(migrate_handler))
        .route("/storage", get(storage_handler))
        .route(
            "/settings/api-key",
            get(get_api_key_handler)
                .put(set_api_key_handler)
                .delete(clear_api_key_handler),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(app_state)
}
