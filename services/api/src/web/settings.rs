//! services/api/src/web/settings.rs
//!
//! Handlers for the crawler API key kept alongside the sessions in local storage.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;

use crate::web::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyStatus {
    pub configured: bool,
    /// The last four characters, e.g. "****abcd".
    pub masked: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

fn mask(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}

fn status_for(key: Option<String>) -> ApiKeyStatus {
    ApiKeyStatus {
        configured: key.is_some(),
        masked: key.as_deref().map(mask),
    }
}

fn store_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("Local settings store failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Failed to access local settings".to_string(),
    )
}

/// Whether a crawler API key is stored.
#[utoipa::path(
    get,
    path = "/settings/api-key",
    responses(
        (status = 200, description = "Key status", body = ApiKeyStatus)
    )
)]
pub async fn get_api_key_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let key = app_state.coordinator.local().api_key().map_err(store_error)?;
    Ok(Json(status_for(key)))
}

/// Store the crawler API key.
#[utoipa::path(
    put,
    path = "/settings/api-key",
    request_body = SetApiKeyRequest,
    responses(
        (status = 200, description = "Key stored", body = ApiKeyStatus),
        (status = 400, description = "The key is empty")
    )
)]
pub async fn set_api_key_handler(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<SetApiKeyRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let key = request.api_key.trim();
    if key.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "API key must not be empty".to_string()));
    }
    let local = app_state.coordinator.local();
    local.set_api_key(key).map_err(store_error)?;
    info!("Crawler API key updated");
    Ok(Json(status_for(local.api_key().map_err(store_error)?)))
}

/// Forget the stored crawler API key.
#[utoipa::path(
    delete,
    path = "/settings/api-key",
    responses(
        (status = 204, description = "Key removed")
    )
)]
pub async fn clear_api_key_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .coordinator
        .local()
        .clear_api_key()
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}
