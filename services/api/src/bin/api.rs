//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{FileKeyValueStore, PgSessionStore, PolicyConfirmation},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method};
use axum::Router;
use profile_archive_core::ports::RemoteSessionStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open Local Storage ---
    let local = Arc::new(FileKeyValueStore::open(
        &config.local_store_path,
        config.local_quota_bytes,
    )?);
    info!("Local session store at {}", local.path().display());

    // --- 3. Connect to the Remote Store (optional) ---
    let remote: Option<Arc<dyn RemoteSessionStore>> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(config.remote_timeout)
                .connect_lazy(url)?;
            let store = Arc::new(PgSessionStore::new(db_pool));
            info!("Running database migrations...");
            // An unreachable database is not fatal; the coordinator degrades to local storage.
            match store.run_migrations().await {
                Ok(()) => info!("Database migrations complete."),
                Err(e) => warn!("Database migrations skipped: {}", e),
            }
            Some(store as Arc<dyn RemoteSessionStore>)
        }
        None => {
            info!("DATABASE_URL not set; sessions will be kept in local storage only.");
            None
        }
    };

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        local,
        remote,
        Arc::new(PolicyConfirmation::from_config(&config)),
    ));
    let backend = app_state.coordinator.start().await;
    info!("Session backend: {:?}", backend);
    if config.auto_migrate {
        match app_state.coordinator.offer_migration().await {
            Ok(Some(summary)) => info!("Startup migration: {}", summary),
            Ok(None) => {}
            Err(e) => warn!("Startup migration failed: {}", e),
        }
    }

    // --- 5. Create the Web Router ---
    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
