//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use profile_archive_core::capacity::DEFAULT_QUOTA_BYTES;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// No URL means no remote backend; sessions stay in local storage.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub local_store_path: PathBuf,
    pub local_quota_bytes: usize,
    pub remote_timeout: Duration,
    /// Answer "yes" to the clear-local-storage prompt.
    pub auto_clear_on_full: bool,
    /// Answer "yes" to the migrate-local-sessions prompt.
    pub auto_migrate: bool,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Storage Settings ---
        let local_store_path = std::env::var("LOCAL_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/local_store.json"));
        let local_quota_bytes = parse_var("LOCAL_QUOTA_BYTES", DEFAULT_QUOTA_BYTES)?;
        if local_quota_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "LOCAL_QUOTA_BYTES".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let remote_timeout = Duration::from_secs(parse_var("REMOTE_TIMEOUT_SECS", 10u64)?);

        // --- Load Prompt Policy ---
        let auto_clear_on_full = parse_var("AUTO_CLEAR_ON_FULL", false)?;
        let auto_migrate = parse_var("AUTO_MIGRATE", false)?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            local_store_path,
            local_quota_bytes,
            remote_timeout,
            auto_clear_on_full,
            auto_migrate,
            cors_origin,
        })
    }
}

/// Reads and parses an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
