//! services/api/src/adapters/confirm.rs
//!
//! Answers the core's confirmation prompts from configuration, since an HTTP
//! service has nobody to ask mid-request.

use async_trait::async_trait;
use profile_archive_core::ports::{ConfirmPrompt, Confirmation};
use tracing::info;

use crate::config::Config;

#[derive(Debug, Clone, Copy)]
pub struct PolicyConfirmation {
    pub clear_on_full: bool,
    pub migrate: bool,
}

impl PolicyConfirmation {
    pub fn from_config(config: &Config) -> Self {
        Self {
            clear_on_full: config.auto_clear_on_full,
            migrate: config.auto_migrate,
        }
    }
}

#[async_trait]
impl Confirmation for PolicyConfirmation {
    async fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        let answer = match prompt {
            ConfirmPrompt::ClearLocalSessions { .. } => self.clear_on_full,
            ConfirmPrompt::MigrateLocalSessions { .. } => self.migrate,
        };
        info!("{} -> {}", prompt.message(), if answer { "yes" } else { "no" });
        answer
    }
}
