//! crates/profile_archive_core/src/intake.rs
//!
//! Turns crawl results and uploaded JSON files into session drafts, applying
//! the light shape checks that decide whether the data is worth saving.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::codec::{self, CodecError};
use crate::domain::{Metadata, Session, SessionId};

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("session name must not be empty")]
    EmptyName,
    #[error("{field} file is not valid JSON: {reason}")]
    InvalidJson { field: &'static str, reason: String },
    #[error("profile file must contain a non-empty array with a title, name or facebookUrl")]
    InvalidProfile,
    #[error("posts file must contain an array of posts with text, media or timestamp")]
    InvalidPosts,
    #[error("crawl returned no results")]
    NoResults,
    #[error("crawl timed out after {attempts} status checks")]
    CrawlTimedOut { attempts: u32 },
    #[error("crawl failed: {0}")]
    CrawlFailed(String),
}

//=========================================================================================
// Session Draft
//=========================================================================================

/// Everything needed to create a session, before it is encoded and stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDraft {
    pub name: String,
    pub profile: Value,
    pub posts: Value,
    #[serde(default)]
    pub metadata: Metadata,
}

impl SessionDraft {
    pub fn new(name: impl Into<String>, profile: Value, posts: Value) -> Self {
        Self {
            name: name.into(),
            profile,
            posts,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn validate(&self) -> Result<(), IntakeError> {
        if self.name.trim().is_empty() {
            return Err(IntakeError::EmptyName);
        }
        Ok(())
    }

    /// Builds a draft from the text of an uploaded profile file and posts file.
    pub fn from_uploads(
        name: impl Into<String>,
        profile_json: &str,
        posts_json: &str,
    ) -> Result<Self, IntakeError> {
        let profile: Value =
            serde_json::from_str(profile_json).map_err(|e| IntakeError::InvalidJson {
                field: "profile",
                reason: e.to_string(),
            })?;
        let recognizable_profile = profile
            .as_array()
            .and_then(|items| items.first())
            .map(|first| has_any_key(first, &["title", "name", "facebookUrl"]))
            .unwrap_or(false);
        if !recognizable_profile {
            return Err(IntakeError::InvalidProfile);
        }

        let posts: Value =
            serde_json::from_str(posts_json).map_err(|e| IntakeError::InvalidJson {
                field: "posts",
                reason: e.to_string(),
            })?;
        let items = posts.as_array().ok_or(IntakeError::InvalidPosts)?;
        if let Some(first) = items.first() {
            if !has_any_key(first, &["text", "media", "timestamp"]) {
                return Err(IntakeError::InvalidPosts);
            }
        }

        let draft = Self::new(name, profile, posts);
        draft.validate()?;
        Ok(draft)
    }

    /// Builds a multi-account draft from a finished crawl. The accounts land in
    /// the profile payload; the posts payload is left empty.
    pub fn from_crawl(name: impl Into<String>, outcome: CrawlOutcome) -> Result<Self, IntakeError> {
        let results = match outcome {
            CrawlOutcome::Completed(results) => results,
            CrawlOutcome::TimedOut { attempts } => {
                return Err(IntakeError::CrawlTimedOut { attempts })
            }
            CrawlOutcome::Failed(reason) => return Err(IntakeError::CrawlFailed(reason)),
        };
        if results.is_empty() {
            return Err(IntakeError::NoResults);
        }

        let base_id = Utc::now().timestamp_millis();
        let accounts: Vec<Value> = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| {
                json!({
                    "id": result.id.unwrap_or_else(|| (base_id + index as i64).to_string()),
                    "name": result.name.unwrap_or_else(|| format!("Account {}", index + 1)),
                    "profile": result.profile,
                    "posts": result.posts,
                })
            })
            .collect();

        let draft = Self::new(name, json!({ "accounts": accounts }), json!([]));
        draft.validate()?;
        Ok(draft)
    }

    /// Encodes both payloads and produces a session that still carries the
    /// decoded values for immediate use.
    pub fn into_session(self) -> Result<Session, CodecError> {
        let compressed_profile = codec::encode(&self.profile)?;
        let compressed_posts = codec::encode(&self.posts)?;
        Ok(Session {
            id: SessionId::local_now(),
            name: self.name.trim().to_string(),
            created_at: Utc::now(),
            updated_at: None,
            compressed_profile,
            compressed_posts,
            metadata: self.metadata,
            remote_copy: None,
            profile: Some(self.profile),
            posts: Some(self.posts),
        })
    }
}

fn has_any_key(value: &Value, keys: &[&str]) -> bool {
    value
        .as_object()
        .map(|object| keys.iter().any(|key| object.get(*key).is_some_and(|v| !v.is_null())))
        .unwrap_or(false)
}

//=========================================================================================
// Crawl Results
//=========================================================================================

/// One crawled account as handed over by the crawler workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub profile: Value,
    #[serde(default)]
    pub posts: Value,
}

/// How a crawl run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlOutcome {
    Completed(Vec<CrawlResult>),
    TimedOut { attempts: u32 },
    Failed(String),
}
