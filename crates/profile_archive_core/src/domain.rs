//! crates/profile_archive_core/src/domain.rs
//!
//! Defines the core data structures for archived profile sessions.
//! Profile and post payloads stay loosely typed (`serde_json::Value`); the core
//! only ever looks at their size and presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::codec;

/// Open mapping of analyst annotations, report edits and classifications.
pub type Metadata = Map<String, Value>;

/// Metadata key holding the generated (and possibly edited) narrative report.
pub const REPORT_KEY: &str = "intelligence_report";
/// Metadata key holding the `{level, description, color}` classification.
pub const CLASSIFICATION_KEY: &str = "threat_classification";

//=========================================================================================
// Identity
//=========================================================================================

/// Which backend owns a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Local => "local",
            Origin::Remote => "remote",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session identifier tagged with the id space it was minted in.
///
/// Local ids are time-based numeric strings; remote ids are server-assigned
/// UUIDs. The two spaces are disjoint and never resolved against each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "origin", content = "id", rename_all = "lowercase")]
pub enum SessionId {
    Local(String),
    Remote(Uuid),
}

impl SessionId {
    /// A fresh local-style id derived from the current time in milliseconds.
    pub fn local_now() -> Self {
        SessionId::Local(Utc::now().timestamp_millis().to_string())
    }

    pub fn origin(&self) -> Origin {
        match self {
            SessionId::Local(_) => Origin::Local,
            SessionId::Remote(_) => Origin::Remote,
        }
    }

    pub fn remote(&self) -> Option<Uuid> {
        match self {
            SessionId::Remote(id) => Some(*id),
            SessionId::Local(_) => None,
        }
    }

    /// Rebuilds an id from its origin tag and raw value, e.g. from a URL path.
    pub fn parse(origin: &str, raw: &str) -> Option<Self> {
        match origin {
            "local" if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) => {
                Some(SessionId::Local(raw.to_string()))
            }
            "remote" => Uuid::parse_str(raw).ok().map(SessionId::Remote),
            _ => None,
        }
    }

    /// The raw id without its origin tag.
    pub fn raw(&self) -> String {
        match self {
            SessionId::Local(id) => id.clone(),
            SessionId::Remote(id) => id.to_string(),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionId::Local(id) => write!(f, "local:{}", id),
            SessionId::Remote(id) => write!(f, "remote:{}", id),
        }
    }
}

//=========================================================================================
// Session
//=========================================================================================

/// The unit of persistence: one profile payload, one posts payload, plus metadata.
///
/// At rest only the compressed forms exist; `profile` and `posts` are the
/// decoded payloads carried while a session is in use and are never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub compressed_profile: String,
    pub compressed_posts: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Remote id of the copy made by migration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_copy: Option<Uuid>,
    #[serde(skip)]
    pub profile: Option<Value>,
    #[serde(skip)]
    pub posts: Option<Value>,
}

impl Session {
    pub fn origin(&self) -> Origin {
        self.id.origin()
    }

    /// Sum of the encoded payload lengths, used for display and quota accounting.
    pub fn size_bytes(&self) -> usize {
        self.compressed_profile.len() + self.compressed_posts.len()
    }

    pub fn is_decoded(&self) -> bool {
        self.profile.is_some() && self.posts.is_some()
    }

    /// True if `id` names this session, either directly or through its
    /// migrated remote copy.
    pub fn matches(&self, id: &SessionId) -> bool {
        if self.id == *id {
            return true;
        }
        match (id, self.remote_copy) {
            (SessionId::Remote(remote), Some(copy)) => *remote == copy,
            _ => false,
        }
    }

    /// Decodes whichever payload is still only available in compressed form.
    /// A payload that fails to decode stays `None`.
    pub fn hydrate(mut self) -> Self {
        if self.profile.is_none() {
            self.profile = codec::decode(&self.compressed_profile);
        }
        if self.posts.is_none() {
            self.posts = codec::decode(&self.compressed_posts);
        }
        self
    }

    /// Moves decoded payloads from `source` onto `self` where `self` has none.
    pub fn with_payload_from(mut self, source: &Session) -> Self {
        if self.profile.is_none() {
            self.profile = source.profile.clone();
        }
        if self.posts.is_none() {
            self.posts = source.posts.clone();
        }
        self
    }
}

/// Shallow merge: keys in `patch` overwrite keys in `target`, all others survive.
pub fn merge_metadata(target: &mut Metadata, patch: Metadata) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

//=========================================================================================
// Report output stored under metadata
//=========================================================================================

/// Classification produced by the narrative generator. Stored, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportClassification {
    pub level: String,
    pub description: String,
    pub color: String,
}

//=========================================================================================
// User-facing status
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A short, dismissable message for toast/modal display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub severity: Severity,
    pub text: String,
}

impl StatusMessage {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(Severity::Success, text)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }
}
