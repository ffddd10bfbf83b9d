//! crates/profile_archive_core/src/capacity.rs
//!
//! Quota accounting and eviction policy for the local store. The remote store
//! is treated as unbounded and never passes through here.

use serde::Serialize;

use crate::domain::Session;
use crate::ports::{KeyValueStore, StoreResult};

/// Fixed local capacity ceiling: 5 MiB.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;
/// Fraction of the quota past which the store counts as nearly full.
pub const NEAR_QUOTA_RATIO: f64 = 0.8;
/// Sessions kept by proactive eviction once the store is nearly full.
pub const PROACTIVE_KEEP: usize = 3;
/// Hard cap on locally stored sessions after every save.
pub const MAX_LOCAL_SESSIONS: usize = 5;
/// Older sessions kept next to the new one when a write still overflows.
pub const EMERGENCY_KEEP: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityPolicy {
    pub quota_bytes: usize,
    pub near_quota_ratio: f64,
    pub proactive_keep: usize,
    pub max_sessions: usize,
    pub emergency_keep: usize,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self {
            quota_bytes: DEFAULT_QUOTA_BYTES,
            near_quota_ratio: NEAR_QUOTA_RATIO,
            proactive_keep: PROACTIVE_KEEP,
            max_sessions: MAX_LOCAL_SESSIONS,
            emergency_keep: EMERGENCY_KEEP,
        }
    }
}

impl CapacityPolicy {
    /// The default policy with a different quota.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes,
            ..Self::default()
        }
    }

    pub fn near_quota_threshold(&self) -> usize {
        (self.quota_bytes as f64 * self.near_quota_ratio) as usize
    }

    pub fn is_near_quota(&self, usage: usize) -> bool {
        usage > self.near_quota_threshold()
    }

    pub fn would_overflow(&self, usage: usize, additional: usize) -> bool {
        usage.saturating_add(additional) > self.quota_bytes
    }
}

/// Sum of the lengths of every value held in `store`, session collection and
/// side keys alike.
pub fn current_usage_bytes(store: &dyn KeyValueStore) -> StoreResult<usize> {
    let mut total = 0;
    for key in store.keys()? {
        if let Some(value) = store.get(&key)? {
            total += value.len();
        }
    }
    Ok(total)
}

/// Keeps the `keep` newest sessions by `created_at`, newest first. The sort is
/// stable, so equal timestamps keep their original relative order.
pub fn evict_to(mut sessions: Vec<Session>, keep: usize) -> Vec<Session> {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sessions.truncate(keep);
    sessions
}

/// Byte and session counts for the storage-usage display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StorageUsage {
    pub used_bytes: usize,
    pub session_count: usize,
    pub quota_bytes: usize,
}

impl StorageUsage {
    pub fn percent_used(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 100.0;
        }
        self.used_bytes as f64 * 100.0 / self.quota_bytes as f64
    }
}

/// Human-readable size, e.g. `1.5 KB`.
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
