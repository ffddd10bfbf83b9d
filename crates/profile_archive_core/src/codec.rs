//! crates/profile_archive_core/src/codec.rs
//!
//! Reversible transform between JSON-compatible values and a text-safe string:
//! compact JSON, then standard base64 over the UTF-8 bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload is not serializable as JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Encodes `value` for storage. A failure here is fatal for the save that asked.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_string(value)?;
    Ok(STANDARD.encode(json.as_bytes()))
}

/// Inverse of [`encode`]. Malformed input yields `None` so callers can treat
/// the field as missing instead of failing outright.
pub fn decode(encoded: &str) -> Option<Value> {
    let bytes = match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Discarding payload with invalid base64: {}", e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Discarding payload with invalid JSON: {}", e);
            None
        }
    }
}
