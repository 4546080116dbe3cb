//! Content hashing for change detection.
//!
//! Hashing the serialized JSON of a section collection tells the cycle
//! whether anything visible changed without comparing every field.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a value's JSON serialization.
///
/// A value that fails to serialize hashes as the empty input.
#[must_use]
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_vec(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&json);
    format!("{:x}", hasher.finalize())
}

/// True when there is no previous hash or it differs.
#[must_use]
pub fn has_changed(current_hash: &str, previous_hash: Option<&str>) -> bool {
    previous_hash.is_none_or(|h| h != current_hash)
}
