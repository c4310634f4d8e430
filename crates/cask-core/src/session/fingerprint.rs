//! Change detection over serialized session data.

use sha2::{Digest, Sha256};

use super::SessionData;

/// SHA-256 hex digest of the JSON serialization of `data`.
///
/// `serde_json::Map` keeps keys sorted, so equal content always produces
/// equal digests.
pub fn fingerprint(data: &SessionData) -> String {
    // Serializing a map of JSON values cannot fail.
    let serialized = serde_json::to_string(data).unwrap_or_default();
    content_hash(&serialized)
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
