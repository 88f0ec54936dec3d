//! Content hashing over canonical JSON.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Failure to bring a value into canonical form.
#[derive(Debug, thiserror::Error)]
#[error("canonical encoding failed: {0}")]
pub struct CanonicalError(#[from] serde_json::Error);

/// SHA-256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// SHA-256 digest of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

/// Encode `value` as JSON with every object's keys sorted lexicographically.
///
/// `serde_json::Map` is ordered by key (the `preserve_order` feature is not
/// enabled anywhere in the workspace), so a round trip through [`Value`]
/// normalises the field order of structs and nested maps alike.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let value: Value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// SHA-256 hex digest of the canonical JSON encoding of `value`.
pub fn hash_canonical<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}
