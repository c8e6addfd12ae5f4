// flowgate-core/src/core/hashing.rs
// ============================================================================
// Module: Flow Engine Canonical Hashing
// Description: Deterministic content hashing for audit records.
// Purpose: Let operators verify idempotent replay and audit-trail integrity
//          offline, without trusting in-process state.
// Dependencies: serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Audit records (`core::state::AuditRecord`) store a canonical hash of the
//! request/response pair they describe rather than the raw payload, so the
//! audit trail stays bounded and comparable across replays. Canonicalization
//! follows RFC 8785 (JSON Canonicalization Scheme) via `serde_jcs`; hashing is
//! SHA-256.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde::Deserialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Types
// ============================================================================

/// Hash algorithm identifiers recognized by the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256, the only algorithm currently produced by this crate.
    Sha256,
}

/// The hash algorithm new digests are produced with.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

/// A content hash paired with the algorithm that produced it.
///
/// # Invariants
/// - `value` is lowercase hex and has a length matching `algorithm`'s digest size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashDigest {
    /// Algorithm used to produce `value`.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

/// Errors produced while canonicalizing or hashing a value.
#[derive(Debug, Error)]
pub enum HashError {
    /// The value could not be canonicalized to JCS bytes.
    #[error("failed to canonicalize value: {0}")]
    Canonicalize(String),
}

// ============================================================================
// SECTION: Canonicalization & Hashing
// ============================================================================

/// Serializes `value` to RFC 8785 canonical JSON bytes.
///
/// # Errors
///
/// Returns [`HashError::Canonicalize`] when `value` cannot be serialized.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalize(err.to_string()))
}

/// Hashes raw bytes with the default algorithm.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    HashDigest {
        algorithm: DEFAULT_HASH_ALGORITHM,
        value: hex_encode(&digest),
    }
}

/// Canonicalizes then hashes a serializable value.
///
/// # Errors
///
/// Returns [`HashError::Canonicalize`] when `value` cannot be canonicalized.
pub fn hash_canonical_json<T: Serialize>(value: &T) -> Result<HashDigest, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(hash_bytes(&bytes))
}

/// Encodes bytes as lowercase hex without pulling in a dedicated crate.
fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_logical_value_hashes_identically_regardless_of_field_order() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(hash_canonical_json(&a).unwrap().value, hash_canonical_json(&b).unwrap().value);
    }

    #[test]
    fn hash_bytes_is_deterministic() {
        let first = hash_bytes(b"hello");
        let second = hash_bytes(b"hello");
        assert_eq!(first, second);
    }
}
