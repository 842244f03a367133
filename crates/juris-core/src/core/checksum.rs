// crates/juris-core/src/core/checksum.rs
// ============================================================================
// Module: Juris Content Hashing
// Description: SHA-256 digests and RFC 8785 canonical JSON bytes.
// Purpose: Provide deterministic digests for snapshots and audit payloads.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Two canonical byte forms are hashed in Juris. Leaderboard snapshots hash a
//! fixed pipe/semicolon row encoding that is part of the external contract.
//! Audit payloads hash RFC 8785 (JCS) canonical JSON so stores can verify
//! integrity on load and fail closed on corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Hashes raw bytes with SHA-256, returning 64 lowercase hex characters.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes a serializable value over its RFC 8785 canonical JSON bytes.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn hash_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, HashError> {
    let bytes = canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
