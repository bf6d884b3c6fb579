// runforge-core/src/core/hashing.rs
// ============================================================================
// Module: Runforge Canonical Codec
// Description: Byte-stable JSON encoding and SHA-256 content hashing.
// Purpose: Provide the single hashing path used for snapshots and identity.
// Dependencies: serde, serde_jcs, serde_json, sha2
// ============================================================================

//! ## Overview
//! Every hash in Runforge flows through this module. Two frozen encodings
//! exist: the *canonical* form (keys sorted recursively, UTF-8 with non-ASCII
//! preserved, 2-space indentation, exactly one trailing newline) used for
//! snapshot and manifest files, and the *compact* form (RFC 8785 JSON
//! canonicalization) used when hashing in-memory maps such as the snapshot
//! digest map. Both forms are byte-stable across platforms.
//!
//! Snapshot digests are always computed from on-disk bytes, never from the
//! in-memory encoded value; see the snapshot writer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Digest
// ============================================================================

/// Prefix carried by every digest string.
pub const SHA256_PREFIX: &str = "sha256:";

/// SHA-256 digest rendered as `sha256:<64 lowercase hex chars>`.
///
/// # Invariants
/// - Serializes as a plain prefixed string.
/// - Constructed values always carry the `sha256:` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Computes the digest of a byte sequence.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        Self(format!("{SHA256_PREFIX}{}", hex_encode(&digest)))
    }

    /// Wraps an already-rendered digest string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the full prefixed digest string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the hex portion with the `sha256:` prefix stripped.
    #[must_use]
    pub fn hex(&self) -> &str {
        self.0.strip_prefix(SHA256_PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Sha256Digest {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Sha256Digest {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the canonical codec.
///
/// Encoding failures indicate unrepresentable values (non-string map keys,
/// non-finite numbers) and are programming errors in the caller.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be serialized to canonical JSON.
    #[error("canonical encoding failed: {0}")]
    Encode(String),
}

// ============================================================================
// SECTION: Canonical Encodings
// ============================================================================

/// Encodes a value into the canonical file form.
///
/// Keys are sorted recursively, non-ASCII characters are preserved, nesting
/// is indented with two spaces, and exactly one trailing newline is appended.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] when the value is unrepresentable.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    // Routing through `serde_json::Value` sorts map keys: the backing map is
    // ordered by key, independent of struct field order.
    let value = serde_json::to_value(value).map_err(|err| CodecError::Encode(err.to_string()))?;
    let mut text =
        serde_json::to_string_pretty(&value).map_err(|err| CodecError::Encode(err.to_string()))?;
    text.push('\n');
    Ok(text.into_bytes())
}

/// Encodes a value into the frozen compact hashing form (RFC 8785).
///
/// # Errors
///
/// Returns [`CodecError::Encode`] when the value is unrepresentable.
pub fn compact_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_jcs::to_vec(value).map_err(|err| CodecError::Encode(err.to_string()))
}

/// Hashes a value through the compact canonical form.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] when the value is unrepresentable.
pub fn hash_canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Sha256Digest, CodecError> {
    let bytes = compact_json_bytes(value)?;
    Ok(Sha256Digest::of_bytes(&bytes))
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let hi = usize::from(byte >> 4);
        let lo = usize::from(byte & 0x0f);
        out.push(char::from(HEX[hi]));
        out.push(char::from(HEX[lo]));
    }
    out
}
