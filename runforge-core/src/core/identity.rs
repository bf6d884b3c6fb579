// runforge-core/src/core/identity.rs
// ============================================================================
// Module: Runforge Identity Kernel
// Description: Derivation of inputs_hash and run_id from snapshot digests.
// Purpose: Bind run identity to the bytes of its canonical input snapshots.
// Dependencies: crate::core::{hashing, identifiers}
// ============================================================================

//! ## Overview
//! The identity chain is `snapshots -> inputs_hash -> run_id`. The
//! `inputs_hash` is the SHA-256 of the compact canonical encoding of the
//! snapshot-name-to-digest map; `run_id` is the first 32 hex characters of
//! that hash. Both derivations are stable under re-ordering of the input
//! map and invariant under any field not present in the map.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::hashing::CodecError;
use crate::core::hashing::Sha256Digest;
use crate::core::hashing::hash_canonical_value;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SnapshotName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of hex characters of the inputs hash retained in a run id.
pub const RUN_ID_HEX_LEN: usize = 32;

// ============================================================================
// SECTION: Derivations
// ============================================================================

/// Computes the combined hash over a snapshot-name-to-digest map.
///
/// The map is encoded in the frozen compact canonical form, so insertion
/// order never influences the result.
///
/// # Errors
///
/// Returns [`CodecError`] when encoding fails; this is a programming error.
pub fn compute_inputs_hash(
    snapshot_hashes: &BTreeMap<SnapshotName, Sha256Digest>,
) -> Result<Sha256Digest, CodecError> {
    hash_canonical_value(snapshot_hashes)
}

/// Derives the base run identifier from an inputs hash.
///
/// The run id is the first [`RUN_ID_HEX_LEN`] characters of the hex digest.
/// Collision suffixing is handled by the run directory manager via
/// [`RunId::with_suffix`]; the suffix never feeds back into hashing.
#[must_use]
pub fn derive_run_id(inputs_hash: &Sha256Digest) -> RunId {
    let hex = inputs_hash.hex();
    let end = hex.len().min(RUN_ID_HEX_LEN);
    RunId::new(&hex[..end])
}
