// runforge-core/src/runtime/snapshot.rs
// ============================================================================
// Module: Runforge Snapshot Writer
// Description: Canonical input snapshot persistence with read-back hashing.
// Purpose: Make on-disk bytes the sole source of truth for snapshot digests.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! The snapshot writer encodes resolved inputs canonically, writes them
//! under `inputs/` in the build directory, and then reads the file back to
//! hash the bytes actually on disk. The read-back is mandatory: snapshot
//! digests are computed from file bytes, never from the in-memory encoded
//! form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::core::Sha256Digest;
use crate::core::SnapshotMeta;
use crate::core::SnapshotName;
use crate::core::canonical_json_bytes;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while persisting snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot value could not be encoded canonically.
    #[error("snapshot encoding failed for {name}: {reason}")]
    Encode {
        /// Snapshot name.
        name: String,
        /// Underlying failure.
        reason: String,
    },
    /// Snapshot write or read-back failed.
    #[error("snapshot io error for {name} at {path}: {reason}")]
    Io {
        /// Snapshot name.
        name: String,
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
}

// ============================================================================
// SECTION: Snapshot Writer
// ============================================================================

/// Writes canonical snapshots into a run build directory.
#[derive(Debug)]
pub struct SnapshotWriter {
    /// Build directory root.
    build_dir: PathBuf,
    /// Collected snapshot metadata by name.
    collected: BTreeMap<SnapshotName, SnapshotMeta>,
}

impl SnapshotWriter {
    /// Creates a writer over the given build directory.
    #[must_use]
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            collected: BTreeMap::new(),
        }
    }

    /// Writes one snapshot and records its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] when encoding or I/O fails; the build
    /// directory is left for cleanup and the canonical path is untouched.
    pub fn write<T: Serialize + ?Sized>(
        &mut self,
        name: &SnapshotName,
        value: &T,
    ) -> Result<SnapshotMeta, SnapshotError> {
        let encoded = canonical_json_bytes(value).map_err(|err| SnapshotError::Encode {
            name: name.as_str().to_string(),
            reason: err.to_string(),
        })?;

        let relative = name.file_path();
        let full = self.build_dir.join(&relative);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|err| SnapshotError::Io {
                name: name.as_str().to_string(),
                path: full.display().to_string(),
                reason: err.to_string(),
            })?;
        }
        fs::write(&full, &encoded).map_err(|err| SnapshotError::Io {
            name: name.as_str().to_string(),
            path: full.display().to_string(),
            reason: err.to_string(),
        })?;

        // Hash what landed on disk, not what we encoded.
        let on_disk = fs::read(&full).map_err(|err| SnapshotError::Io {
            name: name.as_str().to_string(),
            path: full.display().to_string(),
            reason: err.to_string(),
        })?;

        let meta = SnapshotMeta {
            path: relative,
            sha256: Sha256Digest::of_bytes(&on_disk),
            bytes: on_disk.len() as u64,
        };
        self.collected.insert(name.clone(), meta.clone());
        Ok(meta)
    }

    /// Returns the digest map for the snapshots written so far.
    #[must_use]
    pub fn digest_map(&self) -> BTreeMap<SnapshotName, Sha256Digest> {
        self.collected.iter().map(|(name, meta)| (name.clone(), meta.sha256.clone())).collect()
    }

    /// Consumes the writer and returns the collected metadata.
    #[must_use]
    pub fn into_metadata(self) -> BTreeMap<SnapshotName, SnapshotMeta> {
        self.collected
    }
}
