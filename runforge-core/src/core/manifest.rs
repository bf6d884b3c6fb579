// runforge-core/src/core/manifest.rs
// ============================================================================
// Module: Runforge Run Manifest
// Description: Canonical record of a run and its projections.
// Purpose: Record identity, snapshots, doctrine, outputs, and migrations.
// Dependencies: crate::core::{doctrine, hashing, identifiers}, serde
// ============================================================================

//! ## Overview
//! The manifest is the authoritative record of a run, written as
//! `manifest.json` in the run directory. Two projections exist: the *full*
//! projection (what is written to disk, including volatile fields) and the
//! *deterministic* projection (volatile fields removed), which is
//! byte-stable across runs with identical inputs and is the form compared
//! across processes and implementations.
//!
//! The filesystem is authoritative: any external index is rebuilt from
//! manifests and never consulted by the core.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::doctrine::DoctrineReference;
use crate::core::hashing::CodecError;
use crate::core::hashing::Sha256Digest;
use crate::core::hashing::canonical_json_bytes;
use crate::core::identifiers::JobId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::SnapshotName;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current manifest schema version.
pub const MANIFEST_SCHEMA_VERSION: &str = "1.2.0";

/// Manifest file name within a run directory.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Top-level fields excluded from the deterministic projection.
///
/// The doctrine `resolved_at` field needs no entry here: it is never
/// serialized at all.
pub const VOLATILE_FIELDS: &[&str] = &["started_at", "finished_at", "langfuse_trace_id", "error"];

// ============================================================================
// SECTION: Status
// ============================================================================

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Payload execution in progress; never visible at the canonical path.
    Running,
    /// Run finalized with all outputs written.
    Succeeded,
    /// Payload failed; snapshots and manifest are still finalized.
    Failed,
    /// Inputs matched an existing finalized run; no new artifact written.
    IdempotentReplay,
}

// ============================================================================
// SECTION: Metadata Records
// ============================================================================

/// Metadata for one canonical input snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Run-relative path, e.g. `inputs/brief.resolved.json`.
    pub path: String,
    /// Digest of the on-disk snapshot bytes.
    pub sha256: Sha256Digest,
    /// Snapshot size in bytes.
    pub bytes: u64,
}

/// Metadata for one output artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Run-relative path, e.g. `outputs/output.md`.
    pub path: String,
    /// Digest of the artifact bytes.
    pub sha256: Sha256Digest,
    /// Artifact size in bytes.
    pub bytes: u64,
}

/// Reference to one upstream stage consumed by a chainable run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorStageRef {
    /// Upstream run identifier.
    pub prior_run_id: RunId,
    /// Upstream governance job identifier.
    pub prior_job_id: JobId,
    /// Upstream stage label.
    pub prior_stage: String,
}

/// Chain metadata recorded for chainable stages.
///
/// The data model permits multiple priors; current pipelines bind at most
/// one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    /// Whether this run consumed a prior run's outputs.
    pub is_chainable_stage: bool,
    /// Upstream stages, in binding order.
    #[serde(default)]
    pub prior_stages: Vec<PriorStageRef>,
}

/// Audit record of one applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Schema version before migration.
    pub from_version: String,
    /// Schema version after migration.
    pub to_version: String,
    /// RFC-3339 application time.
    pub applied_at: String,
    /// Human-readable change list.
    pub changes: Vec<String>,
    /// Manifest checksum before migration.
    pub checksum_before: Sha256Digest,
    /// Manifest checksum after migration.
    pub checksum_after: Sha256Digest,
}

// ============================================================================
// SECTION: Run Manifest
// ============================================================================

/// Canonical record of a run.
///
/// # Invariants
/// - `job_id` and the snapshot map are immutable once finalized.
/// - Volatile fields ([`VOLATILE_FIELDS`]) never participate in the
///   deterministic projection.
/// - Migration may only touch `schema_version`, `migration_history`, and
///   newly introduced optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Manifest schema version.
    pub schema_version: String,
    /// Governance job identifier from the brief.
    pub job_id: JobId,
    /// Content-addressed run identifier.
    pub run_id: RunId,
    /// Ephemeral queue identifier; audited but never hashed.
    #[serde(default)]
    pub queue_job_id: Option<String>,
    /// Repo-relative path to the source brief.
    pub job_ref: String,
    /// Job type tag.
    pub job_type: String,
    /// Run status.
    pub status: RunStatus,
    /// Combined digest over the snapshot map.
    pub inputs_hash: Sha256Digest,
    /// Canonical input snapshots by name.
    pub input_snapshots: BTreeMap<SnapshotName, SnapshotMeta>,
    /// Doctrine reference used by the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctrine: Option<DoctrineReference>,
    /// Output artifacts by logical name.
    pub artifacts: BTreeMap<String, ArtifactEntry>,
    /// Chain metadata; present for chainable stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_metadata: Option<ChainMetadata>,
    /// Append-only migration audit trail.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub migration_history: Vec<MigrationRecord>,
    /// Run start time (volatile).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Run finish time (volatile).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Observability trace identifier (volatile).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub langfuse_trace_id: Option<String>,
    /// Payload failure description (volatile).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunManifest {
    /// Returns the deterministic projection as a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when encoding fails.
    pub fn deterministic_projection(&self) -> Result<Value, CodecError> {
        let mut value =
            serde_json::to_value(self).map_err(|err| CodecError::Encode(err.to_string()))?;
        if let Value::Object(map) = &mut value {
            for field in VOLATILE_FIELDS {
                map.remove(*field);
            }
        }
        Ok(value)
    }

    /// Returns the canonical bytes of the deterministic projection.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when encoding fails.
    pub fn deterministic_bytes(&self) -> Result<Vec<u8>, CodecError> {
        canonical_json_bytes(&self.deterministic_projection()?)
    }

    /// Returns the canonical bytes of the full projection.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when encoding fails.
    pub fn full_bytes(&self) -> Result<Vec<u8>, CodecError> {
        canonical_json_bytes(self)
    }

    /// Loads a manifest from a run directory.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the file is missing or malformed.
    pub fn load_from_dir(run_dir: &Path) -> Result<Self, ManifestError> {
        Self::load(&run_dir.join(MANIFEST_FILE_NAME))
    }

    /// Loads a manifest from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the file is missing or malformed.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = fs::read(path).map_err(|err| ManifestError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|err| ManifestError::Parse {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }

    /// Writes the full projection to the given path in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when encoding or writing fails.
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let bytes = self.full_bytes().map_err(|err| ManifestError::Encode(err.to_string()))?;
        fs::write(path, bytes).map_err(|err| ManifestError::Io {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while reading or writing manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest I/O failure.
    #[error("manifest io error at {path}: {reason}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// Manifest JSON failed to parse.
    #[error("manifest parse error at {path}: {reason}")]
    Parse {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// Manifest could not be encoded.
    #[error("manifest encode error: {0}")]
    Encode(String),
}
