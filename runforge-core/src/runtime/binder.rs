// runforge-core/src/runtime/binder.rs
// ============================================================================
// Module: Runforge Prior-Artifact Binder
// Description: Discovery and hashing of upstream run outputs.
// Purpose: Bind a chainable stage to its prior run via a hashed snapshot.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! A chainable stage consumes a finalized upstream run as a first-class
//! hashed input. The binder locates the prior run on disk, validates that
//! the declared outputs exist, hashes their current bytes, and assembles
//! the binding record that becomes the `prior_artifact` snapshot. Because a
//! prior must already be finalized on disk, chains are acyclic by
//! construction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::ChainInputs;
use crate::core::JobId;
use crate::core::MANIFEST_FILE_NAME;
use crate::core::RunId;
use crate::core::RunManifest;
use crate::core::Sha256Digest;
use crate::runtime::rundir::LEGACY_RUNS_DIR;

// ============================================================================
// SECTION: Binding Record
// ============================================================================

/// Determinism-critical subset of the prior run's manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorManifestSubset {
    /// Upstream governance job identifier.
    pub job_id: JobId,
    /// Upstream run identifier.
    pub run_id: RunId,
    /// Upstream job type.
    pub job_type: String,
    /// Upstream inputs hash.
    pub inputs_hash: Sha256Digest,
}

/// Prior-artifact binding emitted as the `prior_artifact` snapshot.
///
/// # Invariants
/// - `prior_output_hashes` reflects the bytes of the prior outputs at
///   binding time; out-of-band mutation of a prior output therefore changes
///   this run's identity on re-binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorArtifactBinding {
    /// Upstream run identifier.
    pub prior_run_id: RunId,
    /// Upstream governance job identifier.
    pub prior_job_id: JobId,
    /// Upstream stage label.
    pub prior_stage: String,
    /// Subset of the upstream manifest.
    pub prior_manifest: PriorManifestSubset,
    /// Output files the upstream run must provide.
    pub required_outputs: Vec<String>,
    /// Digests of the required outputs at binding time.
    pub prior_output_hashes: BTreeMap<String, Sha256Digest>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while binding a prior artifact.
#[derive(Debug, Error)]
pub enum BinderError {
    /// No finalized run directory matches the requested prior run id.
    #[error("prior run not found: {0}")]
    PriorRunNotFound(RunId),
    /// A required output file is missing from the prior run.
    #[error("prior output missing: {0}")]
    PriorOutputMissing(String),
    /// The prior manifest disagrees with the requested binding.
    #[error("prior manifest inconsistent: {0}")]
    PriorManifestInconsistent(String),
    /// Prior run files could not be read.
    #[error("prior artifact io error at {path}: {reason}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
}

// ============================================================================
// SECTION: Prior-Artifact Binder
// ============================================================================

/// Locates and binds prior runs under an artifacts root.
#[derive(Debug, Clone)]
pub struct PriorArtifactBinder {
    /// Artifacts root directory.
    artifacts_root: PathBuf,
}

impl PriorArtifactBinder {
    /// Creates a binder over the given artifacts root.
    #[must_use]
    pub fn new(artifacts_root: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_root: artifacts_root.into(),
        }
    }

    /// Binds the chain inputs to the prior run on disk.
    ///
    /// Job directories are scanned in lexicographic order; the first one
    /// containing `<prior_run_id>/manifest.json` wins. The legacy alias
    /// tree is skipped so links never shadow canonical directories.
    ///
    /// # Errors
    ///
    /// Returns [`BinderError`] when the prior run cannot be located or
    /// validated; binding performs no filesystem mutation.
    pub fn bind(&self, chain: &ChainInputs) -> Result<PriorArtifactBinding, BinderError> {
        let (prior_job_id, prior_dir) = self.locate(&chain.prior_run_id)?;
        let manifest = RunManifest::load_from_dir(&prior_dir)
            .map_err(|err| BinderError::PriorManifestInconsistent(err.to_string()))?;

        if manifest.run_id != chain.prior_run_id {
            return Err(BinderError::PriorManifestInconsistent(format!(
                "manifest run_id {} does not match requested prior {}",
                manifest.run_id, chain.prior_run_id
            )));
        }

        let mut prior_output_hashes = BTreeMap::new();
        for output in &chain.required_outputs {
            let path = prior_dir.join("outputs").join(output);
            if !path.is_file() {
                return Err(BinderError::PriorOutputMissing(format!(
                    "{}/outputs/{output}",
                    chain.prior_run_id
                )));
            }
            let bytes = fs::read(&path).map_err(|err| BinderError::Io {
                path: path.display().to_string(),
                reason: err.to_string(),
            })?;
            prior_output_hashes.insert(output.clone(), Sha256Digest::of_bytes(&bytes));
        }

        Ok(PriorArtifactBinding {
            prior_run_id: chain.prior_run_id.clone(),
            prior_job_id,
            prior_stage: chain.prior_stage.clone(),
            prior_manifest: PriorManifestSubset {
                job_id: manifest.job_id,
                run_id: manifest.run_id,
                job_type: manifest.job_type,
                inputs_hash: manifest.inputs_hash,
            },
            required_outputs: chain.required_outputs.clone(),
            prior_output_hashes,
        })
    }

    /// Finds the job directory containing the prior run.
    fn locate(&self, prior_run_id: &RunId) -> Result<(JobId, PathBuf), BinderError> {
        let mut job_names = Vec::new();
        let entries = fs::read_dir(&self.artifacts_root).map_err(|err| BinderError::Io {
            path: self.artifacts_root.display().to_string(),
            reason: err.to_string(),
        })?;
        for entry in entries {
            let entry = entry.map_err(|err| BinderError::Io {
                path: self.artifacts_root.display().to_string(),
                reason: err.to_string(),
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == LEGACY_RUNS_DIR || name.starts_with('.') {
                continue;
            }
            if entry.path().is_dir() {
                job_names.push(name);
            }
        }
        job_names.sort();

        for name in job_names {
            let candidate = self.artifacts_root.join(&name).join(prior_run_id.as_str());
            if candidate.join(MANIFEST_FILE_NAME).is_file() {
                return Ok((JobId::new(name), candidate));
            }
        }
        Err(BinderError::PriorRunNotFound(prior_run_id.clone()))
    }
}
