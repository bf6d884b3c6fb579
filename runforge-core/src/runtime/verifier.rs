// runforge-core/src/runtime/verifier.rs
// ============================================================================
// Module: Runforge Verifier
// Description: Proves run integrity from disk bytes and the manifest alone.
// Purpose: Re-derive every hash and identifier and cross-check the manifest.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! The verifier operates with no knowledge of the stage that produced a
//! run: it reads `manifest.json`, iterates the *declared* snapshot map (no
//! hard-coded name list), re-hashes on-disk bytes, re-runs the identity
//! kernel, and reports per-check results. Mismatches are never thrown;
//! every outcome is a structured report.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::core::MANIFEST_FILE_NAME;
use crate::core::RunManifest;
use crate::core::Sha256Digest;
use crate::core::SnapshotName;
use crate::core::compute_inputs_hash;
use crate::core::derive_run_id;

// ============================================================================
// SECTION: Check Names
// ============================================================================

/// Check: every declared snapshot exists on disk.
pub const CHECK_SNAPSHOTS_PRESENT: &str = "snapshots_present";
/// Check: on-disk snapshot bytes hash to the recorded digests.
pub const CHECK_SNAPSHOT_HASHES: &str = "snapshot_hashes";
/// Check: the identity kernel reproduces the recorded inputs hash.
pub const CHECK_INPUTS_HASH: &str = "inputs_hash_derivation";
/// Check: the recorded run id derives from the inputs hash.
pub const CHECK_RUN_ID: &str = "run_id_derivation";
/// Check: the manifest job id matches the brief snapshot.
pub const CHECK_JOB_ID: &str = "job_id_consistency";
/// Check: chainable runs carry a well-formed prior-artifact snapshot.
pub const CHECK_CHAINABLE: &str = "chainable_structure";

/// Fields a prior-artifact snapshot must declare for drift detection.
const PRIOR_ARTIFACT_FIELDS: &[&str] = &["prior_run_id", "prior_output_hashes", "required_outputs"];

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Result of one verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the check passed.
    pub valid: bool,
    /// Failure descriptions, empty on success.
    pub errors: Vec<String>,
}

impl CheckResult {
    /// A passing check.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing check with the given errors.
    #[must_use]
    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Structured verification report for one run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Run directory that was verified.
    pub run_dir: String,
    /// Overall validity: the conjunction of all checks.
    pub valid: bool,
    /// Per-check breakdown.
    pub checks: BTreeMap<String, CheckResult>,
}

/// Result of the weaker replay probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Run directory that was probed.
    pub run_dir: String,
    /// Whether the run can be replayed idempotently.
    pub can_replay: bool,
    /// Failure descriptions, empty when replayable.
    pub errors: Vec<String>,
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Re-proves a run's integrity from disk bytes and its manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunVerifier;

impl RunVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Verifies a run directory, returning a per-check report.
    #[must_use]
    pub fn verify(&self, run_dir: &Path) -> VerificationReport {
        let mut checks = BTreeMap::new();

        let manifest = match RunManifest::load_from_dir(run_dir) {
            Ok(manifest) => manifest,
            Err(err) => {
                for name in [
                    CHECK_SNAPSHOTS_PRESENT,
                    CHECK_SNAPSHOT_HASHES,
                    CHECK_INPUTS_HASH,
                    CHECK_RUN_ID,
                    CHECK_JOB_ID,
                    CHECK_CHAINABLE,
                ] {
                    checks.insert(name.to_string(), CheckResult::failed(vec![err.to_string()]));
                }
                return VerificationReport {
                    run_dir: run_dir.display().to_string(),
                    valid: false,
                    checks,
                };
            }
        };

        checks.insert(
            CHECK_SNAPSHOTS_PRESENT.to_string(),
            check_snapshots_present(run_dir, &manifest),
        );
        checks
            .insert(CHECK_SNAPSHOT_HASHES.to_string(), check_snapshot_hashes(run_dir, &manifest));
        checks.insert(CHECK_INPUTS_HASH.to_string(), check_inputs_hash(run_dir, &manifest));
        checks.insert(CHECK_RUN_ID.to_string(), check_run_id(&manifest));
        checks.insert(CHECK_JOB_ID.to_string(), check_job_id(run_dir, &manifest));
        checks.insert(CHECK_CHAINABLE.to_string(), check_chainable(run_dir, &manifest));

        let valid = checks.values().all(|check| check.valid);
        VerificationReport {
            run_dir: run_dir.display().to_string(),
            valid,
            checks,
        }
    }

    /// Weaker probe: manifest present, snapshots present, hashes match.
    #[must_use]
    pub fn replay(&self, run_dir: &Path) -> ReplayReport {
        let mut errors = Vec::new();

        if !run_dir.join(MANIFEST_FILE_NAME).is_file() {
            errors.push(format!("manifest missing under {}", run_dir.display()));
            return ReplayReport {
                run_dir: run_dir.display().to_string(),
                can_replay: false,
                errors,
            };
        }
        match RunManifest::load_from_dir(run_dir) {
            Ok(manifest) => {
                let present = check_snapshots_present(run_dir, &manifest);
                errors.extend(present.errors);
                let hashes = check_snapshot_hashes(run_dir, &manifest);
                errors.extend(hashes.errors);
            }
            Err(err) => errors.push(err.to_string()),
        }

        ReplayReport {
            run_dir: run_dir.display().to_string(),
            can_replay: errors.is_empty(),
            errors,
        }
    }
}

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Every snapshot named in the manifest exists on disk.
fn check_snapshots_present(run_dir: &Path, manifest: &RunManifest) -> CheckResult {
    if manifest.input_snapshots.is_empty() {
        return CheckResult::failed(vec!["no input snapshots declared in manifest".to_string()]);
    }
    let mut errors = Vec::new();
    for (name, meta) in &manifest.input_snapshots {
        if !run_dir.join(&meta.path).is_file() {
            errors.push(format!("required snapshot missing: {name} at {}", meta.path));
        }
    }
    if errors.is_empty() { CheckResult::ok() } else { CheckResult::failed(errors) }
}

/// Re-hashing each snapshot file yields the recorded digest.
fn check_snapshot_hashes(run_dir: &Path, manifest: &RunManifest) -> CheckResult {
    let mut errors = Vec::new();
    for (name, meta) in &manifest.input_snapshots {
        let path = run_dir.join(&meta.path);
        match fs::read(&path) {
            Ok(bytes) => {
                let actual = Sha256Digest::of_bytes(&bytes);
                if actual != meta.sha256 {
                    errors.push(format!(
                        "snapshot hash mismatch for {name}: expected {}, got {actual}",
                        meta.sha256
                    ));
                }
            }
            Err(err) => errors.push(format!("snapshot unreadable for {name}: {err}")),
        }
    }
    if errors.is_empty() { CheckResult::ok() } else { CheckResult::failed(errors) }
}

/// The identity kernel, re-run over digests of the on-disk snapshot bytes
/// for the manifest-declared names, reproduces the recorded inputs hash.
///
/// Hashing from disk rather than from the recorded digest map means a
/// tampered snapshot breaks this derivation as well as the per-file check.
fn check_inputs_hash(run_dir: &Path, manifest: &RunManifest) -> CheckResult {
    if manifest.input_snapshots.is_empty() {
        return CheckResult::failed(vec!["no snapshot hashes declared in manifest".to_string()]);
    }
    let mut digest_map: BTreeMap<SnapshotName, Sha256Digest> = BTreeMap::new();
    for (name, meta) in &manifest.input_snapshots {
        match fs::read(run_dir.join(&meta.path)) {
            Ok(bytes) => {
                digest_map.insert(name.clone(), Sha256Digest::of_bytes(&bytes));
            }
            Err(err) => {
                return CheckResult::failed(vec![format!(
                    "snapshot unreadable for {name}: {err}"
                )]);
            }
        }
    }
    match compute_inputs_hash(&digest_map) {
        Ok(recomputed) => {
            if recomputed == manifest.inputs_hash {
                CheckResult::ok()
            } else {
                CheckResult::failed(vec![format!(
                    "inputs_hash mismatch: recorded {}, recomputed {recomputed}",
                    manifest.inputs_hash
                )])
            }
        }
        Err(err) => CheckResult::failed(vec![err.to_string()]),
    }
}

/// The recorded run id derives from the inputs hash, modulo a recorded
/// deterministic collision suffix.
fn check_run_id(manifest: &RunManifest) -> CheckResult {
    let derived = derive_run_id(&manifest.inputs_hash);
    if manifest.run_id.base() == derived.as_str() {
        CheckResult::ok()
    } else {
        CheckResult::failed(vec![format!(
            "run_id mismatch: recorded {}, derived {derived}",
            manifest.run_id
        )])
    }
}

/// The manifest job id equals the job id inside the brief snapshot.
fn check_job_id(run_dir: &Path, manifest: &RunManifest) -> CheckResult {
    let Some(meta) = manifest.input_snapshots.get(&SnapshotName::from(SnapshotName::BRIEF)) else {
        return CheckResult::failed(vec!["brief snapshot not declared in manifest".to_string()]);
    };
    let path = run_dir.join(&meta.path);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => return CheckResult::failed(vec![format!("brief snapshot unreadable: {err}")]),
    };
    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => return CheckResult::failed(vec![format!("brief snapshot malformed: {err}")]),
    };
    match value.get("job_id").and_then(serde_json::Value::as_str) {
        Some(brief_job_id) if brief_job_id == manifest.job_id.as_str() => CheckResult::ok(),
        Some(brief_job_id) => CheckResult::failed(vec![format!(
            "job_id mismatch: brief {brief_job_id}, manifest {}",
            manifest.job_id
        )]),
        None => CheckResult::failed(vec!["brief snapshot missing job_id".to_string()]),
    }
}

/// Chainable runs declare and persist a well-formed prior-artifact
/// snapshot; non-chainable runs must not carry one.
fn check_chainable(run_dir: &Path, manifest: &RunManifest) -> CheckResult {
    let prior_name = SnapshotName::from(SnapshotName::PRIOR_ARTIFACT);
    let is_chainable = manifest
        .chain_metadata
        .as_ref()
        .is_some_and(|chain| chain.is_chainable_stage);

    if !is_chainable {
        if manifest.input_snapshots.contains_key(&prior_name) {
            return CheckResult::failed(vec![
                "non-chainable run declares a prior_artifact snapshot".to_string(),
            ]);
        }
        return CheckResult::ok();
    }

    let Some(meta) = manifest.input_snapshots.get(&prior_name) else {
        return CheckResult::failed(vec![
            "chainable run missing prior_artifact in input_snapshots".to_string(),
        ]);
    };
    let path = run_dir.join(&meta.path);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            return CheckResult::failed(vec![format!("prior_artifact snapshot unreadable: {err}")]);
        }
    };
    let value: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return CheckResult::failed(vec![format!("prior_artifact snapshot malformed: {err}")]);
        }
    };
    let mut errors = Vec::new();
    for field in PRIOR_ARTIFACT_FIELDS {
        if value.get(*field).is_none() {
            errors.push(format!("prior_artifact missing required field: {field}"));
        }
    }
    if errors.is_empty() { CheckResult::ok() } else { CheckResult::failed(errors) }
}
