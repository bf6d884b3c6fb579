// runforge-core/tests/verifier.rs
// ============================================================================
// Module: Verifier Tests
// Description: Tests for integrity verification and the replay probe.
// ============================================================================
//! ## Overview
//! Validates that finalized runs verify from disk alone and that byte
//! tampering, missing snapshots, and broken chain structure are caught.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use std::fs;
use std::path::PathBuf;

use runforge_core::RunRequest;
use runforge_core::RunVerifier;

const JOB_REF: &str = "jobs/demo-001/brief.yaml";

fn finalized_run(repo: &tempfile::TempDir) -> PathBuf {
    common::write_file(repo.path(), JOB_REF, &common::basic_brief("demo-001"));
    let engine = common::engine_for(repo.path());
    let manifest = engine
        .execute_run(&RunRequest {
            job_ref: JOB_REF.to_string(),
            queue_job_id: None,
        })
        .expect("execute run");
    repo.path().join("artifacts").join("demo-001").join(manifest.run_id.as_str())
}

/// Every finalized run verifies from on-disk bytes and the manifest alone.
#[test]
fn finalized_run_verifies_clean() {
    let repo = common::scaffold_repo("hello\n");
    let run_dir = finalized_run(&repo);

    let report = RunVerifier::new().verify(&run_dir);
    assert!(report.valid, "checks: {:?}", report.checks);
    for (name, check) in &report.checks {
        assert!(check.valid, "check {name} failed: {:?}", check.errors);
    }
}

/// Tampering one snapshot byte breaks the per-file hashes and the re-run
/// identity derivation, while job id consistency may survive.
#[test]
fn verifier_catches_snapshot_tamper() {
    let repo = common::scaffold_repo("hello\n");
    let run_dir = finalized_run(&repo);

    let brief_path = run_dir.join("inputs/brief.resolved.json");
    let text = fs::read_to_string(&brief_path).expect("read brief snapshot");
    fs::write(&brief_path, text.replace("confident", "confidenX")).expect("tamper brief");

    let report = RunVerifier::new().verify(&run_dir);
    assert!(!report.valid);
    assert!(!report.checks["snapshot_hashes"].valid);
    assert!(!report.checks["inputs_hash_derivation"].valid);
    assert!(report.checks["job_id_consistency"].valid);
}

/// A deleted snapshot fails presence, hashing, and derivation.
#[test]
fn verifier_catches_missing_snapshot() {
    let repo = common::scaffold_repo("hello\n");
    let run_dir = finalized_run(&repo);
    fs::remove_file(run_dir.join("inputs/context.resolved.json")).expect("remove snapshot");

    let report = RunVerifier::new().verify(&run_dir);
    assert!(!report.valid);
    assert!(!report.checks["snapshots_present"].valid);
    assert!(!report.checks["inputs_hash_derivation"].valid);
}

/// Rewriting the recorded job id breaks consistency with the brief
/// snapshot.
#[test]
fn verifier_catches_job_id_drift() {
    let repo = common::scaffold_repo("hello\n");
    let run_dir = finalized_run(&repo);

    let manifest_path = run_dir.join("manifest.json");
    let text = fs::read_to_string(&manifest_path).expect("read manifest");
    fs::write(&manifest_path, text.replace("\"demo-001\"", "\"demo-999\"")).expect("rewrite");

    let report = RunVerifier::new().verify(&run_dir);
    assert!(!report.valid);
    assert!(!report.checks["job_id_consistency"].valid);
}

/// Chainable runs verify their prior-artifact snapshot structure.
#[test]
fn verifier_validates_chainable_structure() {
    let repo = common::scaffold_repo("hello\n");
    common::write_file(repo.path(), JOB_REF, &common::basic_brief("demo-001"));
    let engine = common::engine_for(repo.path());
    let prior = engine
        .execute_run(&RunRequest {
            job_ref: JOB_REF.to_string(),
            queue_job_id: None,
        })
        .expect("prior run");

    common::write_file(
        repo.path(),
        "jobs/demo-002/brief.yaml",
        &common::chain_brief("demo-002", prior.run_id.as_str(), "output.md"),
    );
    let chained = engine
        .execute_run(&RunRequest {
            job_ref: "jobs/demo-002/brief.yaml".to_string(),
            queue_job_id: None,
        })
        .expect("chained run");
    let run_dir =
        repo.path().join("artifacts").join("demo-002").join(chained.run_id.as_str());

    let report = RunVerifier::new().verify(&run_dir);
    assert!(report.valid, "checks: {:?}", report.checks);
    assert!(report.checks["chainable_structure"].valid);

    // Strip a required field from the prior-artifact snapshot.
    let snapshot_path = run_dir.join("inputs/prior_artifact.resolved.json");
    let text = fs::read_to_string(&snapshot_path).expect("read snapshot");
    fs::write(&snapshot_path, text.replace("prior_output_hashes", "prior_output_hashes_x"))
        .expect("rewrite snapshot");
    let report = RunVerifier::new().verify(&run_dir);
    assert!(!report.checks["chainable_structure"].valid);
}

/// The replay probe accepts intact runs and rejects tampered ones.
#[test]
fn replay_probe_tracks_snapshot_integrity() {
    let repo = common::scaffold_repo("hello\n");
    let run_dir = finalized_run(&repo);

    let probe = RunVerifier::new().replay(&run_dir);
    assert!(probe.can_replay, "errors: {:?}", probe.errors);

    let brief_path = run_dir.join("inputs/brief.resolved.json");
    let text = fs::read_to_string(&brief_path).expect("read brief snapshot");
    fs::write(&brief_path, text.replace("confident", "confidenX")).expect("tamper brief");
    let probe = RunVerifier::new().replay(&run_dir);
    assert!(!probe.can_replay);
    assert!(!probe.errors.is_empty());
}

/// Verifying a directory without a manifest reports every check failed.
#[test]
fn missing_manifest_fails_all_checks() {
    let repo = common::scaffold_repo("hello\n");
    let empty = repo.path().join("artifacts").join("demo-001").join("nonexistent");
    fs::create_dir_all(&empty).expect("create dir");

    let report = RunVerifier::new().verify(&empty);
    assert!(!report.valid);
    assert!(report.checks.values().all(|check| !check.valid));
}
