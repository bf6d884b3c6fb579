// runforge-core/tests/rundir.rs
// ============================================================================
// Module: Run Directory Tests
// Description: Tests for staging, finalize, replay, and collision policy.
// ============================================================================
//! ## Overview
//! Validates the atomic run directory lifecycle and the deterministic
//! collision suffixing.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::fs;

use runforge_core::JobId;
use runforge_core::RunId;
use runforge_core::Sha256Digest;
use runforge_core::RunDirectoryManager;
use runforge_core::runtime::AliasOutcome;
use runforge_core::runtime::Destination;
use runforge_core::runtime::FinalizeOutcome;
use tempfile::TempDir;

fn manager(root: &TempDir, legacy_alias: bool) -> RunDirectoryManager {
    RunDirectoryManager::new(root.path().join("artifacts"), legacy_alias)
}

fn write_manifest_stub(run_dir: &std::path::Path, inputs_hash: &Sha256Digest) {
    fs::create_dir_all(run_dir).expect("create run dir");
    fs::write(
        run_dir.join("manifest.json"),
        serde_json::to_vec(&serde_json::json!({"inputs_hash": inputs_hash})).expect("encode"),
    )
    .expect("write manifest stub");
}

/// Staging creates inputs/ and outputs/ under the per-job .tmp tree.
#[test]
fn stage_creates_build_layout() {
    let root = TempDir::new().expect("tempdir");
    let manager = manager(&root, false);
    let build = manager.stage(&JobId::from("demo-001")).expect("stage");
    assert!(build.starts_with(root.path().join("artifacts").join("demo-001").join(".tmp")));
    assert!(build.join("inputs").is_dir());
    assert!(build.join("outputs").is_dir());
}

/// A free destination is fresh; finalize makes the build visible there.
#[test]
fn finalize_promotes_build_atomically() {
    let root = TempDir::new().expect("tempdir");
    let manager = manager(&root, false);
    let job_id = JobId::from("demo-001");
    let run_id = RunId::new("0123456789abcdef0123456789abcdef");
    let inputs_hash = Sha256Digest::of_bytes(b"inputs");

    let destination =
        manager.resolve_destination(&job_id, &run_id, &inputs_hash).expect("resolve");
    let Destination::Fresh {
        run_id: resolved,
        run_dir,
    } = destination
    else {
        panic!("expected fresh destination");
    };
    assert_eq!(resolved, run_id);

    let build = manager.stage(&job_id).expect("stage");
    fs::write(build.join("outputs").join("output.md"), "body\n").expect("write output");
    let outcome = manager.finalize(&build, &run_dir, &inputs_hash).expect("finalize");
    assert_eq!(outcome, FinalizeOutcome::Promoted);

    assert!(!build.exists());
    assert!(run_dir.join("outputs").join("output.md").is_file());
}

/// Losing a finalize race to identical inputs is a replay, not an error.
#[test]
fn finalize_race_with_identical_inputs_is_lost_race() {
    let root = TempDir::new().expect("tempdir");
    let manager = manager(&root, false);
    let job_id = JobId::from("demo-001");
    let run_id = RunId::new("0123456789abcdef0123456789abcdef");
    let inputs_hash = Sha256Digest::of_bytes(b"inputs");

    // A competing writer already finalized this identity.
    let run_dir = manager.run_dir(&job_id, &run_id);
    write_manifest_stub(&run_dir, &inputs_hash);

    let build = manager.stage(&job_id).expect("stage");
    let outcome = manager.finalize(&build, &run_dir, &inputs_hash).expect("finalize");
    assert_eq!(outcome, FinalizeOutcome::LostRace);
    assert!(!build.exists());
}

/// Matching inputs_hash at the destination is an idempotent replay.
#[test]
fn matching_inputs_hash_replays() {
    let root = TempDir::new().expect("tempdir");
    let manager = manager(&root, false);
    let job_id = JobId::from("demo-001");
    let run_id = RunId::new("0123456789abcdef0123456789abcdef");
    let inputs_hash = Sha256Digest::of_bytes(b"inputs");
    write_manifest_stub(&manager.run_dir(&job_id, &run_id), &inputs_hash);

    let destination =
        manager.resolve_destination(&job_id, &run_id, &inputs_hash).expect("resolve");
    assert!(matches!(destination, Destination::Replay { run_id: id, .. } if id == run_id));
}

/// A prefix collision with distinct inputs walks deterministic suffixes.
#[test]
fn distinct_inputs_take_numeric_suffixes() {
    let root = TempDir::new().expect("tempdir");
    let manager = manager(&root, false);
    let job_id = JobId::from("demo-001");
    let run_id = RunId::new("0123456789abcdef0123456789abcdef");
    write_manifest_stub(&manager.run_dir(&job_id, &run_id), &Sha256Digest::of_bytes(b"other"));

    let inputs_hash = Sha256Digest::of_bytes(b"inputs");
    let destination =
        manager.resolve_destination(&job_id, &run_id, &inputs_hash).expect("resolve");
    let Destination::Fresh {
        run_id: suffixed, ..
    } = destination
    else {
        panic!("expected fresh suffixed destination");
    };
    assert_eq!(suffixed.as_str(), "0123456789abcdef0123456789abcdef-2");

    // A replayable run parked at the suffix is found before new slots.
    write_manifest_stub(&manager.run_dir(&job_id, &suffixed), &inputs_hash);
    let destination =
        manager.resolve_destination(&job_id, &run_id, &inputs_hash).expect("resolve");
    assert!(matches!(destination, Destination::Replay { run_id: id, .. } if id == suffixed));
}

/// The legacy alias links runs/<run_id> to the canonical directory.
#[cfg(unix)]
#[test]
fn legacy_alias_links_relative() {
    let root = TempDir::new().expect("tempdir");
    let manager = manager(&root, true);
    let job_id = JobId::from("demo-001");
    let run_id = RunId::new("0123456789abcdef0123456789abcdef");
    write_manifest_stub(&manager.run_dir(&job_id, &run_id), &Sha256Digest::of_bytes(b"inputs"));

    assert_eq!(manager.ensure_legacy_alias(&job_id, &run_id), AliasOutcome::Created);
    let link = root.path().join("artifacts").join("runs").join(run_id.as_str());
    let target = fs::read_link(&link).expect("read link");
    assert!(target.is_relative());
    assert!(link.join("manifest.json").is_file());

    assert_eq!(manager.ensure_legacy_alias(&job_id, &run_id), AliasOutcome::AlreadyPresent);
}

/// Aliasing can be disabled outright.
#[test]
fn legacy_alias_respects_disable() {
    let root = TempDir::new().expect("tempdir");
    let manager = manager(&root, false);
    let job_id = JobId::from("demo-001");
    let run_id = RunId::new("0123456789abcdef0123456789abcdef");
    assert_eq!(manager.ensure_legacy_alias(&job_id, &run_id), AliasOutcome::Disabled);
    assert!(!root.path().join("artifacts").join("runs").exists());
}
