// runforge-core/tests/engine.rs
// ============================================================================
// Module: Execution Engine Tests
// Description: End-to-end tests for deterministic run execution.
// ============================================================================
//! ## Overview
//! Exercises the full run lifecycle: fresh execution, idempotent replay,
//! input drift, volatile-field insensitivity, payload failure, and the
//! byte-stable deterministic projection.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions are permitted."
)]

mod common;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use runforge_core::GenerationError;
use runforge_core::GenerationOutput;
use runforge_core::GenerationRequest;
use runforge_core::RUN_ID_HEX_LEN;
use runforge_core::RunRequest;
use runforge_core::RunStatus;
use runforge_core::TextGenerator;

const JOB_REF: &str = "jobs/demo-001/brief.yaml";

fn request() -> RunRequest {
    RunRequest {
        job_ref: JOB_REF.to_string(),
        queue_job_id: Some("queue-1".to_string()),
    }
}

fn list_files(dir: &Path) -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    for entry in walkdir_files(dir) {
        files.insert(entry);
    }
    files
}

fn walkdir_files(dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current).expect("read dir") {
            let entry = entry.expect("dir entry");
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(
                    path.strip_prefix(dir).expect("relative").to_string_lossy().into_owned(),
                );
            }
        }
    }
    out
}

/// Fresh run: snapshots, one output, a succeeded manifest, and a run id
/// derived from the inputs hash.
#[test]
fn fresh_run_produces_content_addressed_artifact() {
    let repo = common::scaffold_repo("hello\n");
    common::write_file(repo.path(), JOB_REF, &common::basic_brief("demo-001"));
    let engine = common::engine_for(repo.path());

    let manifest = engine.execute_run(&request()).expect("execute run");
    assert_eq!(manifest.status, RunStatus::Succeeded);
    assert!(manifest.inputs_hash.as_str().starts_with("sha256:"));
    assert_eq!(manifest.run_id.as_str(), &manifest.inputs_hash.hex()[..RUN_ID_HEX_LEN]);
    assert_eq!(manifest.job_id.as_str(), "demo-001");
    assert_eq!(manifest.queue_job_id.as_deref(), Some("queue-1"));
    assert_eq!(manifest.input_snapshots.len(), 4);
    assert!(manifest.chain_metadata.is_none());

    let run_dir =
        repo.path().join("artifacts").join("demo-001").join(manifest.run_id.as_str());
    for snapshot in [
        "inputs/brief.resolved.json",
        "inputs/context.resolved.json",
        "inputs/model_config.json",
        "inputs/doctrine.resolved.json",
    ] {
        assert!(run_dir.join(snapshot).is_file(), "missing snapshot {snapshot}");
    }
    assert!(run_dir.join("outputs/output.md").is_file());
    assert!(run_dir.join("manifest.json").is_file());
    assert_eq!(manifest.artifacts.len(), 1);
    assert_eq!(manifest.artifacts["output.md"].path, "outputs/output.md");

    // The doctrine snapshot is the reference record, nothing more: its
    // digest binds the content, and its field set is frozen.
    let doctrine_snapshot: serde_json::Value = serde_json::from_slice(
        &fs::read(run_dir.join("inputs/doctrine.resolved.json")).expect("read doctrine snapshot"),
    )
    .expect("parse doctrine snapshot");
    let doctrine_map = doctrine_snapshot.as_object().expect("doctrine snapshot object");
    let keys: Vec<&str> = doctrine_map.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["doctrine_id", "resolved_path", "sha256", "version"]);
    assert_eq!(doctrine_map["doctrine_id"], serde_json::json!(common::DOCTRINE_ID));
    assert_eq!(doctrine_map["version"], serde_json::json!(common::DOCTRINE_VERSION));
    assert_eq!(
        doctrine_map["resolved_path"],
        serde_json::json!("prompts/example/v1.0.0/template.md")
    );
    assert_eq!(
        doctrine_map["sha256"],
        serde_json::json!(runforge_core::Sha256Digest::of_bytes(b"hello\n"))
    );

    // No build directory lingers after finalize.
    let tmp_dir = repo.path().join("artifacts").join("demo-001").join(".tmp");
    assert!(fs::read_dir(&tmp_dir).map(|mut it| it.next().is_none()).unwrap_or(true));
}

/// Replay: identical inputs short-circuit to the existing run with no new
/// writes under the canonical path.
#[test]
fn identical_inputs_replay_idempotently() {
    let repo = common::scaffold_repo("hello\n");
    common::write_file(repo.path(), JOB_REF, &common::basic_brief("demo-001"));
    let engine = common::engine_for(repo.path());

    let first = engine.execute_run(&request()).expect("first run");
    let run_dir =
        repo.path().join("artifacts").join("demo-001").join(first.run_id.as_str());
    let before = list_files(&run_dir);

    let second = engine.execute_run(&request()).expect("second run");
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.status, RunStatus::IdempotentReplay);
    assert_eq!(list_files(&run_dir), before);

    // The manifest on disk keeps its original terminal status.
    let on_disk = runforge_core::RunManifest::load_from_dir(&run_dir).expect("load manifest");
    assert_eq!(on_disk.status, RunStatus::Succeeded);
}

/// Brief drift: a single changed character yields a distinct coexisting
/// artifact directory.
#[test]
fn brief_drift_changes_run_id() {
    let repo = common::scaffold_repo("hello\n");
    common::write_file(repo.path(), JOB_REF, &common::basic_brief("demo-001"));
    let engine = common::engine_for(repo.path());
    let first = engine.execute_run(&request()).expect("first run");

    let drifted = common::basic_brief("demo-001").replace("title: Demo", "title: Demo!");
    common::write_file(repo.path(), JOB_REF, &drifted);
    let second = engine.execute_run(&request()).expect("second run");

    assert_ne!(second.run_id, first.run_id);
    let job_root = repo.path().join("artifacts").join("demo-001");
    assert!(job_root.join(first.run_id.as_str()).is_dir());
    assert!(job_root.join(second.run_id.as_str()).is_dir());
}

/// Volatile fields (queue id) never reach the hash: run identity is
/// unchanged and the invocation replays.
#[test]
fn queue_job_id_does_not_affect_identity() {
    let repo = common::scaffold_repo("hello\n");
    common::write_file(repo.path(), JOB_REF, &common::basic_brief("demo-001"));
    let engine = common::engine_for(repo.path());

    let first = engine.execute_run(&request()).expect("first run");
    let second = engine
        .execute_run(&RunRequest {
            job_ref: JOB_REF.to_string(),
            queue_job_id: Some("queue-totally-different".to_string()),
        })
        .expect("second run");
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.status, RunStatus::IdempotentReplay);
}

/// The deterministic projection is byte-identical across independent
/// repositories with identical inputs.
#[test]
fn deterministic_projection_is_byte_stable_across_roots() {
    let make = || {
        let repo = common::scaffold_repo("hello\n");
        common::write_file(repo.path(), JOB_REF, &common::basic_brief("demo-001"));
        common::write_file(repo.path(), "corpus/identity/voice.md", "voice notes\n");
        let engine = common::engine_for(repo.path());
        let manifest = engine.execute_run(&request()).expect("execute run");
        (repo, manifest)
    };
    let (_repo_a, manifest_a) = make();
    let (_repo_b, manifest_b) = make();

    assert_eq!(manifest_a.run_id, manifest_b.run_id);
    assert_eq!(
        manifest_a.deterministic_bytes().expect("projection a"),
        manifest_b.deterministic_bytes().expect("projection b"),
    );
    // Full projections differ only by volatile fields such as timestamps.
    assert_eq!(manifest_a.inputs_hash, manifest_b.inputs_hash);
}

/// Unsafe or unknown job references are refused before any write.
#[test]
fn unsafe_job_refs_are_rejected() {
    let repo = common::scaffold_repo("hello\n");
    let engine = common::engine_for(repo.path());
    for job_ref in ["/etc/passwd", "jobs/../secrets.yaml", "notes/brief.yaml"] {
        let err = engine
            .execute_run(&RunRequest {
                job_ref: job_ref.to_string(),
                queue_job_id: None,
            })
            .expect_err("unsafe job_ref must fail");
        assert!(
            matches!(err, runforge_core::EngineError::UnsafeJobRef(_)),
            "job_ref {job_ref:?} gave {err:?}"
        );
    }
    assert!(!repo.path().join("artifacts").exists(), "no artifact may be written");
}

/// A generator failure still finalizes a failed manifest over the full
/// snapshot set.
#[test]
fn payload_failure_finalizes_failed_manifest() {
    struct FailingGenerator;
    impl TextGenerator for FailingGenerator {
        fn generate(
            &self,
            _request: &GenerationRequest<'_>,
        ) -> Result<GenerationOutput, GenerationError> {
            Err(GenerationError::Provider("rate limited".to_string()))
        }
    }

    let repo = common::scaffold_repo("hello\n");
    common::write_file(repo.path(), JOB_REF, &common::basic_brief("demo-001"));
    let mut config = runforge_core::EngineConfig::new(repo.path());
    config.doctrine.whitelist.insert(runforge_core::DoctrineId::from(common::DOCTRINE_ID));
    config.doctrine_bindings.insert(
        common::JOB_TYPE.to_string(),
        runforge_core::DoctrineBinding {
            doctrine_id: runforge_core::DoctrineId::from(common::DOCTRINE_ID),
            version: runforge_core::DoctrineVersion::from(common::DOCTRINE_VERSION),
        },
    );
    let engine = runforge_core::ExecutionEngine::new(
        config,
        Box::new(FailingGenerator),
        Box::new(runforge_core::NoopEmitter),
    );

    let manifest = engine.execute_run(&request()).expect("failed run still returns manifest");
    assert_eq!(manifest.status, RunStatus::Failed);
    assert_eq!(manifest.error.as_deref(), Some("generation provider error: rate limited"));
    assert!(manifest.artifacts.is_empty());

    let run_dir =
        repo.path().join("artifacts").join("demo-001").join(manifest.run_id.as_str());
    assert!(run_dir.join("manifest.json").is_file());
    assert!(run_dir.join("inputs/brief.resolved.json").is_file());

    // The failure note is volatile: it never reaches the deterministic
    // projection.
    let projection = manifest.deterministic_projection().expect("projection");
    assert!(projection.get("error").is_none());
}
