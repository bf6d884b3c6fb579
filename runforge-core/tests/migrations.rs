// runforge-core/tests/migrations.rs
// ============================================================================
// Module: Migration Engine Tests
// Description: Tests for schema migration, path finding, and preservation.
// ============================================================================
//! ## Overview
//! Validates additive migration of legacy manifests, BFS path finding,
//! idempotence, dry-run, backups, and the determinism-preservation
//! contract.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use runforge_core::runtime::AddChainMetadata;
use runforge_core::runtime::AddInputSnapshots;
use runforge_core::Migration;
use runforge_core::MigrationEngine;
use runforge_core::MigrationRegistry;
use runforge_core::runtime::MigrationError;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

fn legacy_manifest() -> Value {
    json!({
        "schema_version": "1.0.0",
        "job_id": "demo-001",
        "run_id": "0123456789abcdef0123456789abcdef",
        "job_ref": "jobs/demo-001/brief.yaml",
        "job_type": "copy_generation",
        "status": "succeeded",
        "artifacts": {
            "output.md": {
                "path": "outputs/output.md",
                "sha256": "sha256:5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03",
                "bytes": 6
            }
        }
    })
}

fn write_manifest(dir: &Path, relative: &str, value: &Value) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(&path, serde_json::to_vec_pretty(value).expect("encode")).expect("write manifest");
    path
}

fn load(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).expect("read manifest")).expect("parse manifest")
}

/// 1.0.0 to 1.2.0: additive fields appear, identity fields are untouched,
/// and the audit trail grows by one record.
#[test]
fn migrates_legacy_manifest_to_current() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_manifest(dir.path(), "manifest.json", &legacy_manifest());
    let engine = MigrationEngine::default();

    let outcome = engine.migrate_manifest(&path, Some("1.2.0"), false).expect("migrate");
    assert_eq!(outcome.from_version, "1.0.0");
    assert_eq!(outcome.to_version, "1.2.0");
    assert!(outcome.written);

    let migrated = load(&path);
    assert_eq!(migrated["schema_version"], json!("1.2.0"));
    assert_eq!(migrated["input_snapshots"], json!({}));
    assert_eq!(migrated["inputs_hash"], Value::Null);
    assert_eq!(migrated["chain_metadata"]["is_chainable_stage"], json!(false));
    assert_eq!(migrated["chain_metadata"]["prior_stages"], json!([]));

    // Identity fields are bytewise unchanged.
    let original = legacy_manifest();
    assert_eq!(migrated["job_id"], original["job_id"]);
    assert_eq!(migrated["run_id"], original["run_id"]);
    assert_eq!(migrated["artifacts"], original["artifacts"]);

    let history = migrated["migration_history"].as_array().expect("history array");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["from_version"], json!("1.0.0"));
    assert_eq!(history[0]["to_version"], json!("1.2.0"));
    assert!(history[0]["checksum_before"].as_str().expect("before").starts_with("sha256:"));
    assert!(history[0]["checksum_after"].as_str().expect("after").starts_with("sha256:"));

    // The backup carries the pre-image.
    let backup = load(&path.with_file_name("manifest.json.backup"));
    assert_eq!(backup["schema_version"], json!("1.0.0"));
}

/// Re-applying a completed migration is a no-op.
#[test]
fn reapplying_migration_is_noop() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_manifest(dir.path(), "manifest.json", &legacy_manifest());
    let engine = MigrationEngine::default();

    engine.migrate_manifest(&path, Some("1.2.0"), false).expect("first migrate");
    let after_first = fs::read(&path).expect("read bytes");

    let outcome = engine.migrate_manifest(&path, Some("1.2.0"), false).expect("second migrate");
    assert!(outcome.applied.is_empty());
    assert!(!outcome.written);
    assert_eq!(fs::read(&path).expect("read bytes"), after_first);

    let history = load(&path)["migration_history"].as_array().expect("history").len();
    assert_eq!(history, 1);
}

/// Dry-run reports the would-be result without touching disk.
#[test]
fn dry_run_writes_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_manifest(dir.path(), "manifest.json", &legacy_manifest());
    let before = fs::read(&path).expect("read bytes");

    let engine = MigrationEngine::default();
    let outcome = engine.migrate_manifest(&path, Some("1.2.0"), true).expect("dry run");
    assert_eq!(outcome.applied.len(), 1);
    assert!(!outcome.written);
    assert!(outcome.backup_path.is_none());
    assert_eq!(fs::read(&path).expect("read bytes"), before);
    assert!(!path.with_file_name("manifest.json.backup").exists());
}

/// Without the composite shortcut, BFS sequences the hop-by-hop path.
#[test]
fn bfs_finds_multi_hop_path() {
    let mut registry = MigrationRegistry::new();
    registry.register(AddInputSnapshots);
    registry.register(AddChainMetadata);
    let path = registry.find_path("1.0.0", "1.2.0").expect("path exists");
    assert_eq!(path.len(), 2);

    // The builtin registry's direct composite shortens it to one hop.
    let builtin = MigrationRegistry::builtin();
    assert_eq!(builtin.find_path("1.0.0", "1.2.0").expect("path exists").len(), 1);

    let dir = TempDir::new().expect("tempdir");
    let manifest_path = write_manifest(dir.path(), "manifest.json", &legacy_manifest());
    let engine = MigrationEngine::new(registry);
    let outcome = engine.migrate_manifest(&manifest_path, Some("1.2.0"), false).expect("migrate");
    assert_eq!(outcome.applied, vec!["1.0.0 -> 1.1.0", "1.1.0 -> 1.2.0"]);
    assert_eq!(load(&manifest_path)["schema_version"], json!("1.2.0"));
}

/// Unknown targets yield a descriptive no-path failure without writes.
#[test]
fn unknown_target_has_no_path() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_manifest(dir.path(), "manifest.json", &legacy_manifest());
    let before = fs::read(&path).expect("read bytes");

    let engine = MigrationEngine::default();
    let err = engine.migrate_manifest(&path, Some("9.9.9"), false).expect_err("no path");
    assert!(matches!(err, MigrationError::NoPath { .. }));
    assert_eq!(fs::read(&path).expect("read bytes"), before);
}

/// A transform that touches a frozen identity field is rejected and
/// nothing is written.
#[test]
fn preservation_contract_is_enforced() {
    struct RewritesRunId;
    impl Migration for RewritesRunId {
        fn from_version(&self) -> &str {
            "1.0.0"
        }
        fn to_version(&self) -> &str {
            "1.0.1"
        }
        fn changes(&self) -> Vec<String> {
            vec!["Rewrite run_id".to_string()]
        }
        fn transform(&self, mut manifest: Map<String, Value>) -> Map<String, Value> {
            manifest.insert("run_id".to_string(), Value::from("mutated"));
            manifest.insert("schema_version".to_string(), Value::from("1.0.1"));
            manifest
        }
    }

    let dir = TempDir::new().expect("tempdir");
    let path = write_manifest(dir.path(), "manifest.json", &legacy_manifest());
    let before = fs::read(&path).expect("read bytes");

    let mut registry = MigrationRegistry::new();
    registry.register(RewritesRunId);
    let engine = MigrationEngine::new(registry);
    let err = engine.migrate_manifest(&path, Some("1.0.1"), false).expect_err("must refuse");
    assert!(matches!(err, MigrationError::PreservationViolated(field) if field == "run_id"));
    assert_eq!(fs::read(&path).expect("read bytes"), before);
}

/// Bulk migration walks run manifests, skipping build and alias trees.
#[test]
fn migrate_all_covers_artifact_tree() {
    let dir = TempDir::new().expect("tempdir");
    let artifacts = dir.path().join("artifacts");
    write_manifest(&artifacts, "demo-001/run-a/manifest.json", &legacy_manifest());
    write_manifest(&artifacts, "demo-002/run-b/manifest.json", &legacy_manifest());
    // Build directories and the alias tree must be ignored.
    write_manifest(&artifacts, "demo-001/.tmp/tmp-x/manifest.json", &legacy_manifest());
    write_manifest(&artifacts, "runs/run-a/manifest.json", &legacy_manifest());

    let engine = MigrationEngine::default();
    let stats = engine.migrate_all(&artifacts, Some("1.2.0"), false).expect("migrate all");
    assert_eq!(stats.total, 2);
    assert_eq!(stats.migrated, 2);
    assert_eq!(stats.failed, 0);

    let second = engine.migrate_all(&artifacts, Some("1.2.0"), false).expect("second pass");
    assert_eq!(second.already_current, 2);
    assert_eq!(second.migrated, 0);
}

/// The registry reports the highest version it knows about.
#[test]
fn latest_version_is_highest_known() {
    assert_eq!(MigrationRegistry::builtin().latest_version(), "1.2.0");
    assert_eq!(MigrationEngine::default().latest_version(), "1.2.0");
}
