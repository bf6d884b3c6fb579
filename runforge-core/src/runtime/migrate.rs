// runforge-core/src/runtime/migrate.rs
// ============================================================================
// Module: Runforge Migration Engine
// Description: Additive, determinism-preserving manifest schema migrations.
// Purpose: Advance schema_version while freezing every identity field.
// Dependencies: crate::core, serde_json, walkdir
// ============================================================================

//! ## Overview
//! Migrations are pure transforms over the raw manifest map, registered in
//! an immutable registry and sequenced by breadth-first search from the
//! current `schema_version` to the target. Direct composite migrations may
//! be registered alongside hop-by-hop ones as path-shortening shortcuts.
//!
//! The apply flow is validate → deep-copy → transform → validate →
//! preservation check → backup → atomic rewrite → history append. A
//! migration may add or rename optional fields but may never alter
//! `job_id`, `run_id`, `inputs_hash`, the snapshot map, the doctrine
//! reference, or the artifacts map; the engine enforces this against the
//! pre-image, independent of what the transform claims.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::MANIFEST_FILE_NAME;
use crate::core::Sha256Digest;
use crate::core::canonical_json_bytes;
use crate::core::hash_canonical_value;
use crate::runtime::rundir::LEGACY_RUNS_DIR;
use crate::runtime::rundir::TMP_DIR_NAME;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema version assumed for manifests that do not declare one.
pub const BASELINE_SCHEMA_VERSION: &str = "1.0.0";

/// Manifest fields frozen across every migration.
pub const IDENTITY_FIELDS: &[&str] =
    &["job_id", "run_id", "inputs_hash", "input_snapshots", "doctrine", "artifacts"];

/// Backup suffix appended to the manifest path.
const BACKUP_SUFFIX: &str = ".backup";

// ============================================================================
// SECTION: Migration Contract
// ============================================================================

/// One additive schema migration.
///
/// `transform` must be pure: no I/O, no clock reads; all filesystem
/// operations belong to the engine.
pub trait Migration: Send + Sync {
    /// Starting schema version.
    fn from_version(&self) -> &str;

    /// Target schema version.
    fn to_version(&self) -> &str;

    /// Human-readable change list for the audit trail.
    fn changes(&self) -> Vec<String>;

    /// Applies the migration to a manifest map.
    fn transform(&self, manifest: Map<String, Value>) -> Map<String, Value>;

    /// Validates eligibility before transforming.
    fn validate_before(&self, manifest: &Map<String, Value>) -> Vec<String> {
        let current = schema_version_of(manifest);
        if current == self.from_version() {
            Vec::new()
        } else {
            vec![format!("expected schema_version {}, got {current}", self.from_version())]
        }
    }

    /// Validates the result after transforming.
    fn validate_after(&self, manifest: &Map<String, Value>) -> Vec<String> {
        let current = schema_version_of(manifest);
        if current == self.to_version() {
            Vec::new()
        } else {
            vec![format!(
                "expected schema_version {} after migration, got {current}",
                self.to_version()
            )]
        }
    }
}

// ============================================================================
// SECTION: Built-In Migrations
// ============================================================================

/// 1.0.0 → 1.1.0: introduce the input snapshot map.
///
/// Legacy manifests predate canonical snapshots; the map starts empty and
/// is backfilled out of band where snapshots exist on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddInputSnapshots;

impl Migration for AddInputSnapshots {
    fn from_version(&self) -> &str {
        "1.0.0"
    }

    fn to_version(&self) -> &str {
        "1.1.0"
    }

    fn changes(&self) -> Vec<String> {
        vec![
            "Add input_snapshots field (empty map)".to_string(),
            "Add inputs_hash field (null)".to_string(),
            "Bump schema_version to 1.1.0".to_string(),
        ]
    }

    fn transform(&self, mut manifest: Map<String, Value>) -> Map<String, Value> {
        manifest
            .entry("input_snapshots".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        manifest.entry("inputs_hash".to_string()).or_insert(Value::Null);
        manifest.insert("schema_version".to_string(), Value::from("1.1.0"));
        manifest
    }
}

/// 1.1.0 → 1.2.0: introduce chain metadata for pipeline composition.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddChainMetadata;

impl Migration for AddChainMetadata {
    fn from_version(&self) -> &str {
        "1.1.0"
    }

    fn to_version(&self) -> &str {
        "1.2.0"
    }

    fn changes(&self) -> Vec<String> {
        vec![
            "Add chain_metadata.is_chainable_stage (false)".to_string(),
            "Add chain_metadata.prior_stages (empty list)".to_string(),
            "Bump schema_version to 1.2.0".to_string(),
        ]
    }

    fn transform(&self, mut manifest: Map<String, Value>) -> Map<String, Value> {
        manifest.entry("chain_metadata".to_string()).or_insert_with(default_chain_metadata);
        manifest.insert("schema_version".to_string(), Value::from("1.2.0"));
        manifest
    }
}

/// 1.0.0 → 1.2.0: direct composite of the two hops above.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddSnapshotAndChainFields;

impl Migration for AddSnapshotAndChainFields {
    fn from_version(&self) -> &str {
        "1.0.0"
    }

    fn to_version(&self) -> &str {
        "1.2.0"
    }

    fn changes(&self) -> Vec<String> {
        vec![
            "Add input_snapshots field (empty map)".to_string(),
            "Add inputs_hash field (null)".to_string(),
            "Add chain_metadata.is_chainable_stage (false)".to_string(),
            "Add chain_metadata.prior_stages (empty list)".to_string(),
            "Bump schema_version to 1.2.0".to_string(),
        ]
    }

    fn transform(&self, mut manifest: Map<String, Value>) -> Map<String, Value> {
        manifest
            .entry("input_snapshots".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        manifest.entry("inputs_hash".to_string()).or_insert(Value::Null);
        manifest.entry("chain_metadata".to_string()).or_insert_with(default_chain_metadata);
        manifest.insert("schema_version".to_string(), Value::from("1.2.0"));
        manifest
    }
}

/// Default chain metadata for non-chainable legacy runs.
fn default_chain_metadata() -> Value {
    serde_json::json!({
        "is_chainable_stage": false,
        "prior_stages": [],
    })
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Immutable registry of available migrations.
///
/// Built at startup and passed into construction so tests can assemble
/// alternate registries without interference.
pub struct MigrationRegistry {
    /// Registered migrations.
    migrations: Vec<Box<dyn Migration>>,
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MigrationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            migrations: Vec::new(),
        }
    }

    /// Creates the registry of built-in migrations.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(AddInputSnapshots);
        registry.register(AddChainMetadata);
        registry.register(AddSnapshotAndChainFields);
        registry
    }

    /// Registers a migration.
    pub fn register(&mut self, migration: impl Migration + 'static) {
        self.migrations.push(Box::new(migration));
    }

    /// Returns the direct migration for a version pair, if registered.
    #[must_use]
    pub fn get(&self, from_version: &str, to_version: &str) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.from_version() == from_version && m.to_version() == to_version)
            .map(AsRef::as_ref)
    }

    /// Finds the shortest migration path via breadth-first search.
    ///
    /// A registered direct migration always wins over multi-hop paths.
    #[must_use]
    pub fn find_path(&self, from_version: &str, to_version: &str) -> Option<Vec<&dyn Migration>> {
        if let Some(direct) = self.get(from_version, to_version) {
            return Some(vec![direct]);
        }

        let mut queue: std::collections::VecDeque<(&str, Vec<&dyn Migration>)> =
            std::collections::VecDeque::new();
        let mut visited: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
        queue.push_back((from_version, Vec::new()));
        visited.insert(from_version);

        while let Some((current, path)) = queue.pop_front() {
            for migration in &self.migrations {
                if migration.from_version() != current || visited.contains(migration.to_version()) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(migration.as_ref());
                if migration.to_version() == to_version {
                    return Some(next_path);
                }
                visited.insert(migration.to_version());
                queue.push_back((migration.to_version(), next_path));
            }
        }
        None
    }

    /// Returns the highest schema version named by any registered migration.
    #[must_use]
    pub fn latest_version(&self) -> String {
        self.migrations
            .iter()
            .flat_map(|m| [m.from_version(), m.to_version()])
            .max_by_key(|version| parse_version(version))
            .unwrap_or(BASELINE_SCHEMA_VERSION)
            .to_string()
    }
}

// ============================================================================
// SECTION: Errors and Outcomes
// ============================================================================

/// Errors raised while migrating a manifest.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Manifest I/O failure.
    #[error("migration io error at {path}: {reason}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// Manifest JSON failed to parse.
    #[error("migration parse error at {path}: {reason}")]
    Parse {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// No migration path exists between the versions.
    #[error("no migration path from {from_version} to {to_version}")]
    NoPath {
        /// Current schema version.
        from_version: String,
        /// Requested target version.
        to_version: String,
    },
    /// A pre- or post-transform validation failed.
    #[error("migration validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    /// A transform altered a frozen identity field.
    #[error("migration altered determinism-critical field: {0}")]
    PreservationViolated(String),
    /// Migrated manifest could not be encoded.
    #[error("migration encode error: {0}")]
    Encode(String),
}

/// Outcome of migrating one manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Manifest path.
    pub path: PathBuf,
    /// Schema version before migration.
    pub from_version: String,
    /// Schema version after migration.
    pub to_version: String,
    /// Hops applied, as `from -> to` labels; empty when already current.
    pub applied: Vec<String>,
    /// Whether the manifest changed (false for already-current or dry-run).
    pub written: bool,
    /// Backup path when one was written.
    pub backup_path: Option<PathBuf>,
}

/// One failed manifest inside a bulk migration.
#[derive(Debug, Clone)]
pub struct MigrationFailure {
    /// Manifest path.
    pub path: PathBuf,
    /// Failure description.
    pub reason: String,
}

/// Statistics for a bulk migration pass.
#[derive(Debug, Clone, Default)]
pub struct MigrationStats {
    /// Manifests discovered.
    pub total: usize,
    /// Manifests migrated.
    pub migrated: usize,
    /// Manifests already at the target version.
    pub already_current: usize,
    /// Manifests that failed to migrate.
    pub failed: usize,
    /// Per-manifest failures.
    pub errors: Vec<MigrationFailure>,
}

// ============================================================================
// SECTION: Migration Engine
// ============================================================================

/// Applies registered migrations to manifests on disk.
pub struct MigrationEngine {
    /// Immutable migration registry.
    registry: MigrationRegistry,
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new(MigrationRegistry::builtin())
    }
}

impl MigrationEngine {
    /// Creates an engine over the given registry.
    #[must_use]
    pub fn new(registry: MigrationRegistry) -> Self {
        Self {
            registry,
        }
    }

    /// Returns the registry's latest known schema version.
    #[must_use]
    pub fn latest_version(&self) -> String {
        self.registry.latest_version()
    }

    /// Migrates one manifest to the target version (default: latest).
    ///
    /// Dry-run executes every step up to but excluding the backup and
    /// write, returning the would-be outcome. Re-applying a completed
    /// migration is a no-op: the manifest is already at the target version.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError`]; on any error no write has occurred.
    pub fn migrate_manifest(
        &self,
        manifest_path: &Path,
        target_version: Option<&str>,
        dry_run: bool,
    ) -> Result<MigrationOutcome, MigrationError> {
        let original_bytes = fs::read(manifest_path).map_err(|err| MigrationError::Io {
            path: manifest_path.display().to_string(),
            reason: err.to_string(),
        })?;
        let original: Map<String, Value> = serde_json::from_slice(&original_bytes)
            .map_err(|err| MigrationError::Parse {
                path: manifest_path.display().to_string(),
                reason: err.to_string(),
            })?;

        let from_version = schema_version_of(&original).to_string();
        let to_version =
            target_version.map_or_else(|| self.registry.latest_version(), ToString::to_string);

        if from_version == to_version {
            return Ok(MigrationOutcome {
                path: manifest_path.to_path_buf(),
                from_version,
                to_version,
                applied: Vec::new(),
                written: false,
                backup_path: None,
            });
        }

        let path = self.registry.find_path(&from_version, &to_version).ok_or_else(|| {
            MigrationError::NoPath {
                from_version: from_version.clone(),
                to_version: to_version.clone(),
            }
        })?;

        let checksum_before = checksum(&original)?;
        let mut current = original.clone();
        let mut applied = Vec::new();
        let mut changes = Vec::new();
        for migration in &path {
            let errors = migration.validate_before(&current);
            if !errors.is_empty() {
                return Err(MigrationError::Validation(errors));
            }
            current = migration.transform(current);
            let errors = migration.validate_after(&current);
            if !errors.is_empty() {
                return Err(MigrationError::Validation(errors));
            }
            applied.push(format!("{} -> {}", migration.from_version(), migration.to_version()));
            changes.extend(migration.changes());
        }

        enforce_preservation(&original, &current)?;
        let checksum_after = checksum(&current)?;

        let history = current
            .entry("migration_history".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(entries) = history {
            entries.push(serde_json::json!({
                "from_version": from_version,
                "to_version": to_version,
                "applied_at": chrono::Utc::now().to_rfc3339(),
                "changes": changes,
                "checksum_before": checksum_before,
                "checksum_after": checksum_after,
            }));
        }

        let backup_path = backup_path_for(manifest_path);
        if !dry_run {
            fs::write(&backup_path, &original_bytes).map_err(|err| MigrationError::Io {
                path: backup_path.display().to_string(),
                reason: err.to_string(),
            })?;
            write_atomic(manifest_path, &current)?;
            tracing::info!(
                path = %manifest_path.display(),
                from_version,
                to_version,
                "manifest migrated"
            );
        }

        Ok(MigrationOutcome {
            path: manifest_path.to_path_buf(),
            from_version,
            to_version,
            applied,
            written: !dry_run,
            backup_path: if dry_run { None } else { Some(backup_path) },
        })
    }

    /// Migrates every manifest under an artifacts root.
    ///
    /// Build directories and the legacy alias tree are skipped. Per-file
    /// failures are collected in the statistics rather than aborting the
    /// pass.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Io`] when the root cannot be walked.
    pub fn migrate_all(
        &self,
        artifacts_root: &Path,
        target_version: Option<&str>,
        dry_run: bool,
    ) -> Result<MigrationStats, MigrationError> {
        let mut stats = MigrationStats::default();
        for manifest_path in find_manifests(artifacts_root)? {
            stats.total += 1;
            match self.migrate_manifest(&manifest_path, target_version, dry_run) {
                Ok(outcome) if outcome.applied.is_empty() => stats.already_current += 1,
                Ok(_) => stats.migrated += 1,
                Err(err) => {
                    stats.failed += 1;
                    tracing::warn!(
                        path = %manifest_path.display(),
                        error = %err,
                        "manifest migration failed"
                    );
                    stats.errors.push(MigrationFailure {
                        path: manifest_path,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(stats)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a `MAJOR.MINOR.PATCH` version into an orderable triple.
fn parse_version(version: &str) -> (u64, u64, u64) {
    let mut parts = version.split('.').map(|part| part.parse::<u64>().unwrap_or(0));
    (parts.next().unwrap_or(0), parts.next().unwrap_or(0), parts.next().unwrap_or(0))
}

/// Reads the schema version of a manifest map.
fn schema_version_of(manifest: &Map<String, Value>) -> &str {
    manifest
        .get("schema_version")
        .and_then(Value::as_str)
        .unwrap_or(BASELINE_SCHEMA_VERSION)
}

/// Enforces the determinism-preservation contract against the pre-image.
fn enforce_preservation(
    before: &Map<String, Value>,
    after: &Map<String, Value>,
) -> Result<(), MigrationError> {
    for field in IDENTITY_FIELDS {
        let pre = before.get(*field);
        let post = after.get(*field);
        // A field absent before migration may be introduced with an empty
        // or null value; an existing value must carry over untouched.
        if pre.is_some() && pre != post {
            return Err(MigrationError::PreservationViolated((*field).to_string()));
        }
    }
    Ok(())
}

/// Computes the audit checksum of a manifest map.
fn checksum(manifest: &Map<String, Value>) -> Result<Sha256Digest, MigrationError> {
    hash_canonical_value(manifest).map_err(|err| MigrationError::Encode(err.to_string()))
}

/// Returns the backup path for a manifest.
fn backup_path_for(manifest_path: &Path) -> PathBuf {
    let mut name = manifest_path.file_name().map_or_else(
        || MANIFEST_FILE_NAME.to_string(),
        |name| name.to_string_lossy().into_owned(),
    );
    name.push_str(BACKUP_SUFFIX);
    manifest_path.with_file_name(name)
}

/// Writes the migrated manifest through a sibling temp file and rename.
fn write_atomic(manifest_path: &Path, manifest: &Map<String, Value>) -> Result<(), MigrationError> {
    let bytes =
        canonical_json_bytes(manifest).map_err(|err| MigrationError::Encode(err.to_string()))?;
    let tmp_path = manifest_path.with_extension("json.tmp");
    fs::write(&tmp_path, &bytes).map_err(|err| MigrationError::Io {
        path: tmp_path.display().to_string(),
        reason: err.to_string(),
    })?;
    fs::rename(&tmp_path, manifest_path).map_err(|err| MigrationError::Io {
        path: manifest_path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Finds run manifests under the artifacts root, skipping build and alias
/// trees.
fn find_manifests(artifacts_root: &Path) -> Result<Vec<PathBuf>, MigrationError> {
    let mut manifests = Vec::new();
    for entry in walkdir::WalkDir::new(artifacts_root).follow_links(false) {
        let entry = entry.map_err(|err| MigrationError::Io {
            path: artifacts_root.display().to_string(),
            reason: err.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy() != MANIFEST_FILE_NAME {
            continue;
        }
        let relative = entry.path().strip_prefix(artifacts_root).unwrap_or(entry.path());
        let skip = relative.components().any(|component| match component {
            Component::Normal(name) => name == TMP_DIR_NAME || name == LEGACY_RUNS_DIR,
            _ => false,
        });
        if !skip {
            manifests.push(entry.path().to_path_buf());
        }
    }
    manifests.sort();
    Ok(manifests)
}
