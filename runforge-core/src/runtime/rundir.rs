// runforge-core/src/runtime/rundir.rs
// ============================================================================
// Module: Runforge Run Directory Manager
// Description: Atomic lifecycle of content-addressed run directories.
// Purpose: Stage builds, finalize atomically, replay idempotently.
// Dependencies: crate::core, uuid
// ============================================================================

//! ## Overview
//! Runs build under `artifacts/<job_id>/.tmp/<uuid>/` and become visible
//! only through a single atomic rename into `artifacts/<job_id>/<run_id>/`.
//! When the destination already exists, the manager reads its manifest: an
//! `inputs_hash` match is an idempotent replay (the build is discarded); a
//! mismatch walks deterministic `-2`, `-3`, … suffixes until a free or
//! replayable slot is found. Safety across processes comes from the rename
//! and the content-addressing discipline, not from locks.
//!
//! A best-effort relative symlink `artifacts/runs/<run_id>` preserves the
//! legacy flat layout; link failure is logged and never fatal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::JobId;
use crate::core::MANIFEST_FILE_NAME;
use crate::core::RunId;
use crate::core::Sha256Digest;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Per-job staging directory name.
pub const TMP_DIR_NAME: &str = ".tmp";
/// Legacy alias directory name under the artifacts root.
pub const LEGACY_RUNS_DIR: &str = "runs";
/// Upper bound on deterministic collision suffixes.
const MAX_COLLISION_SUFFIX: u32 = 1000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the run directory manager.
#[derive(Debug, Error)]
pub enum RunDirError {
    /// Staging or finalize I/O failure.
    #[error("run directory io error at {path}: {reason}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// Atomic finalize rename failed.
    #[error("failed to finalize run directory {path}: {reason}")]
    Finalize {
        /// Destination path.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// Collision suffix scan exceeded its bound.
    #[error("exceeded maximum collision suffix for run id {0}")]
    CollisionOverflow(RunId),
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Destination decision for a computed run identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// No finalized run with these inputs exists; finalize into `run_dir`.
    Fresh {
        /// Resolved run identifier (suffixed on collision).
        run_id: RunId,
        /// Canonical destination directory.
        run_dir: PathBuf,
    },
    /// A finalized run with identical inputs exists; discard the build.
    Replay {
        /// Run identifier of the existing run.
        run_id: RunId,
        /// Existing canonical directory.
        run_dir: PathBuf,
    },
}

/// Result of the atomic finalize rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Build directory became the canonical run directory.
    Promoted,
    /// A concurrent writer finalized identical inputs first; the build was
    /// discarded and the existing directory is authoritative.
    LostRace,
}

/// Result of a legacy alias attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasOutcome {
    /// Alias link created.
    Created,
    /// Alias already present.
    AlreadyPresent,
    /// Alias creation failed; run proceeds on the canonical path only.
    Failed,
    /// Aliasing disabled by configuration.
    Disabled,
}

// ============================================================================
// SECTION: Run Directory Manager
// ============================================================================

/// Controls staging, finalize, replay, and aliasing under an artifacts root.
#[derive(Debug, Clone)]
pub struct RunDirectoryManager {
    /// Artifacts root directory.
    artifacts_root: PathBuf,
    /// Whether to maintain the legacy alias tree.
    legacy_alias: bool,
}

impl RunDirectoryManager {
    /// Creates a manager over the given artifacts root.
    #[must_use]
    pub fn new(artifacts_root: impl Into<PathBuf>, legacy_alias: bool) -> Self {
        Self {
            artifacts_root: artifacts_root.into(),
            legacy_alias,
        }
    }

    /// Returns the artifacts root.
    #[must_use]
    pub fn artifacts_root(&self) -> &Path {
        &self.artifacts_root
    }

    /// Returns the canonical directory for a `(job_id, run_id)` pair.
    #[must_use]
    pub fn run_dir(&self, job_id: &JobId, run_id: &RunId) -> PathBuf {
        self.artifacts_root.join(job_id.as_str()).join(run_id.as_str())
    }

    /// Allocates a fresh build directory with `inputs/` and `outputs/`.
    ///
    /// # Errors
    ///
    /// Returns [`RunDirError::Io`] when directory creation fails.
    pub fn stage(&self, job_id: &JobId) -> Result<PathBuf, RunDirError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let build_dir = self
            .artifacts_root
            .join(job_id.as_str())
            .join(TMP_DIR_NAME)
            .join(format!("tmp-{}", &token[..16]));
        for sub in ["inputs", "outputs"] {
            let dir = build_dir.join(sub);
            fs::create_dir_all(&dir).map_err(|err| RunDirError::Io {
                path: dir.display().to_string(),
                reason: err.to_string(),
            })?;
        }
        Ok(build_dir)
    }

    /// Resolves the destination for a computed identity.
    ///
    /// Walks the base run id and then deterministic numeric suffixes until a
    /// free slot or a replayable directory is found. Collision of the full
    /// 128-bit prefix across distinct inputs is astronomically improbable;
    /// the scan is bounded for completeness.
    ///
    /// # Errors
    ///
    /// Returns [`RunDirError::CollisionOverflow`] when the bound is hit.
    pub fn resolve_destination(
        &self,
        job_id: &JobId,
        base_run_id: &RunId,
        inputs_hash: &Sha256Digest,
    ) -> Result<Destination, RunDirError> {
        let mut suffix: Option<u32> = None;
        loop {
            let candidate = match suffix {
                None => base_run_id.clone(),
                Some(n) => base_run_id.with_suffix(n),
            };
            let run_dir = self.run_dir(job_id, &candidate);
            if !run_dir.exists() {
                return Ok(Destination::Fresh {
                    run_id: candidate,
                    run_dir,
                });
            }
            if manifest_inputs_hash(&run_dir).as_ref() == Some(inputs_hash) {
                return Ok(Destination::Replay {
                    run_id: candidate,
                    run_dir,
                });
            }
            let next = suffix.map_or(2, |n| n + 1);
            if next > MAX_COLLISION_SUFFIX {
                return Err(RunDirError::CollisionOverflow(base_run_id.clone()));
            }
            suffix = Some(next);
        }
    }

    /// Atomically promotes a build directory to its canonical destination.
    ///
    /// The rename is a single filesystem operation; partial runs are never
    /// visible at the canonical path. Two independent processes racing the
    /// same identity are serialized here: the loser observes a finalized
    /// directory with a matching `inputs_hash` and reports a lost race
    /// instead of an error. The build directory is removed on every
    /// non-promoted outcome.
    ///
    /// # Errors
    ///
    /// Returns [`RunDirError::Finalize`] when the rename fails for any
    /// reason other than losing a race to identical inputs.
    pub fn finalize(
        &self,
        build_dir: &Path,
        run_dir: &Path,
        inputs_hash: &Sha256Digest,
    ) -> Result<FinalizeOutcome, RunDirError> {
        match fs::rename(build_dir, run_dir) {
            Ok(()) => Ok(FinalizeOutcome::Promoted),
            Err(err) => {
                self.discard(build_dir);
                if manifest_inputs_hash(run_dir).as_ref() == Some(inputs_hash) {
                    return Ok(FinalizeOutcome::LostRace);
                }
                Err(RunDirError::Finalize {
                    path: run_dir.display().to_string(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Removes a build directory, ignoring failures.
    ///
    /// Stale directories left behind are swept by an external collaborator.
    pub fn discard(&self, build_dir: &Path) {
        if build_dir.exists() {
            if let Err(err) = fs::remove_dir_all(build_dir) {
                tracing::warn!(
                    path = %build_dir.display(),
                    error = %err,
                    "failed to remove build directory; leaving for sweeper"
                );
            }
        }
    }

    /// Ensures the legacy alias `artifacts/runs/<run_id>` exists.
    ///
    /// The link target is relative for portability. Best-effort: failure is
    /// logged and the canonical path remains authoritative.
    pub fn ensure_legacy_alias(&self, job_id: &JobId, run_id: &RunId) -> AliasOutcome {
        if !self.legacy_alias {
            return AliasOutcome::Disabled;
        }
        let legacy_root = self.artifacts_root.join(LEGACY_RUNS_DIR);
        let link = legacy_root.join(run_id.as_str());
        if link.exists() || fs::symlink_metadata(&link).is_ok() {
            return AliasOutcome::AlreadyPresent;
        }
        if let Err(err) = fs::create_dir_all(&legacy_root) {
            tracing::warn!(error = %err, "unable to create legacy runs directory");
            return AliasOutcome::Failed;
        }
        let target = PathBuf::from("..").join(job_id.as_str()).join(run_id.as_str());
        match symlink_dir(&target, &link) {
            Ok(()) => AliasOutcome::Created,
            Err(err) => {
                tracing::warn!(
                    link = %link.display(),
                    error = %err,
                    "unable to create legacy alias; continuing with canonical path only"
                );
                AliasOutcome::Failed
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads `inputs_hash` from a run directory's manifest, if readable.
fn manifest_inputs_hash(run_dir: &Path) -> Option<Sha256Digest> {
    let bytes = fs::read(run_dir.join(MANIFEST_FILE_NAME)).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("inputs_hash")?.as_str().map(Sha256Digest::from)
}

/// Creates a directory symlink on platforms that support one.
#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Creates a directory symlink on platforms that support one.
#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Fallback for platforms without symbolic links.
#[cfg(not(any(unix, windows)))]
fn symlink_dir(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symbolic links unsupported on this platform"))
}
