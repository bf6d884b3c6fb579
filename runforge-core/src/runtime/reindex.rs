// runforge-core/src/runtime/reindex.rs
// ============================================================================
// Module: Runforge Reindex
// Description: Rebuilds an external manifest index from disk.
// Purpose: Keep the filesystem authoritative; indices are derived state.
// Dependencies: crate::core, crate::interfaces, walkdir
// ============================================================================

//! ## Overview
//! Any external index is a convenience view that can be rebuilt at any time
//! by re-reading every manifest under the artifacts root. The core feeds a
//! caller-supplied index implementation and never reads the index back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::MANIFEST_FILE_NAME;
use crate::core::RunManifest;
use crate::interfaces::IndexError;
use crate::interfaces::ManifestIndex;
use crate::runtime::rundir::LEGACY_RUNS_DIR;
use crate::runtime::rundir::TMP_DIR_NAME;

// ============================================================================
// SECTION: Errors and Summary
// ============================================================================

/// Errors raised while rebuilding an index.
#[derive(Debug, Error)]
pub enum ReindexError {
    /// Artifacts root could not be walked.
    #[error("reindex walk failed at {path}: {reason}")]
    Walk {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// Index backend rejected a write.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// One manifest that failed to load during reindexing.
#[derive(Debug, Clone)]
pub struct ReindexFailure {
    /// Manifest path.
    pub path: PathBuf,
    /// Failure description.
    pub reason: String,
}

/// Summary of one reindex pass.
#[derive(Debug, Clone, Default)]
pub struct ReindexSummary {
    /// Manifests successfully indexed.
    pub indexed: usize,
    /// Manifests that failed to load.
    pub failures: Vec<ReindexFailure>,
}

// ============================================================================
// SECTION: Reindex
// ============================================================================

/// Rebuilds the given index by re-reading every manifest on disk.
///
/// Build directories and the legacy alias tree are skipped. Unreadable
/// manifests are reported in the summary rather than aborting the pass.
///
/// # Errors
///
/// Returns [`ReindexError`] when the walk fails or the index rejects a
/// write.
pub fn reindex(
    artifacts_root: &Path,
    index: &mut dyn ManifestIndex,
) -> Result<ReindexSummary, ReindexError> {
    let mut summary = ReindexSummary::default();
    let mut manifest_paths = Vec::new();
    for entry in walkdir::WalkDir::new(artifacts_root).follow_links(false) {
        let entry = entry.map_err(|err| ReindexError::Walk {
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
            manifest_paths.push(entry.path().to_path_buf());
        }
    }
    manifest_paths.sort();

    for path in manifest_paths {
        match RunManifest::load(&path) {
            Ok(manifest) => {
                index.upsert(&manifest)?;
                summary.indexed += 1;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "manifest unreadable during reindex");
                summary.failures.push(ReindexFailure {
                    path,
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(summary)
}
