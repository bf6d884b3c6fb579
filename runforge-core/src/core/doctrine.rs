// runforge-core/src/core/doctrine.rs
// ============================================================================
// Module: Runforge Doctrine Store
// Description: Whitelisted, path-traversal-safe doctrine resolution.
// Purpose: Resolve (doctrine_id, version) to versioned template bytes.
// Dependencies: crate::core::{hashing, identifiers}, serde
// ============================================================================

//! ## Overview
//! Doctrine is the versioned prompt template tree kept in-repo. The store
//! resolves a `(doctrine_id, version)` pair against a fixed list of
//! repo-relative candidate roots, reads the file bytes, and returns a
//! [`DoctrineReference`] whose digest participates in `inputs_hash`.
//!
//! Identifiers are untrusted input: ids must appear in the compiled-in
//! whitelist, id segments and versions may not contain path metacharacters,
//! and the resolved path is always repo-relative with forward slashes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::Sha256Digest;
use crate::core::identifiers::DoctrineId;
use crate::core::identifiers::DoctrineVersion;

// ============================================================================
// SECTION: Doctrine Reference
// ============================================================================

/// Reference to the doctrine version used in an execution.
///
/// # Invariants
/// - `resolved_path` is repo-relative, forward-slash separated, and never
///   contains parent-directory traversal.
/// - `resolved_at` is volatile and never serialized; only content-based
///   fields participate in authoritative artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctrineReference {
    /// Doctrine identifier.
    pub doctrine_id: DoctrineId,
    /// Doctrine version token.
    pub version: DoctrineVersion,
    /// Digest of the doctrine content bytes.
    pub sha256: Sha256Digest,
    /// Repo-relative path where the doctrine was found.
    pub resolved_path: String,
    /// Wall-clock resolution time, memory-only.
    #[serde(skip)]
    pub resolved_at: Option<String>,
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Immutable doctrine store settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct DoctrineSettings {
    /// Whitelisted doctrine identifiers.
    pub whitelist: BTreeSet<DoctrineId>,
    /// Repo-relative candidate roots, searched in order.
    pub candidate_roots: Vec<String>,
    /// Filename within the version directory.
    pub template_filename: String,
}

impl Default for DoctrineSettings {
    fn default() -> Self {
        Self {
            whitelist: BTreeSet::new(),
            candidate_roots: vec![String::new(), "doctrine".to_string()],
            template_filename: "template.md".to_string(),
        }
    }
}

impl DoctrineSettings {
    /// Builds settings with the given whitelist and default roots.
    #[must_use]
    pub fn with_whitelist<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<DoctrineId>,
    {
        Self {
            whitelist: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while resolving doctrine.
#[derive(Debug, Error)]
pub enum DoctrineError {
    /// Identifier is not in the compiled-in whitelist.
    #[error("doctrine id not whitelisted: {0}")]
    NotWhitelisted(DoctrineId),
    /// Identifier or version contains path metacharacters.
    #[error("unsafe doctrine path token: {0}")]
    UnsafePath(String),
    /// No candidate root contains the requested doctrine.
    #[error("doctrine not found: {id}/{version}")]
    NotFound {
        /// Requested identifier.
        id: DoctrineId,
        /// Requested version.
        version: DoctrineVersion,
    },
    /// Doctrine file could not be read.
    #[error("doctrine read failed for {path}: {reason}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying failure.
        reason: String,
    },
}

// ============================================================================
// SECTION: Doctrine Store
// ============================================================================

/// Resolves whitelisted doctrine files under a repository root.
#[derive(Debug, Clone)]
pub struct DoctrineStore {
    /// Repository root.
    repo_root: PathBuf,
    /// Immutable settings.
    settings: DoctrineSettings,
}

impl DoctrineStore {
    /// Creates a store over the given repository root.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, settings: DoctrineSettings) -> Self {
        Self {
            repo_root: repo_root.into(),
            settings,
        }
    }

    /// Loads a doctrine file and computes its reference.
    ///
    /// Candidate roots are searched in order; the first existing file wins.
    ///
    /// # Errors
    ///
    /// Returns [`DoctrineError::NotWhitelisted`], [`DoctrineError::UnsafePath`],
    /// [`DoctrineError::NotFound`], or [`DoctrineError::Read`].
    pub fn load(
        &self,
        id: &DoctrineId,
        version: &DoctrineVersion,
    ) -> Result<(Vec<u8>, DoctrineReference), DoctrineError> {
        validate_id(id)?;
        validate_token(version.as_str())?;
        validate_token(&self.settings.template_filename)?;
        if !self.settings.whitelist.contains(id) {
            return Err(DoctrineError::NotWhitelisted(id.clone()));
        }

        let relative: PathBuf = id
            .as_str()
            .split('/')
            .collect::<PathBuf>()
            .join(version.as_str())
            .join(&self.settings.template_filename);

        let mut resolved: Option<PathBuf> = None;
        for root in &self.settings.candidate_roots {
            let candidate = if root.is_empty() {
                self.repo_root.join(&relative)
            } else {
                self.repo_root.join(root).join(&relative)
            };
            if candidate.is_file() {
                resolved = Some(candidate);
                break;
            }
        }
        let Some(path) = resolved else {
            return Err(DoctrineError::NotFound {
                id: id.clone(),
                version: version.clone(),
            });
        };

        let bytes = fs::read(&path).map_err(|err| DoctrineError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let reference = DoctrineReference {
            doctrine_id: id.clone(),
            version: version.clone(),
            sha256: Sha256Digest::of_bytes(&bytes),
            resolved_path: repo_relative(&self.repo_root, &path),
            resolved_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        Ok((bytes, reference))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates a segment-structured doctrine identifier.
fn validate_id(id: &DoctrineId) -> Result<(), DoctrineError> {
    let text = id.as_str();
    if text.is_empty() || text.starts_with('/') || text.ends_with('/') {
        return Err(DoctrineError::UnsafePath(text.to_string()));
    }
    for segment in text.split('/') {
        if segment.is_empty() || segment == ".." || segment.contains('\\') {
            return Err(DoctrineError::UnsafePath(text.to_string()));
        }
    }
    Ok(())
}

/// Validates a single-segment token (version or filename).
fn validate_token(token: &str) -> Result<(), DoctrineError> {
    if token.is_empty() || token.contains('/') || token.contains('\\') || token.contains("..") {
        return Err(DoctrineError::UnsafePath(token.to_string()));
    }
    Ok(())
}

/// Renders a path relative to the repo root with forward slashes.
fn repo_relative(repo_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(repo_root).unwrap_or(path);
    let rendered: Vec<String> =
        relative.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    rendered.join("/")
}
