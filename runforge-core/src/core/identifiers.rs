// runforge-core/src/core/identifiers.rs
// ============================================================================
// Module: Runforge Identifiers
// Description: Canonical opaque identifiers for jobs, runs, and snapshots.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the string-based identifiers used throughout Runforge.
//! Identifiers are opaque and serialize as plain strings. `JobId` is assigned
//! by governance and never derived from a hash; `RunId` is the 128-bit
//! content address of a run. Validation happens at the engine boundary, not
//! inside these wrappers, except where an identifier doubles as a filesystem
//! path component.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Job Identifier
// ============================================================================

/// Governance job identifier lifted verbatim from the brief.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new job identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reports whether the identifier is usable as a single path component.
    ///
    /// Job identifiers name directories under `artifacts/`; separators,
    /// parent references, and hidden-file prefixes are rejected.
    #[must_use]
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('.')
            && !self.0.contains('/')
            && !self.0.contains('\\')
            && !self.0.contains("..")
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Run Identifier
// ============================================================================

/// Content-addressed run identifier.
///
/// # Invariants
/// - The base form is the first 32 lowercase hex chars of the run's
///   `inputs_hash`.
/// - A deterministic `-N` suffix may follow on prefix collision; the suffix
///   is a directory-naming concern only and never feeds back into hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Creates a new run identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier with the collision suffix stripped.
    #[must_use]
    pub fn base(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// Returns a copy of this identifier with a collision suffix appended.
    #[must_use]
    pub fn with_suffix(&self, suffix: u32) -> Self {
        Self(format!("{}-{suffix}", self.0))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Snapshot Name
// ============================================================================

/// Name of a canonical input snapshot within a run.
///
/// The standard names are [`SnapshotName::BRIEF`], [`SnapshotName::CONTEXT`],
/// [`SnapshotName::MODEL_CONFIG`], [`SnapshotName::DOCTRINE`], and
/// [`SnapshotName::PRIOR_ARTIFACT`]; pipelines may declare additional
/// stage-specific snapshots. Consumers must iterate the manifest's declared
/// map rather than assume a closed set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotName(String);

impl SnapshotName {
    /// Brief snapshot name.
    pub const BRIEF: &'static str = "brief";
    /// Context snapshot name.
    pub const CONTEXT: &'static str = "context";
    /// Doctrine snapshot name.
    pub const DOCTRINE: &'static str = "doctrine";
    /// Model configuration snapshot name.
    pub const MODEL_CONFIG: &'static str = "model_config";
    /// Prior-artifact snapshot name (chainable stages only).
    pub const PRIOR_ARTIFACT: &'static str = "prior_artifact";

    /// Creates a new snapshot name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the run-relative file path for this snapshot.
    ///
    /// The model configuration is a domain file rather than a resolved input
    /// and keeps its plain name; every other snapshot is `<name>.resolved.json`.
    #[must_use]
    pub fn file_path(&self) -> String {
        if self.0 == Self::MODEL_CONFIG {
            format!("inputs/{}.json", self.0)
        } else {
            format!("inputs/{}.resolved.json", self.0)
        }
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SnapshotName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SnapshotName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Doctrine Identifiers
// ============================================================================

/// Doctrine identifier, e.g. `prompts/example`.
///
/// # Invariants
/// - Segment-structured: forward slashes separate segments; no segment may
///   be empty, `..`, or contain `\`. Validation lives in the doctrine store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DoctrineId(String);

impl DoctrineId {
    /// Creates a new doctrine identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DoctrineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DoctrineId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DoctrineId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Doctrine version token, e.g. `v1.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DoctrineVersion(String);

impl DoctrineVersion {
    /// Creates a new doctrine version.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Returns the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DoctrineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DoctrineVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DoctrineVersion {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
