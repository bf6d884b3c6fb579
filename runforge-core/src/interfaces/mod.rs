// runforge-core/src/interfaces/mod.rs
// ============================================================================
// Module: Runforge Interfaces
// Description: Backend-agnostic collaborator contracts for the core.
// Purpose: Define generation, corpus, observability, and index surfaces.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the deterministic core integrates with external
//! systems without embedding backend specifics. The text generator is
//! treated as a pure function from (prompt, model configuration) to output
//! bytes; observability emission is no-op-safe and may never fail a run;
//! the manifest index is write-only from the core's point of view: the
//! core rebuilds it and never reads it back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::JobId;
use crate::core::ModelConfig;
use crate::core::RunId;
use crate::core::RunManifest;
use crate::core::RunStatus;
use crate::core::Sha256Digest;

// ============================================================================
// SECTION: Text Generator
// ============================================================================

/// One generation request handed to the external adapter.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    /// Fully rendered prompt text.
    pub prompt: &'a str,
    /// Model configuration snapshot.
    pub model: &'a ModelConfig,
    /// Deterministic seed for variant generation, when applicable.
    pub seed: Option<u32>,
}

/// Provider usage metadata, recorded in the volatile projection only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageMeta {
    /// Prompt tokens consumed.
    pub prompt_tokens: Option<u64>,
    /// Completion tokens produced.
    pub completion_tokens: Option<u64>,
}

/// Output of one generation call.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Generated text.
    pub text: String,
    /// Optional usage metadata.
    pub usage: Option<UsageMeta>,
}

/// Generation errors.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Provider adapter reported an error.
    #[error("generation provider error: {0}")]
    Provider(String),
}

/// Backend-agnostic text generator.
///
/// Determinism of the generator itself is not the core's responsibility;
/// the core records the model configuration as a hashed input and treats
/// the call as opaque.
pub trait TextGenerator {
    /// Generates text for the given request.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] when the provider call fails.
    fn generate(&self, request: &GenerationRequest<'_>) -> Result<GenerationOutput, GenerationError>;
}

/// Deterministic generator returning a fixed response.
///
/// Stands in for provider adapters in tests and offline demos, mirroring
/// the stubbed output path of systems without credentials configured.
#[derive(Debug, Clone)]
pub struct FixedResponseGenerator {
    /// Response text returned for every request.
    response: String,
}

impl FixedResponseGenerator {
    /// Creates a generator that always returns `response`.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl TextGenerator for FixedResponseGenerator {
    fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<GenerationOutput, GenerationError> {
        let text = match request.seed {
            Some(seed) => format!("{}\n<!-- seed:{seed} -->", self.response),
            None => self.response.clone(),
        };
        Ok(GenerationOutput {
            text,
            usage: None,
        })
    }
}

// ============================================================================
// SECTION: Corpus Reader
// ============================================================================

/// Corpus access errors.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// Requested path escapes the corpus root or is malformed.
    #[error("unsafe corpus path: {0}")]
    UnsafePath(String),
    /// Corpus I/O failure.
    #[error("corpus io error at {path}: {reason}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
}

/// Read-only, path-safe corpus access.
pub trait CorpusReader {
    /// Lists repo-relative file paths under a repo-relative root, sorted
    /// lexicographically. A missing root yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError`] when the root is unsafe or unreadable.
    fn list_files(&self, root: &str) -> Result<Vec<String>, CorpusError>;

    /// Reads the bytes of a repo-relative file.
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError`] when the path is unsafe or unreadable.
    fn read_file(&self, path: &str) -> Result<Vec<u8>, CorpusError>;
}

/// Filesystem-backed corpus reader rooted at the repository root.
#[derive(Debug, Clone)]
pub struct FsCorpusReader {
    /// Repository root.
    repo_root: PathBuf,
}

impl FsCorpusReader {
    /// Creates a reader over the given repository root.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }
}

impl CorpusReader for FsCorpusReader {
    fn list_files(&self, root: &str) -> Result<Vec<String>, CorpusError> {
        ensure_relative(root)?;
        let base = self.repo_root.join(root);
        if !base.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in walkdir::WalkDir::new(&base).follow_links(false) {
            let entry = entry.map_err(|err| CorpusError::Io {
                path: base.display().to_string(),
                reason: err.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(&self.repo_root).unwrap_or(entry.path());
            let rendered: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            paths.push(rendered.join("/"));
        }
        paths.sort();
        Ok(paths)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>, CorpusError> {
        ensure_relative(path)?;
        let full = self.repo_root.join(path);
        fs::read(&full).map_err(|err| CorpusError::Io {
            path: path.to_string(),
            reason: err.to_string(),
        })
    }
}

/// Rejects absolute paths and parent-directory traversal.
fn ensure_relative(path: &str) -> Result<(), CorpusError> {
    let candidate = Path::new(path);
    for component in candidate.components() {
        match component {
            Component::ParentDir | Component::Prefix(_) | Component::RootDir => {
                return Err(CorpusError::UnsafePath(path.to_string()));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Observability Emitter
// ============================================================================

/// Run identity metadata handed to the emitter.
#[derive(Debug, Clone)]
pub struct RunTelemetry<'a> {
    /// Governance job identifier.
    pub job_id: &'a JobId,
    /// Content-addressed run identifier.
    pub run_id: &'a RunId,
    /// Combined inputs hash.
    pub inputs_hash: &'a Sha256Digest,
    /// Job type tag.
    pub job_type: &'a str,
    /// Ephemeral queue identifier, when present.
    pub queue_job_id: Option<&'a str>,
}

/// No-op-safe observability emitter.
///
/// Emission is downstream of the manifest and never participates in any
/// hash; implementations must swallow their own failures.
pub trait ObservabilityEmitter {
    /// Opens a trace for the run and returns its identifier, if any.
    fn begin_trace(&self, telemetry: &RunTelemetry<'_>) -> Option<String> {
        let _ = telemetry;
        None
    }

    /// Records the terminal status of the run.
    fn run_finished(&self, telemetry: &RunTelemetry<'_>, status: RunStatus) {
        let _ = (telemetry, status);
    }
}

/// Emitter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl ObservabilityEmitter for NoopEmitter {}

// ============================================================================
// SECTION: Manifest Index
// ============================================================================

/// Manifest index errors.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Index backend reported an error.
    #[error("manifest index error: {0}")]
    Index(String),
}

/// Write-only external index over run manifests.
///
/// The core rebuilds the index from disk via `reindex` and never depends
/// on its contents.
pub trait ManifestIndex {
    /// Inserts or replaces the index entry for a manifest.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] when the backend rejects the write.
    fn upsert(&mut self, manifest: &RunManifest) -> Result<(), IndexError>;
}

/// In-memory manifest index for tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemoryManifestIndex {
    /// Indexed manifests keyed by run identifier.
    entries: std::collections::BTreeMap<String, RunManifest>,
}

impl InMemoryManifestIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of indexed manifests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the indexed manifest for a run identifier, if present.
    #[must_use]
    pub fn get(&self, run_id: &RunId) -> Option<&RunManifest> {
        self.entries.get(run_id.as_str())
    }
}

impl ManifestIndex for InMemoryManifestIndex {
    fn upsert(&mut self, manifest: &RunManifest) -> Result<(), IndexError> {
        self.entries.insert(manifest.run_id.as_str().to_string(), manifest.clone());
        Ok(())
    }
}
