// runforge-core/src/core/context.rs
// ============================================================================
// Module: Runforge Context Pack
// Description: Context selection specs and the resolved context snapshot.
// Purpose: Capture corpus selection and content in one hashed record.
// Dependencies: crate::core::hashing, serde
// ============================================================================

//! ## Overview
//! A context pack records *how* corpus files were chosen (the selection
//! spec) and *what* was chosen (the concatenated content plus its hash) in
//! a single snapshot, so a change to either the selection rules or the
//! corpus bytes surfaces as an `inputs_hash` change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::Sha256Digest;

// ============================================================================
// SECTION: Selection Strategy
// ============================================================================

/// Strategy used to materialize the context pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStrategy {
    /// Pattern-based selection over the corpus.
    #[default]
    Glob,
    /// Deterministic keyword retrieval with a fixed query and top-k.
    Retrieve,
}

/// Retrieval scoring method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    /// BM25-style keyword scoring.
    #[default]
    Keyword,
}

// ============================================================================
// SECTION: Selectors
// ============================================================================

/// Declarative glob selection over a corpus root.
///
/// All paths are repo-relative; iteration order of selected files is the
/// sorted union, lexicographic by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSelector {
    /// Repo-relative root directory to search.
    pub root: String,
    /// Include patterns, matched relative to `root`.
    pub include_globs: Vec<String>,
    /// Exclude patterns, matched relative to `root`.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Maximum number of files selected by this selector.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

/// Default file cap per selector.
fn default_max_files() -> usize {
    200
}

/// Parameters that affect retrieval scoring, embedded in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Scoring method.
    pub method: RetrievalMethod,
    /// Query string.
    pub query: String,
    /// Number of documents retained.
    pub top_k: usize,
    /// Roots searched for candidates.
    pub roots: Vec<String>,
    /// Include patterns for candidate gathering.
    pub include_globs: Vec<String>,
    /// Exclude patterns for candidate gathering.
    pub exclude_globs: Vec<String>,
    /// Candidate cap before scoring.
    pub max_files: usize,
    /// Number of candidates considered.
    pub num_candidates: usize,
    /// Tokenization scheme label.
    pub tokenization: String,
    /// Scoring scheme label.
    pub scoring: String,
    /// BM25 term-frequency saturation parameter.
    pub bm25_k1: f64,
    /// BM25 length-normalization parameter.
    pub bm25_b: f64,
}

// ============================================================================
// SECTION: Selected Items
// ============================================================================

/// One selected corpus document, in final selection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedItem {
    /// Repo-relative path.
    pub path: String,
    /// Digest of the document bytes.
    pub sha256: Sha256Digest,
    /// Document size in bytes.
    pub size_bytes: u64,
    /// Retrieval score; absent in glob mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

// ============================================================================
// SECTION: Context Spec and Resolved Pack
// ============================================================================

/// Selection specification embedded in the context snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSpec {
    /// Spec schema version.
    #[serde(default = "default_spec_version")]
    pub schema_version: String,
    /// Brief reference that produced this context, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_ref: Option<String>,
    /// Job type routed to the pipeline, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    /// Selection strategy.
    pub strategy: ContextStrategy,
    /// Glob selectors (glob strategy).
    #[serde(default)]
    pub selectors: Vec<ContextSelector>,
    /// Query string (retrieve strategy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Retrieval parameters (retrieve strategy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalConfig>,
    /// Ordered list of selected documents.
    #[serde(default)]
    pub selected_items: Vec<SelectedItem>,
}

/// Default context spec schema version.
fn default_spec_version() -> String {
    "1.0.0".to_string()
}

/// Fully resolved context pack written as `inputs/context.resolved.json`.
///
/// # Invariants
/// - `content_hash` is the digest of `content` bytes.
/// - Any change to `spec` or `content` changes the snapshot bytes and
///   therefore the run identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContext {
    /// Selection specification.
    pub spec: ContextSpec,
    /// Concatenated selected content.
    pub content: String,
    /// Digest of the content bytes.
    pub content_hash: Sha256Digest,
}
