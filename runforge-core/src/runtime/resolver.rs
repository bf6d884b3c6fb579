// runforge-core/src/runtime/resolver.rs
// ============================================================================
// Module: Runforge Context Resolver
// Description: Materializes the context pack from the corpus.
// Purpose: Produce one snapshot capturing selection spec and content.
// Dependencies: crate::core, crate::interfaces, crate::runtime::retrieval, glob
// ============================================================================

//! ## Overview
//! The resolver materializes context by one of two strategies: glob
//! selection (declared pattern order, iteration in sorted path order) or
//! deterministic keyword retrieval (BM25 with stable tie-breaks). Both
//! strategies embed the full selection spec next to the concatenated
//! content so any change to either surfaces as a hash change.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use thiserror::Error;

use crate::core::BriefSpec;
use crate::core::ContextSelector;
use crate::core::ContextSpec;
use crate::core::ContextStrategy;
use crate::core::ResolvedContext;
use crate::core::RetrievalConfig;
use crate::core::SelectedItem;
use crate::core::Sha256Digest;
use crate::interfaces::CorpusError;
use crate::interfaces::CorpusReader;
use crate::runtime::retrieval::BM25_B;
use crate::runtime::retrieval::BM25_K1;
use crate::runtime::retrieval::DocumentCandidate;
use crate::runtime::retrieval::SCORING_LABEL;
use crate::runtime::retrieval::TOKENIZATION_LABEL;
use crate::runtime::retrieval::rank_candidates;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Corpus selection defaults applied when the brief does not override them.
#[derive(Debug, Clone)]
pub struct ContextDefaults {
    /// Repo-relative corpus root.
    pub root: String,
    /// Include patterns, relative to the root.
    pub include_globs: Vec<String>,
    /// Exclude patterns, relative to the root.
    pub exclude_globs: Vec<String>,
    /// Candidate cap per selector.
    pub max_files: usize,
}

impl Default for ContextDefaults {
    fn default() -> Self {
        Self {
            root: "corpus".to_string(),
            include_globs: vec!["**/*.md".to_string(), "**/*.txt".to_string()],
            exclude_globs: Vec::new(),
            max_files: 200,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while resolving context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Corpus access failed.
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    /// Glob pattern failed to compile.
    #[error("invalid context glob pattern {pattern}: {reason}")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Underlying failure.
        reason: String,
    },
    /// Retrieve strategy selected without a query.
    #[error("retrieve context mode requires a query")]
    MissingQuery,
}

// ============================================================================
// SECTION: Context Resolver
// ============================================================================

/// Materializes the context pack for a run.
pub struct ContextResolver<'a> {
    /// Corpus access.
    reader: &'a dyn CorpusReader,
    /// Selection defaults.
    defaults: &'a ContextDefaults,
}

impl<'a> ContextResolver<'a> {
    /// Creates a resolver over the given corpus and defaults.
    #[must_use]
    pub fn new(reader: &'a dyn CorpusReader, defaults: &'a ContextDefaults) -> Self {
        Self {
            reader,
            defaults,
        }
    }

    /// Resolves the context pack for a brief.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when corpus access or pattern compilation
    /// fails; resolution performs no filesystem mutation.
    pub fn resolve(&self, brief: &BriefSpec, job_ref: &str) -> Result<ResolvedContext, ContextError> {
        match brief.context_mode {
            ContextStrategy::Glob => self.resolve_glob(brief, job_ref),
            ContextStrategy::Retrieve => self.resolve_retrieve(brief, job_ref),
        }
    }

    /// Glob strategy: pattern selection in sorted path order.
    fn resolve_glob(
        &self,
        brief: &BriefSpec,
        job_ref: &str,
    ) -> Result<ResolvedContext, ContextError> {
        let selector = ContextSelector {
            root: self.defaults.root.clone(),
            include_globs: self.defaults.include_globs.clone(),
            exclude_globs: self.defaults.exclude_globs.clone(),
            max_files: self.defaults.max_files,
        };

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut items = Vec::new();
        let mut chunks = Vec::new();
        for path in self.select_paths(&selector)? {
            if !seen.insert(path.clone()) {
                continue;
            }
            let bytes = self.reader.read_file(&path)?;
            let text = String::from_utf8_lossy(&bytes);
            chunks.push(format!("\n\n# FILE: {path}\n{text}"));
            items.push(SelectedItem {
                path,
                sha256: Sha256Digest::of_bytes(&bytes),
                size_bytes: bytes.len() as u64,
                score: None,
            });
        }

        let content = chunks.concat().trim().to_string();
        let content_hash = Sha256Digest::of_bytes(content.as_bytes());
        Ok(ResolvedContext {
            spec: ContextSpec {
                schema_version: "1.0.0".to_string(),
                job_ref: Some(job_ref.to_string()),
                job_type: Some(brief.job_type.clone()),
                strategy: ContextStrategy::Glob,
                selectors: vec![selector],
                query: None,
                retrieval: None,
                selected_items: items,
            },
            content,
            content_hash,
        })
    }

    /// Retrieve strategy: deterministic keyword scoring over candidates.
    fn resolve_retrieve(
        &self,
        brief: &BriefSpec,
        job_ref: &str,
    ) -> Result<ResolvedContext, ContextError> {
        let query = brief.context_query.clone().ok_or(ContextError::MissingQuery)?;
        let selector = ContextSelector {
            root: self.defaults.root.clone(),
            include_globs: self.defaults.include_globs.clone(),
            exclude_globs: self.defaults.exclude_globs.clone(),
            max_files: self.defaults.max_files,
        };

        let mut candidates = Vec::new();
        for path in self.select_paths(&selector)? {
            let bytes = self.reader.read_file(&path)?;
            let content = String::from_utf8_lossy(&bytes).into_owned();
            candidates.push(DocumentCandidate {
                sha256: Sha256Digest::of_bytes(&bytes),
                size_bytes: bytes.len() as u64,
                path,
                content,
            });
        }

        let ranked = rank_candidates(&query, &candidates);
        let selected = &ranked[..ranked.len().min(brief.retrieval_top_k)];

        let mut items = Vec::new();
        let mut chunks = Vec::new();
        for entry in selected {
            let candidate = &candidates[entry.index];
            chunks.push(format!("\n\n# FILE: {}\n{}", candidate.path, candidate.content));
            items.push(SelectedItem {
                path: candidate.path.clone(),
                sha256: candidate.sha256.clone(),
                size_bytes: candidate.size_bytes,
                score: Some(entry.score),
            });
        }

        let retrieval = RetrievalConfig {
            method: brief.retrieval_method,
            query: query.clone(),
            top_k: brief.retrieval_top_k,
            roots: vec![selector.root.clone()],
            include_globs: selector.include_globs.clone(),
            exclude_globs: selector.exclude_globs.clone(),
            max_files: selector.max_files,
            num_candidates: candidates.len(),
            tokenization: TOKENIZATION_LABEL.to_string(),
            scoring: SCORING_LABEL.to_string(),
            bm25_k1: BM25_K1,
            bm25_b: BM25_B,
        };

        let content = chunks.concat().trim().to_string();
        let content_hash = Sha256Digest::of_bytes(content.as_bytes());
        Ok(ResolvedContext {
            spec: ContextSpec {
                schema_version: "1.0.0".to_string(),
                job_ref: Some(job_ref.to_string()),
                job_type: Some(brief.job_type.clone()),
                strategy: ContextStrategy::Retrieve,
                selectors: Vec::new(),
                query: Some(query),
                retrieval: Some(retrieval),
                selected_items: items,
            },
            content,
            content_hash,
        })
    }

    /// Applies a selector's include/exclude patterns over the corpus.
    ///
    /// Paths come back repo-relative in sorted order, capped at the
    /// selector's file limit.
    fn select_paths(&self, selector: &ContextSelector) -> Result<Vec<String>, ContextError> {
        let includes = compile_patterns(&selector.include_globs)?;
        let excludes = compile_patterns(&selector.exclude_globs)?;

        let prefix = if selector.root.is_empty() {
            String::new()
        } else {
            format!("{}/", selector.root)
        };

        let mut selected = Vec::new();
        for path in self.reader.list_files(&selector.root)? {
            let within_root = path.strip_prefix(&prefix).unwrap_or(&path);
            if !includes.iter().any(|pattern| pattern.matches(within_root)) {
                continue;
            }
            if excludes.iter().any(|pattern| pattern.matches(within_root)) {
                continue;
            }
            selected.push(path);
            if selected.len() >= selector.max_files {
                break;
            }
        }
        Ok(selected)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Compiles glob patterns, surfacing the offending pattern on failure.
fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>, ContextError> {
    patterns
        .iter()
        .map(|pattern| {
            glob::Pattern::new(pattern).map_err(|err| ContextError::Pattern {
                pattern: pattern.clone(),
                reason: err.to_string(),
            })
        })
        .collect()
}
