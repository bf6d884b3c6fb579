// runforge-core/src/runtime/retrieval.rs
// ============================================================================
// Module: Runforge Keyword Retrieval
// Description: Deterministic BM25-style corpus scoring.
// Purpose: Rank candidate documents with stable, replayable ordering.
// Dependencies: crate::core::hashing
// ============================================================================

//! ## Overview
//! Retrieval is deterministic by construction: no randomness, no wall-clock
//! reads, lowercase-alphanumeric tokenization, fixed BM25 parameters, and
//! ties broken by ascending document path. Rebuilding the ranking from the
//! filesystem alone yields identical results.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::Sha256Digest;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// BM25 term-frequency saturation parameter.
pub const BM25_K1: f64 = 1.5;
/// BM25 length-normalization parameter.
pub const BM25_B: f64 = 0.75;
/// Tokenization scheme label recorded in retrieval configs.
pub const TOKENIZATION_LABEL: &str = "lowercase_alphanumeric";
/// Scoring scheme label recorded in retrieval configs.
pub const SCORING_LABEL: &str = "bm25";

// ============================================================================
// SECTION: Candidates
// ============================================================================

/// One candidate document gathered from the corpus.
#[derive(Debug, Clone)]
pub struct DocumentCandidate {
    /// Repo-relative path.
    pub path: String,
    /// Document text.
    pub content: String,
    /// Digest of the document bytes.
    pub sha256: Sha256Digest,
    /// Document size in bytes.
    pub size_bytes: u64,
}

/// A ranked candidate with its score.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    /// Index into the candidate slice.
    pub index: usize,
    /// BM25 score.
    pub score: f64,
}

// ============================================================================
// SECTION: Tokenization
// ============================================================================

/// Deterministic tokenization: lowercase, alphanumeric runs only.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in text.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

// ============================================================================
// SECTION: Ranking
// ============================================================================

/// Ranks candidates against a query, descending by score with ascending
/// path as the tie-break.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    reason = "Corpus sizes are far below f64 integer precision."
)]
pub fn rank_candidates(query: &str, candidates: &[DocumentCandidate]) -> Vec<RankedCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let query_tokens: BTreeSet<String> = tokenize(query).into_iter().collect();
    let doc_tokens: Vec<Vec<String>> =
        candidates.iter().map(|candidate| tokenize(&candidate.content)).collect();

    let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
    let mut total_len = 0usize;
    for tokens in &doc_tokens {
        total_len += tokens.len();
        let unique: BTreeSet<&str> = tokens.iter().map(String::as_str).collect();
        for term in unique {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }
    let num_docs = candidates.len();
    let avg_len = total_len as f64 / num_docs as f64;

    let mut ranked: Vec<RankedCandidate> = doc_tokens
        .iter()
        .enumerate()
        .map(|(index, tokens)| RankedCandidate {
            index,
            score: bm25_score(&query_tokens, tokens, &doc_freq, num_docs, avg_len),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| candidates[a.index].path.cmp(&candidates[b.index].path))
    });
    ranked
}

/// Computes the BM25 score of one document against the query terms.
#[allow(
    clippy::cast_precision_loss,
    reason = "Term and document counts are far below f64 integer precision."
)]
fn bm25_score(
    query_terms: &BTreeSet<String>,
    doc_tokens: &[String],
    doc_freq: &BTreeMap<&str, usize>,
    num_docs: usize,
    avg_len: f64,
) -> f64 {
    if doc_tokens.is_empty() || avg_len == 0.0 {
        return 0.0;
    }
    let mut term_freq: BTreeMap<&str, usize> = BTreeMap::new();
    for token in doc_tokens {
        *term_freq.entry(token.as_str()).or_insert(0) += 1;
    }
    let doc_len = doc_tokens.len() as f64;

    let mut score = 0.0;
    for term in query_terms {
        let Some(&tf) = term_freq.get(term.as_str()) else {
            continue;
        };
        let df = doc_freq.get(term.as_str()).copied().unwrap_or(0);
        if df == 0 {
            continue;
        }
        let idf = (((num_docs as f64 - df as f64 + 0.5) / (df as f64 + 0.5)) + 1.0).ln();
        let tf = tf as f64;
        let norm_tf = tf / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len));
        score += idf * norm_tf;
    }
    score
}
