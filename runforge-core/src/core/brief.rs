// runforge-core/src/core/brief.rs
// ============================================================================
// Module: Runforge Brief
// Description: Governance request model with explicit-key tracking.
// Purpose: Provide the immutable, snapshot-stable job specification.
// Dependencies: crate::core::{context, identifiers}, serde, serde_yaml
// ============================================================================

//! ## Overview
//! A brief is the governance request that starts a run. It is parsed once,
//! validated, and frozen by the act of snapshotting. The brief schema has
//! grown optional extension fields over time (generation mode, variant
//! count, retrieval settings); to keep historical run identities stable,
//! the canonical snapshot omits an extension field if and only if it was
//! absent from the source document *and* sits at its built-in default. The
//! explicit-key set recorded at parse time is the gate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::context::ContextStrategy;
use crate::core::context::RetrievalMethod;
use crate::core::hashing::CodecError;
use crate::core::identifiers::JobId;
use crate::core::identifiers::RunId;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum number of deterministic variants per run.
pub const MAX_VARIANT_COUNT: u32 = 20;
/// Maximum retrieval top-k.
pub const MAX_RETRIEVAL_TOP_K: usize = 100;

/// Extension fields gated by the explicit-key set during serialization.
const EXTENSION_FIELDS: &[&str] = &[
    "generation_mode",
    "variant_count",
    "output_formats",
    "context_mode",
    "context_query",
    "retrieval_top_k",
    "retrieval_method",
];

// ============================================================================
// SECTION: Enumerations
// ============================================================================

/// Output strategy for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Generate one output.
    #[default]
    Single,
    /// Generate N deterministic variations.
    Variants,
    /// Generate the primary output in additional formats.
    Format,
}

/// Output format renditions for format mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Markdown rendition.
    Md,
    /// JSON rendition.
    Json,
    /// YAML rendition.
    Yaml,
}

// ============================================================================
// SECTION: Blocks and Chain Inputs
// ============================================================================

/// Free-form input block included in the rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefBlock {
    /// Block name, e.g. `post_context`.
    pub name: String,
    /// Block kind label.
    #[serde(default = "default_block_kind")]
    pub kind: String,
    /// Block content.
    pub content: String,
}

/// Default kind for brief blocks.
fn default_block_kind() -> String {
    "markdown".to_string()
}

/// Chain inputs naming the upstream run a chainable stage consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInputs {
    /// Run identifier of the finalized upstream run.
    pub prior_run_id: RunId,
    /// Stage label of the upstream run.
    pub prior_stage: String,
    /// Output files the upstream run must provide.
    pub required_outputs: Vec<String>,
}

// ============================================================================
// SECTION: Brief Specification
// ============================================================================

/// Governance request routed to a pipeline.
///
/// # Invariants
/// - Immutable within a run once snapshotted.
/// - `job_id` is governance-assigned and never derived from a hash.
/// - `explicit_keys` records the top-level keys present in the source
///   document and is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefSpec {
    /// Brief schema version.
    #[serde(default = "default_brief_version")]
    pub schema_version: String,
    /// Governance job identifier.
    pub job_id: JobId,
    /// Job type tag routed to a pipeline.
    pub job_type: String,
    /// Optional human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Tone tags steering generation.
    #[serde(default)]
    pub tone_tags: Vec<String>,
    /// Free-form constraints passed through to the prompt.
    #[serde(default)]
    pub constraints: BTreeMap<String, Value>,
    /// Input blocks included in the rendered prompt.
    #[serde(default)]
    pub blocks: Vec<BriefBlock>,
    /// Output strategy.
    #[serde(default)]
    pub generation_mode: GenerationMode,
    /// Variant count for variants mode.
    #[serde(default = "default_variant_count")]
    pub variant_count: u32,
    /// Output formats for format mode.
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<OutputFormat>,
    /// Context selection strategy.
    #[serde(default)]
    pub context_mode: ContextStrategy,
    /// Query string for retrieve mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_query: Option<String>,
    /// Retrieval top-k for retrieve mode.
    #[serde(default = "default_retrieval_top_k")]
    pub retrieval_top_k: usize,
    /// Retrieval scoring method.
    #[serde(default)]
    pub retrieval_method: RetrievalMethod,
    /// Chain inputs; present only for chainable stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainInputs>,
    /// Top-level keys present in the source document.
    #[serde(skip)]
    explicit_keys: BTreeSet<String>,
}

/// Default brief schema version.
fn default_brief_version() -> String {
    "1.0.0".to_string()
}

/// Default variant count.
fn default_variant_count() -> u32 {
    1
}

/// Default output format list.
fn default_output_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Md]
}

/// Default retrieval top-k.
fn default_retrieval_top_k() -> usize {
    10
}

impl BriefSpec {
    /// Parses a brief from YAML text, recording the explicit-key set.
    ///
    /// # Errors
    ///
    /// Returns [`BriefError::Parse`] when the document is malformed.
    pub fn from_yaml_str(text: &str) -> Result<Self, BriefError> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|err| BriefError::Parse(err.to_string()))?;
        Self::from_value(value)
    }

    /// Builds a brief from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`BriefError::Parse`] when the value does not match the
    /// brief schema.
    pub fn from_value(value: Value) -> Result<Self, BriefError> {
        let explicit_keys: BTreeSet<String> = value
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        let mut brief: Self =
            serde_json::from_value(value).map_err(|err| BriefError::Parse(err.to_string()))?;
        brief.explicit_keys = explicit_keys;
        Ok(brief)
    }

    /// Reports whether the given top-level key appeared in the source.
    #[must_use]
    pub fn is_explicit(&self, key: &str) -> bool {
        self.explicit_keys.contains(key)
    }

    /// Reports whether this brief describes a chainable stage.
    #[must_use]
    pub fn is_chainable(&self) -> bool {
        self.chain.is_some()
    }

    /// Validates field ranges and path safety.
    ///
    /// # Errors
    ///
    /// Returns [`BriefError::Invalid`] on the first violated constraint.
    pub fn validate(&self) -> Result<(), BriefError> {
        if !self.job_id.is_path_safe() {
            return Err(BriefError::Invalid {
                field: "job_id",
                reason: "must be a single safe path component".to_string(),
            });
        }
        if self.job_type.is_empty() {
            return Err(BriefError::Invalid {
                field: "job_type",
                reason: "must not be empty".to_string(),
            });
        }
        if self.variant_count == 0 || self.variant_count > MAX_VARIANT_COUNT {
            return Err(BriefError::Invalid {
                field: "variant_count",
                reason: format!("must be in 1..={MAX_VARIANT_COUNT}"),
            });
        }
        if self.retrieval_top_k == 0 || self.retrieval_top_k > MAX_RETRIEVAL_TOP_K {
            return Err(BriefError::Invalid {
                field: "retrieval_top_k",
                reason: format!("must be in 1..={MAX_RETRIEVAL_TOP_K}"),
            });
        }
        if self.context_mode == ContextStrategy::Retrieve
            && self.context_query.as_deref().is_none_or(str::is_empty)
        {
            return Err(BriefError::Invalid {
                field: "context_query",
                reason: "required for retrieve context mode".to_string(),
            });
        }
        if let Some(chain) = &self.chain {
            if chain.required_outputs.is_empty() {
                return Err(BriefError::Invalid {
                    field: "chain.required_outputs",
                    reason: "must name at least one output".to_string(),
                });
            }
            for output in &chain.required_outputs {
                if output.is_empty()
                    || output.starts_with('/')
                    || output.contains('\\')
                    || output.split('/').any(|segment| segment.is_empty() || segment == "..")
                {
                    return Err(BriefError::Invalid {
                        field: "chain.required_outputs",
                        reason: format!("unsafe output path: {output}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the canonical snapshot value for this brief.
    ///
    /// Extension fields that were absent from the source document and sit
    /// at their built-in defaults are omitted, keeping run identities stable
    /// across backward-compatible schema growth.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the brief cannot be encoded.
    pub fn resolved_value(&self) -> Result<Value, CodecError> {
        let mut value =
            serde_json::to_value(self).map_err(|err| CodecError::Encode(err.to_string()))?;
        if let Value::Object(map) = &mut value {
            for field in EXTENSION_FIELDS {
                if self.explicit_keys.contains(*field) {
                    continue;
                }
                let at_default =
                    map.get(*field).is_none_or(|current| *current == extension_default(field));
                if at_default {
                    map.remove(*field);
                }
            }
        }
        Ok(value)
    }

    /// Renders the brief summary block substituted into prompt templates.
    #[must_use]
    pub fn prompt_block(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Job: {} ({})", self.job_id, self.job_type));
        if let Some(title) = &self.title {
            lines.push(format!("Title: {title}"));
        }
        if !self.tone_tags.is_empty() {
            lines.push(format!("Tone: {}", self.tone_tags.join(", ")));
        }
        for (key, value) in &self.constraints {
            lines.push(format!("Constraint {key}: {value}"));
        }
        for block in &self.blocks {
            lines.push(String::new());
            lines.push(format!("## {}", block.name));
            lines.push(block.content.trim_end().to_string());
        }
        lines.join("\n")
    }
}

/// Built-in default value for an extension field.
fn extension_default(field: &str) -> Value {
    match field {
        "variant_count" => Value::from(1),
        "output_formats" => serde_json::json!(["md"]),
        "context_mode" => Value::from("glob"),
        "retrieval_top_k" => Value::from(10),
        "retrieval_method" => Value::from("keyword"),
        "generation_mode" => Value::from("single"),
        // context_query and any future optional field default to absent.
        _ => Value::Null,
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while parsing or validating a brief.
#[derive(Debug, Error)]
pub enum BriefError {
    /// Brief document is malformed.
    #[error("brief parse error: {0}")]
    Parse(String),
    /// Brief field violates a constraint.
    #[error("invalid brief field {field}: {reason}")]
    Invalid {
        /// Violating field name.
        field: &'static str,
        /// Constraint description.
        reason: String,
    },
}
