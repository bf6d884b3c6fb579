// runforge-core/src/core/model.rs
// ============================================================================
// Module: Runforge Model Configuration
// Description: Hashed configuration for the external text generator.
// Purpose: Capture every generation parameter that can alter outputs.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The model configuration is snapshotted as `inputs/model_config.json` and
//! participates in `inputs_hash`. The core never invokes a provider itself;
//! the configuration is handed to the generator interface verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Model Configuration
// ============================================================================

/// Generation parameters recorded as a canonical input snapshot.
///
/// # Invariants
/// - Every field here can alter generator output and therefore hashes.
///   Usage metadata returned by providers is volatile and lives elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider label, e.g. `openai`.
    pub provider: String,
    /// Model name within the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling parameter.
    pub top_p: f64,
    /// Response schema reference, e.g. `response_schemas/copy_package`.
    pub response_schema: String,
    /// Response schema version token.
    pub response_schema_version: String,
    /// Whether provider-side caching is enabled.
    pub cache_enabled: bool,
    /// Optional cap on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.3,
            top_p: 1.0,
            response_schema: "response_schemas/copy_package".to_string(),
            response_schema_version: "v1.0.0".to_string(),
            cache_enabled: true,
            max_output_tokens: None,
        }
    }
}
