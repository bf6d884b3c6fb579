// runforge-core/src/core/mod.rs
// ============================================================================
// Module: Runforge Core Types
// Description: Canonical schema, hashing, and identity structures.
// Purpose: Provide stable, serializable types for briefs, runs, and manifests.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types define the brief, context pack, model configuration, doctrine
//! reference, and run manifest, together with the canonical codec and the
//! identity kernel. These types are the source of truth for any derived
//! surface (queue adapters, HTTP, or SDKs).

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod brief;
pub mod context;
pub mod doctrine;
pub mod hashing;
pub mod identifiers;
pub mod identity;
pub mod manifest;
pub mod model;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use brief::BriefBlock;
pub use brief::BriefError;
pub use brief::BriefSpec;
pub use brief::ChainInputs;
pub use brief::GenerationMode;
pub use brief::MAX_RETRIEVAL_TOP_K;
pub use brief::MAX_VARIANT_COUNT;
pub use brief::OutputFormat;
pub use context::ContextSelector;
pub use context::ContextSpec;
pub use context::ContextStrategy;
pub use context::ResolvedContext;
pub use context::RetrievalConfig;
pub use context::RetrievalMethod;
pub use context::SelectedItem;
pub use doctrine::DoctrineError;
pub use doctrine::DoctrineReference;
pub use doctrine::DoctrineSettings;
pub use doctrine::DoctrineStore;
pub use hashing::CodecError;
pub use hashing::SHA256_PREFIX;
pub use hashing::Sha256Digest;
pub use hashing::canonical_json_bytes;
pub use hashing::compact_json_bytes;
pub use hashing::hash_canonical_value;
pub use identifiers::DoctrineId;
pub use identifiers::DoctrineVersion;
pub use identifiers::JobId;
pub use identifiers::RunId;
pub use identifiers::SnapshotName;
pub use identity::RUN_ID_HEX_LEN;
pub use identity::compute_inputs_hash;
pub use identity::derive_run_id;
pub use manifest::ArtifactEntry;
pub use manifest::ChainMetadata;
pub use manifest::MANIFEST_FILE_NAME;
pub use manifest::MANIFEST_SCHEMA_VERSION;
pub use manifest::ManifestError;
pub use manifest::MigrationRecord;
pub use manifest::PriorStageRef;
pub use manifest::RunManifest;
pub use manifest::RunStatus;
pub use manifest::SnapshotMeta;
pub use manifest::VOLATILE_FIELDS;
pub use model::ModelConfig;
