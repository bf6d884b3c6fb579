// runforge-core/src/runtime/mod.rs
// ============================================================================
// Module: Runforge Runtime
// Description: Run orchestration, persistence, verification, and migration.
// Purpose: Implement the deterministic run lifecycle over the filesystem.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The runtime owns everything that touches disk: snapshot persistence,
//! context materialization, the atomic run directory lifecycle, prior-run
//! binding, payload orchestration, verification, reindexing, and schema
//! migrations.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod binder;
pub mod engine;
pub mod migrate;
pub mod reindex;
pub mod resolver;
pub mod retrieval;
pub mod rundir;
pub mod snapshot;
pub mod verifier;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use binder::BinderError;
pub use binder::PriorArtifactBinder;
pub use binder::PriorArtifactBinding;
pub use binder::PriorManifestSubset;
pub use engine::DoctrineBinding;
pub use engine::EngineConfig;
pub use engine::EngineError;
pub use engine::ExecutionEngine;
pub use engine::RunRequest;
pub use migrate::AddChainMetadata;
pub use migrate::AddInputSnapshots;
pub use migrate::AddSnapshotAndChainFields;
pub use migrate::BASELINE_SCHEMA_VERSION;
pub use migrate::IDENTITY_FIELDS;
pub use migrate::Migration;
pub use migrate::MigrationEngine;
pub use migrate::MigrationError;
pub use migrate::MigrationFailure;
pub use migrate::MigrationOutcome;
pub use migrate::MigrationRegistry;
pub use migrate::MigrationStats;
pub use reindex::ReindexError;
pub use reindex::ReindexFailure;
pub use reindex::ReindexSummary;
pub use reindex::reindex;
pub use resolver::ContextDefaults;
pub use resolver::ContextError;
pub use resolver::ContextResolver;
pub use retrieval::BM25_B;
pub use retrieval::BM25_K1;
pub use retrieval::DocumentCandidate;
pub use retrieval::RankedCandidate;
pub use retrieval::rank_candidates;
pub use retrieval::tokenize;
pub use rundir::AliasOutcome;
pub use rundir::Destination;
pub use rundir::FinalizeOutcome;
pub use rundir::LEGACY_RUNS_DIR;
pub use rundir::RunDirError;
pub use rundir::RunDirectoryManager;
pub use rundir::TMP_DIR_NAME;
pub use snapshot::SnapshotError;
pub use snapshot::SnapshotWriter;
pub use verifier::CheckResult;
pub use verifier::ReplayReport;
pub use verifier::RunVerifier;
pub use verifier::VerificationReport;
