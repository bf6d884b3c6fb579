// runforge-core/src/lib.rs
// ============================================================================
// Module: Runforge Core Library
// Description: Public API surface for the deterministic execution core.
// Purpose: Expose core types, collaborator interfaces, and the runtime.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Runforge is a deterministic, content-addressed execution core for
//! governed AI pipelines. Given a brief, a corpus, a model configuration,
//! and a versioned prompt doctrine, it produces artifacts whose identity is
//! the hash of their inputs: re-executing with identical inputs is a no-op
//! replay, and changing any input byte yields a new, distinct artifact
//! directory. Pipelines chain by consuming a prior run's outputs as a
//! first-class hashed input.
//!
//! The core is backend-agnostic: job submission, queues, provider
//! adapters, index databases, and span emitters integrate through the
//! explicit interfaces in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::CorpusError;
pub use interfaces::CorpusReader;
pub use interfaces::FixedResponseGenerator;
pub use interfaces::FsCorpusReader;
pub use interfaces::GenerationError;
pub use interfaces::GenerationOutput;
pub use interfaces::GenerationRequest;
pub use interfaces::InMemoryManifestIndex;
pub use interfaces::IndexError;
pub use interfaces::ManifestIndex;
pub use interfaces::NoopEmitter;
pub use interfaces::ObservabilityEmitter;
pub use interfaces::RunTelemetry;
pub use interfaces::TextGenerator;
pub use interfaces::UsageMeta;
pub use runtime::ContextDefaults;
pub use runtime::DoctrineBinding;
pub use runtime::EngineConfig;
pub use runtime::EngineError;
pub use runtime::ExecutionEngine;
pub use runtime::Migration;
pub use runtime::MigrationEngine;
pub use runtime::MigrationRegistry;
pub use runtime::MigrationStats;
pub use runtime::PriorArtifactBinder;
pub use runtime::PriorArtifactBinding;
pub use runtime::ReplayReport;
pub use runtime::RunDirectoryManager;
pub use runtime::RunRequest;
pub use runtime::RunVerifier;
pub use runtime::SnapshotWriter;
pub use runtime::VerificationReport;
pub use runtime::reindex;
