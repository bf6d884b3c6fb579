// runforge-core/tests/common/mod.rs
// ============================================================================
// Module: Shared Test Scaffolding
// Description: Repository fixtures and engine construction helpers.
// ============================================================================
//! ## Overview
//! Builds throwaway repository roots (jobs, corpus, doctrine) and engines
//! wired with the deterministic fixed-response generator.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Shared helpers are consumed selectively per test binary."
)]

use std::fs;
use std::path::Path;

use runforge_core::DoctrineBinding;
use runforge_core::DoctrineId;
use runforge_core::DoctrineVersion;
use runforge_core::EngineConfig;
use runforge_core::ExecutionEngine;
use runforge_core::FixedResponseGenerator;
use runforge_core::NoopEmitter;
use tempfile::TempDir;

/// Job type wired to the example doctrine in test engines.
pub const JOB_TYPE: &str = "copy_generation";
/// Doctrine identifier used across tests.
pub const DOCTRINE_ID: &str = "prompts/example";
/// Doctrine version used across tests.
pub const DOCTRINE_VERSION: &str = "v1.0.0";

/// Writes a file under the root, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, content).expect("write fixture file");
}

/// Creates a repository root with the example doctrine installed.
pub fn scaffold_repo(doctrine_content: &str) -> TempDir {
    let repo = TempDir::new().expect("create repo tempdir");
    write_file(
        repo.path(),
        &format!("{DOCTRINE_ID}/{DOCTRINE_VERSION}/template.md"),
        doctrine_content,
    );
    repo
}

/// Renders a minimal brief for the given job id.
pub fn basic_brief(job_id: &str) -> String {
    format!(
        "schema_version: \"1.0.0\"\n\
         job_id: {job_id}\n\
         job_type: {JOB_TYPE}\n\
         title: Demo\n\
         tone_tags: [confident]\n"
    )
}

/// Renders a chainable brief bound to the given prior run.
pub fn chain_brief(job_id: &str, prior_run_id: &str, required_output: &str) -> String {
    format!(
        "schema_version: \"1.0.0\"\n\
         job_id: {job_id}\n\
         job_type: {JOB_TYPE}\n\
         chain:\n\
         \x20 prior_run_id: {prior_run_id}\n\
         \x20 prior_stage: {JOB_TYPE}\n\
         \x20 required_outputs: [{required_output}]\n"
    )
}

/// Builds an engine over the repository with deterministic generation.
pub fn engine_for(repo: &Path) -> ExecutionEngine {
    engine_with_response(repo, "Generated copy body")
}

/// Builds an engine with a specific fixed generator response.
pub fn engine_with_response(repo: &Path, response: &str) -> ExecutionEngine {
    let mut config = EngineConfig::new(repo);
    config.doctrine.whitelist.insert(DoctrineId::from(DOCTRINE_ID));
    config.doctrine_bindings.insert(
        JOB_TYPE.to_string(),
        DoctrineBinding {
            doctrine_id: DoctrineId::from(DOCTRINE_ID),
            version: DoctrineVersion::from(DOCTRINE_VERSION),
        },
    );
    ExecutionEngine::new(
        config,
        Box::new(FixedResponseGenerator::new(response)),
        Box::new(NoopEmitter),
    )
}
