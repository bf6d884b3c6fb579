// runforge-core/src/runtime/engine.rs
// ============================================================================
// Module: Runforge Execution Engine
// Description: Orchestrates a single deterministic, content-addressed run.
// Purpose: Resolve inputs, snapshot, derive identity, execute, finalize.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! `execute_run` drives the strict per-run order: resolve inputs → write
//! snapshots → compute `inputs_hash` → derive `run_id` → check for replay →
//! execute the payload → write outputs → write the manifest → finalize
//! atomically. Input-resolution and prior-binding errors surface before any
//! filesystem mutation; payload failures still finalize a manifest with
//! failed status so downstream inspection and verification keep working
//! against the snapshot set.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::core::ArtifactEntry;
use crate::core::BriefError;
use crate::core::BriefSpec;
use crate::core::ChainMetadata;
use crate::core::CodecError;
use crate::core::DoctrineError;
use crate::core::DoctrineId;
use crate::core::DoctrineSettings;
use crate::core::DoctrineStore;
use crate::core::DoctrineVersion;
use crate::core::GenerationMode;
use crate::core::JobId;
use crate::core::MANIFEST_FILE_NAME;
use crate::core::MANIFEST_SCHEMA_VERSION;
use crate::core::ManifestError;
use crate::core::ModelConfig;
use crate::core::OutputFormat;
use crate::core::PriorStageRef;
use crate::core::ResolvedContext;
use crate::core::RunManifest;
use crate::core::RunStatus;
use crate::core::Sha256Digest;
use crate::core::SnapshotName;
use crate::core::canonical_json_bytes;
use crate::core::compute_inputs_hash;
use crate::core::derive_run_id;
use crate::interfaces::FsCorpusReader;
use crate::interfaces::GenerationRequest;
use crate::interfaces::ObservabilityEmitter;
use crate::interfaces::RunTelemetry;
use crate::interfaces::TextGenerator;
use crate::runtime::binder::BinderError;
use crate::runtime::binder::PriorArtifactBinder;
use crate::runtime::resolver::ContextDefaults;
use crate::runtime::resolver::ContextError;
use crate::runtime::resolver::ContextResolver;
use crate::runtime::rundir::Destination;
use crate::runtime::rundir::FinalizeOutcome;
use crate::runtime::rundir::RunDirError;
use crate::runtime::rundir::RunDirectoryManager;
use crate::runtime::snapshot::SnapshotError;
use crate::runtime::snapshot::SnapshotWriter;
use crate::runtime::verifier::ReplayReport;
use crate::runtime::verifier::RunVerifier;
use crate::runtime::verifier::VerificationReport;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Doctrine selection for one job type.
#[derive(Debug, Clone)]
pub struct DoctrineBinding {
    /// Doctrine identifier.
    pub doctrine_id: DoctrineId,
    /// Doctrine version token.
    pub version: DoctrineVersion,
}

/// Immutable engine configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Repository root containing `jobs/`, the corpus, doctrine, and
    /// `artifacts/`.
    pub repo_root: PathBuf,
    /// Doctrine store settings (whitelist, candidate roots, filename).
    pub doctrine: DoctrineSettings,
    /// Doctrine bindings by job type; job types without a binding are
    /// rejected.
    pub doctrine_bindings: BTreeMap<String, DoctrineBinding>,
    /// Model configuration snapshotted into every run.
    pub model: ModelConfig,
    /// Corpus selection defaults.
    pub context: ContextDefaults,
    /// Whether to maintain the legacy `artifacts/runs/` alias tree.
    pub legacy_alias: bool,
}

impl EngineConfig {
    /// Creates a configuration with default settings for a repository root.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            doctrine: DoctrineSettings::default(),
            doctrine_bindings: BTreeMap::new(),
            model: ModelConfig::default(),
            context: ContextDefaults::default(),
            legacy_alias: true,
        }
    }

    /// Returns the artifacts root under the repository.
    #[must_use]
    pub fn artifacts_root(&self) -> PathBuf {
        self.repo_root.join("artifacts")
    }
}

/// One run submission handed to the engine.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Repo-relative path to the brief, under `jobs/`.
    pub job_ref: String,
    /// Ephemeral queue identifier; audited but never hashed.
    pub queue_job_id: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by `execute_run`.
///
/// Payload failures are not errors at this boundary: they finalize a
/// manifest with failed status and are reported through it.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Brief malformed or invalid.
    #[error(transparent)]
    Brief(#[from] BriefError),
    /// Doctrine resolution failed.
    #[error(transparent)]
    Doctrine(#[from] DoctrineError),
    /// Context resolution failed.
    #[error(transparent)]
    Context(#[from] ContextError),
    /// Prior-artifact binding failed.
    #[error(transparent)]
    Binder(#[from] BinderError),
    /// Snapshot persistence failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// Run directory lifecycle failed.
    #[error(transparent)]
    RunDir(#[from] RunDirError),
    /// Manifest I/O failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// Canonical encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// No doctrine binding exists for the brief's job type.
    #[error("unsupported job_type: {0}")]
    UnknownJobType(String),
    /// Job reference is absolute, escapes the repository, or leaves `jobs/`.
    #[error("unsafe job_ref: {0}")]
    UnsafeJobRef(String),
    /// Job reference does not resolve to a file.
    #[error("job_ref not found: {0}")]
    JobRefNotFound(String),
    /// Output artifact I/O failed inside the build directory.
    #[error("output io error at {path}: {reason}")]
    OutputIo {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
    /// Brief file could not be read.
    #[error("brief io error at {path}: {reason}")]
    BriefIo {
        /// Path involved.
        path: String,
        /// Underlying failure.
        reason: String,
    },
}

// ============================================================================
// SECTION: Execution Engine
// ============================================================================

/// Drives deterministic runs against a repository root.
pub struct ExecutionEngine {
    /// Immutable configuration.
    config: EngineConfig,
    /// Doctrine resolution.
    doctrine_store: DoctrineStore,
    /// Run directory lifecycle.
    run_dirs: RunDirectoryManager,
    /// External text generator.
    generator: Box<dyn TextGenerator + Send + Sync>,
    /// Observability emitter; no-op-safe.
    emitter: Box<dyn ObservabilityEmitter + Send + Sync>,
}

impl ExecutionEngine {
    /// Creates an engine from configuration and collaborators.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        generator: Box<dyn TextGenerator + Send + Sync>,
        emitter: Box<dyn ObservabilityEmitter + Send + Sync>,
    ) -> Self {
        let doctrine_store = DoctrineStore::new(&config.repo_root, config.doctrine.clone());
        let run_dirs = RunDirectoryManager::new(config.artifacts_root(), config.legacy_alias);
        Self {
            config,
            doctrine_store,
            run_dirs,
            generator,
            emitter,
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes one run and returns its manifest.
    ///
    /// Re-invoking with identical inputs returns the existing manifest with
    /// status [`RunStatus::IdempotentReplay`] and writes nothing under the
    /// canonical path. A payload failure finalizes a manifest with
    /// [`RunStatus::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] for input-resolution, prior-binding,
    /// snapshot, or finalize failures.
    #[allow(
        clippy::too_many_lines,
        reason = "The run lifecycle is a single strict sequence; splitting it obscures the ordering contract."
    )]
    pub fn execute_run(&self, request: &RunRequest) -> Result<RunManifest, EngineError> {
        // Input resolution is read-only; nothing is written until every
        // input has resolved.
        let brief_path = resolve_job_ref(&self.config.repo_root, &request.job_ref)?;
        let brief_text = fs::read_to_string(&brief_path).map_err(|err| EngineError::BriefIo {
            path: brief_path.display().to_string(),
            reason: err.to_string(),
        })?;
        let brief = BriefSpec::from_yaml_str(&brief_text)?;
        brief.validate()?;

        let binding = self
            .config
            .doctrine_bindings
            .get(&brief.job_type)
            .ok_or_else(|| EngineError::UnknownJobType(brief.job_type.clone()))?;
        let (doctrine_bytes, doctrine_ref) =
            self.doctrine_store.load(&binding.doctrine_id, &binding.version)?;
        let doctrine_content = String::from_utf8_lossy(&doctrine_bytes).into_owned();

        let reader = FsCorpusReader::new(&self.config.repo_root);
        let resolver = ContextResolver::new(&reader, &self.config.context);
        let context = resolver.resolve(&brief, &request.job_ref)?;

        let prior_binding = match &brief.chain {
            Some(chain) => {
                let binder = PriorArtifactBinder::new(self.run_dirs.artifacts_root());
                Some(binder.bind(chain)?)
            }
            None => None,
        };

        // Snapshot everything, then derive identity from on-disk bytes.
        let build_dir = self.run_dirs.stage(&brief.job_id)?;
        let mut snapshots = SnapshotWriter::new(&build_dir);
        snapshots.write(&SnapshotName::from(SnapshotName::BRIEF), &brief.resolved_value()?)?;
        snapshots.write(&SnapshotName::from(SnapshotName::CONTEXT), &context)?;
        snapshots.write(&SnapshotName::from(SnapshotName::MODEL_CONFIG), &self.config.model)?;
        snapshots.write(
            &SnapshotName::from(SnapshotName::DOCTRINE),
            &doctrine_snapshot(
                &doctrine_ref.doctrine_id,
                &doctrine_ref.version,
                &doctrine_ref.sha256,
                &doctrine_ref.resolved_path,
            ),
        )?;
        if let Some(binding) = &prior_binding {
            snapshots.write(&SnapshotName::from(SnapshotName::PRIOR_ARTIFACT), binding)?;
        }

        let inputs_hash = compute_inputs_hash(&snapshots.digest_map())?;
        let base_run_id = derive_run_id(&inputs_hash);

        let destination =
            self.run_dirs.resolve_destination(&brief.job_id, &base_run_id, &inputs_hash);
        let (run_id, run_dir) = match destination {
            Ok(Destination::Replay {
                run_id,
                run_dir,
            }) => {
                self.run_dirs.discard(&build_dir);
                let mut manifest = RunManifest::load_from_dir(&run_dir)?;
                manifest.status = RunStatus::IdempotentReplay;
                let alias = self.run_dirs.ensure_legacy_alias(&brief.job_id, &run_id);
                tracing::info!(
                    job_id = %brief.job_id,
                    job_ref = %request.job_ref,
                    inputs_hash = %inputs_hash,
                    run_id = %run_id,
                    queue_job_id = request.queue_job_id.as_deref(),
                    alias = ?alias,
                    "idempotent replay"
                );
                self.emitter.run_finished(
                    &RunTelemetry {
                        job_id: &brief.job_id,
                        run_id: &run_id,
                        inputs_hash: &inputs_hash,
                        job_type: &brief.job_type,
                        queue_job_id: request.queue_job_id.as_deref(),
                    },
                    RunStatus::IdempotentReplay,
                );
                return Ok(manifest);
            }
            Ok(Destination::Fresh {
                run_id,
                run_dir,
            }) => (run_id, run_dir),
            Err(err) => {
                self.run_dirs.discard(&build_dir);
                return Err(err.into());
            }
        };

        let telemetry = RunTelemetry {
            job_id: &brief.job_id,
            run_id: &run_id,
            inputs_hash: &inputs_hash,
            job_type: &brief.job_type,
            queue_job_id: request.queue_job_id.as_deref(),
        };
        let trace_id = self.emitter.begin_trace(&telemetry);
        tracing::info!(
            job_id = %brief.job_id,
            job_ref = %request.job_ref,
            inputs_hash = %inputs_hash,
            run_id = %run_id,
            queue_job_id = request.queue_job_id.as_deref(),
            doctrine = %doctrine_ref.version,
            "run started"
        );

        let chain_metadata = prior_binding.as_ref().map(|binding| ChainMetadata {
            is_chainable_stage: true,
            prior_stages: vec![PriorStageRef {
                prior_run_id: binding.prior_run_id.clone(),
                prior_job_id: binding.prior_job_id.clone(),
                prior_stage: binding.prior_stage.clone(),
            }],
        });

        let mut manifest = RunManifest {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            job_id: brief.job_id.clone(),
            run_id: run_id.clone(),
            queue_job_id: request.queue_job_id.clone(),
            job_ref: request.job_ref.clone(),
            job_type: brief.job_type.clone(),
            status: RunStatus::Running,
            inputs_hash: inputs_hash.clone(),
            input_snapshots: snapshots.into_metadata(),
            doctrine: Some(doctrine_ref),
            artifacts: BTreeMap::new(),
            chain_metadata,
            migration_history: Vec::new(),
            started_at: Some(chrono::Utc::now().to_rfc3339()),
            finished_at: None,
            langfuse_trace_id: trace_id,
            error: None,
        };

        match self.run_payload(&build_dir, &brief, &doctrine_content, &context, &inputs_hash) {
            Ok(artifacts) => {
                manifest.artifacts = artifacts;
                manifest.status = RunStatus::Succeeded;
            }
            Err(PayloadFailure::Generation(reason)) => {
                manifest.status = RunStatus::Failed;
                manifest.error = Some(reason);
            }
            Err(PayloadFailure::Engine(err)) => {
                self.run_dirs.discard(&build_dir);
                return Err(err);
            }
        }
        manifest.finished_at = Some(chrono::Utc::now().to_rfc3339());

        manifest.write(&build_dir.join(MANIFEST_FILE_NAME))?;
        if self.run_dirs.finalize(&build_dir, &run_dir, &inputs_hash)?
            == FinalizeOutcome::LostRace
        {
            let mut existing = RunManifest::load_from_dir(&run_dir)?;
            existing.status = RunStatus::IdempotentReplay;
            self.emitter.run_finished(&telemetry, RunStatus::IdempotentReplay);
            return Ok(existing);
        }
        let alias = self.run_dirs.ensure_legacy_alias(&brief.job_id, &run_id);

        tracing::info!(
            status = ?manifest.status,
            artifact_dir = %run_dir.display(),
            alias = ?alias,
            "run finalized"
        );
        self.emitter.run_finished(&telemetry, manifest.status);
        Ok(manifest)
    }

    /// Verifies a finalized run directory.
    #[must_use]
    pub fn verify_run(&self, run_dir: &Path) -> VerificationReport {
        RunVerifier::new().verify(run_dir)
    }

    /// Probes whether a run directory can be replayed idempotently.
    #[must_use]
    pub fn replay(&self, run_dir: &Path) -> ReplayReport {
        RunVerifier::new().replay(run_dir)
    }

    /// Executes the generation payload and writes outputs into the build
    /// directory.
    fn run_payload(
        &self,
        build_dir: &Path,
        brief: &BriefSpec,
        doctrine_content: &str,
        context: &ResolvedContext,
        inputs_hash: &Sha256Digest,
    ) -> Result<BTreeMap<String, ArtifactEntry>, PayloadFailure> {
        let prompt = doctrine_content
            .replace("{brief}", &brief.prompt_block())
            .replace("{context_items}", &context.content);

        let variant_total = match brief.generation_mode {
            GenerationMode::Variants => brief.variant_count,
            GenerationMode::Single | GenerationMode::Format => 1,
        };

        let mut variants = Vec::new();
        for index in 0..variant_total {
            let seed_digest = (brief.generation_mode == GenerationMode::Variants)
                .then(|| variant_seed(inputs_hash, index));
            let seed = seed_digest.as_ref().map(seed_from_digest);
            let output = self
                .generator
                .generate(&GenerationRequest {
                    prompt: &prompt,
                    model: &self.config.model,
                    seed,
                })
                .map_err(|err| PayloadFailure::Generation(err.to_string()))?;
            variants.push(VariantRecord {
                variant_index: index,
                seed: seed_digest.map(|digest| digest.as_str().to_string()),
                text: output.text,
            });
        }

        let mut artifacts = BTreeMap::new();
        let primary = ensure_trailing_newline(&variants[0].text);
        write_output(build_dir, "output.md", primary.as_bytes(), &mut artifacts)?;

        if brief.generation_mode == GenerationMode::Variants && variant_total > 1 {
            for variant in &variants {
                let body = ensure_trailing_newline(&variant.text);
                write_output(
                    build_dir,
                    &format!("variants/{:02}.md", variant.variant_index + 1),
                    body.as_bytes(),
                    &mut artifacts,
                )?;
            }
            let listing = canonical_json_bytes(&variants)
                .map_err(|err| PayloadFailure::Engine(err.into()))?;
            write_output(build_dir, "variants/variants.json", &listing, &mut artifacts)?;
        }

        if brief.generation_mode == GenerationMode::Format {
            let rendition = FormatRendition {
                job_id: brief.job_id.clone(),
                title: brief.title.clone(),
                text: variants[0].text.clone(),
            };
            for format in &brief.output_formats {
                match format {
                    OutputFormat::Md => {}
                    OutputFormat::Json => {
                        let bytes = canonical_json_bytes(&rendition)
                            .map_err(|err| PayloadFailure::Engine(err.into()))?;
                        write_output(build_dir, "output.json", &bytes, &mut artifacts)?;
                    }
                    OutputFormat::Yaml => {
                        let text = serde_yaml::to_string(&rendition).map_err(|err| {
                            PayloadFailure::Engine(EngineError::OutputIo {
                                path: "outputs/output.yaml".to_string(),
                                reason: err.to_string(),
                            })
                        })?;
                        write_output(build_dir, "output.yaml", text.as_bytes(), &mut artifacts)?;
                    }
                }
            }
        }

        Ok(artifacts)
    }
}

// ============================================================================
// SECTION: Payload Types
// ============================================================================

/// Internal split between captured payload failures and engine errors.
enum PayloadFailure {
    /// Generator failure, captured into the manifest.
    Generation(String),
    /// Engine failure, surfaced to the caller.
    Engine(EngineError),
}

/// One generated variant, persisted in `variants/variants.json`.
#[derive(Debug, Clone, Serialize)]
struct VariantRecord {
    /// Zero-based variant index.
    variant_index: u32,
    /// Deterministic seed digest, when variants mode is active.
    seed: Option<String>,
    /// Generated text.
    text: String,
}

/// Primary output rendered into alternate formats.
#[derive(Debug, Clone, Serialize)]
struct FormatRendition {
    /// Governance job identifier.
    job_id: JobId,
    /// Brief title, when present.
    title: Option<String>,
    /// Generated text.
    text: String,
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates a job reference and resolves it under the repository root.
fn resolve_job_ref(repo_root: &Path, job_ref: &str) -> Result<PathBuf, EngineError> {
    let candidate = Path::new(job_ref);
    if candidate.is_absolute() {
        return Err(EngineError::UnsafeJobRef(job_ref.to_string()));
    }
    let mut components = candidate.components();
    if components.next() != Some(Component::Normal("jobs".as_ref())) {
        return Err(EngineError::UnsafeJobRef(job_ref.to_string()));
    }
    if !components.all(|component| matches!(component, Component::Normal(_))) {
        return Err(EngineError::UnsafeJobRef(job_ref.to_string()));
    }
    let full = repo_root.join(candidate);
    if !full.is_file() {
        return Err(EngineError::JobRefNotFound(job_ref.to_string()));
    }
    Ok(full)
}

/// Builds the doctrine snapshot value.
///
/// The snapshot is the reference, not the template body: `sha256` already
/// binds the run to the doctrine content bytes, so the snapshot stays
/// byte-identical across implementations that resolve the same doctrine.
fn doctrine_snapshot(
    doctrine_id: &DoctrineId,
    version: &DoctrineVersion,
    sha256: &Sha256Digest,
    resolved_path: &str,
) -> serde_json::Value {
    serde_json::json!({
        "doctrine_id": doctrine_id,
        "version": version,
        "sha256": sha256,
        "resolved_path": resolved_path,
    })
}

/// Deterministic per-variant seed digest.
fn variant_seed(inputs_hash: &Sha256Digest, index: u32) -> Sha256Digest {
    Sha256Digest::of_bytes(format!("{}:variant:{index}", inputs_hash.as_str()).as_bytes())
}

/// Folds a seed digest into the integer seed handed to providers.
fn seed_from_digest(digest: &Sha256Digest) -> u32 {
    u32::from_str_radix(&digest.hex()[..8], 16).unwrap_or(0)
}

/// Appends a trailing newline when missing.
fn ensure_trailing_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

/// Writes one output file, hashes its on-disk bytes, and records the entry.
fn write_output(
    build_dir: &Path,
    name: &str,
    bytes: &[u8],
    artifacts: &mut BTreeMap<String, ArtifactEntry>,
) -> Result<(), PayloadFailure> {
    let relative = format!("outputs/{name}");
    let full = build_dir.join(&relative);
    let io_failure = |err: std::io::Error| {
        PayloadFailure::Engine(EngineError::OutputIo {
            path: full.display().to_string(),
            reason: err.to_string(),
        })
    };
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).map_err(io_failure)?;
    }
    fs::write(&full, bytes).map_err(io_failure)?;
    let on_disk = fs::read(&full).map_err(io_failure)?;
    artifacts.insert(
        name.to_string(),
        ArtifactEntry {
            path: relative,
            sha256: Sha256Digest::of_bytes(&on_disk),
            bytes: on_disk.len() as u64,
        },
    );
    Ok(())
}
