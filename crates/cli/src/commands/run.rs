use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use transplant_core::analysis::{load_snapshot, plan_translation, snapshot_hash};
use transplant_core::services::models::default_model_registry;
use transplant_core::services::oracle::Oracle;
use transplant_core::services::pipeline::{Pipeline, RunSummary};
use transplant_core::services::run_log::RunLog;
use transplant_core::services::validator::Validator;
use transplant_core::workspace::{load_pipeline_config, PipelineConfig};

use crate::commands::setup::{setup_workspace, SetupPaths};
use crate::{canonicalize_or_current, load_datasets};

/// Arguments of `transplant run`, as parsed by the binary.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub dataset: String,
    pub datasets: Option<String>,
    pub data_dir: String,
    pub template_dir: String,
    pub output_dir: String,
    pub model: Option<String>,
    pub num_attempts: Option<u32>,
    pub config: Option<String>,
    pub verbose: bool,
}

/// Resolve the run configuration: config file (if any), then CLI overrides.
pub fn resolve_pipeline_config(
    config: Option<&Path>,
    model: Option<String>,
    num_attempts: Option<u32>,
) -> Result<PipelineConfig> {
    let mut resolved = match config {
        Some(path) => load_pipeline_config(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(model) = model {
        resolved.model = model;
    }
    if let Some(attempts) = num_attempts {
        if attempts == 0 {
            return Err(anyhow!("--num-attempts must be at least 1"));
        }
        resolved.attempts = attempts;
    }
    Ok(resolved)
}

/// Set up a workspace for one dataset and translate everything reachable
/// from the entry function.
pub fn run_command(args: RunArgs) -> Result<RunSummary> {
    let config = resolve_pipeline_config(
        args.config.as_deref().map(Path::new),
        args.model,
        args.num_attempts,
    )?;

    let data_dir = canonicalize_or_current(&args.data_dir)?;
    let datasets_path = match &args.datasets {
        Some(path) => canonicalize_or_current(path)?,
        None => data_dir.join("datasets.json"),
    };
    let datasets = load_datasets(&datasets_path)?;
    let dataset = datasets.get(&args.dataset).ok_or_else(|| {
        anyhow!(
            "Dataset {} not found in {} (known: {})",
            args.dataset,
            datasets_path.display(),
            datasets.keys().cloned().collect::<Vec<_>>().join(", ")
        )
    })?;

    // Resolve the model before touching the filesystem.
    let mut registry = default_model_registry();
    let model = registry.take(&config.model)?;
    let oracle = Oracle::new(model, config.max_malformed_responses);

    let paths = SetupPaths {
        data_dir,
        template_dir: canonicalize_or_current(&args.template_dir)?,
        output_dir: canonicalize_or_current(&args.output_dir)?,
    };
    let (workspace, tests) =
        setup_workspace(dataset, &paths, config.toolchain.clone(), args.verbose)?;

    let snapshot = workspace.layout().snapshot_path.clone();
    let records = load_snapshot(&snapshot)?;
    let hash = snapshot_hash(&snapshot)?;
    let order = plan_translation(records, &config.entry_function)?;

    let run_log = RunLog::create(
        workspace.layout().run_log_path.clone(),
        config.attempts,
        config.model.clone(),
        Some(hash),
    )
    .context("Failed to create run log")?;
    let log_path: PathBuf = run_log.path().to_path_buf();

    let validator = Validator::new(config.compile_attempts, args.verbose);
    let mut pipeline = Pipeline::new(workspace, oracle, validator, tests, config.attempts, run_log);
    let summary = pipeline.run(order)?;

    info!(log = %log_path.display(), "run log written");
    println!("Translated {} function(s), {} failed.", summary.translated, summary.failed);
    for report in &summary.reports {
        println!("  - {} [{}] after {} attempt(s)", report.function, report.outcome, report.attempts);
    }
    println!("Run log: {}", log_path.display());
    Ok(summary)
}
