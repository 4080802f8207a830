//! Verification pipeline
//!
//! Stages run strictly in order and each is gated on the previous one:
//! tools, hardware, cache root, model snapshots, tokenizer assets, report.
//! Checks inside a stage run concurrently and are all awaited before the
//! stage is judged, so a failing stage reports every problem at once.

use crate::checks::{CheckResult, RequiredTools, check_tools};
use crate::config::{ModelConfig, PreflightConfig};
use crate::env_file::write_env_file;
use crate::error::PreflightError;
use crate::gpu::check_gpu;
use crate::models::{
    AssetReconciler, CacheResolver, ModelPaths, ReconciliationReport, SnapshotResolver,
    download_model_to_cache,
};
use crate::runner::SharedRunner;
use futures::future::join_all;
use std::path::{Path, PathBuf};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Tools,
    Hardware,
    Cache,
    Models,
    Assets,
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tools => write!(f, "tools"),
            Self::Hardware => write!(f, "hardware"),
            Self::Cache => write!(f, "cache"),
            Self::Models => write!(f, "models"),
            Self::Assets => write!(f, "assets"),
            Self::Report => write!(f, "report"),
        }
    }
}

/// Result of one stage plus any copy-paste fixes for its failures
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: Stage,
    pub check: CheckResult,
    pub remediation: Vec<String>,
}

impl StageResult {
    fn new(stage: Stage, check: CheckResult) -> Self {
        Self {
            stage,
            check,
            remediation: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub id: String,
    pub env_key: Option<String>,
    pub paths: ModelPaths,
}

/// Everything resolved by a successful run
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub cache_root: PathBuf,
    pub models: Vec<ResolvedModel>,
    pub assets: Vec<(String, ReconciliationReport)>,
    pub env_file: Option<PathBuf>,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone)]
pub struct PreflightOutcome {
    /// Stages that ran, in order; a failed stage is always last
    pub stages: Vec<StageResult>,
    /// Present only when every stage passed
    pub report: Option<PreflightReport>,
}

impl PreflightOutcome {
    pub fn success(&self) -> bool {
        self.report.is_some()
    }

    pub fn failed_stage(&self) -> Option<&StageResult> {
        self.stages.iter().find(|s| !s.check.success)
    }

    pub fn exit_code(&self) -> i32 {
        if self.success() { 0 } else { 1 }
    }

    fn fail(stages: Vec<StageResult>) -> Self {
        Self {
            stages,
            report: None,
        }
    }
}

/// The verification orchestrator
///
/// Owns the memoizing resolvers so every stage shares the same cache root
/// and snapshot lookups for the lifetime of this value.
pub struct Preflight {
    config: PreflightConfig,
    runner: SharedRunner,
    cache: CacheResolver,
    snapshots: SnapshotResolver,
}

impl Preflight {
    pub fn new(mut config: PreflightConfig, runner: SharedRunner) -> Self {
        config.normalize_model_ids();

        let cache = match &config.cache_dir {
            Some(root) => CacheResolver::with_root(runner.clone(), root.clone()),
            None => CacheResolver::new(
                runner.clone(),
                config.cache_env_command.clone(),
                config.cache_env_key.clone(),
            ),
        };

        Self {
            config,
            runner,
            cache,
            snapshots: SnapshotResolver::new(),
        }
    }

    pub fn config(&self) -> &PreflightConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheResolver {
        &self.cache
    }

    pub fn snapshots(&self) -> &SnapshotResolver {
        &self.snapshots
    }

    /// Run every stage, stopping at the first failing one
    pub async fn run(&self) -> PreflightOutcome {
        let mut stages = Vec::new();
        tracing::info!(runtime = self.runner.name(), "Starting preflight checks");

        let tools = self.tool_stage().await;
        let passed = tools.check.success;
        stages.push(tools);
        if !passed {
            return PreflightOutcome::fail(stages);
        }

        let hardware = self.hardware_stage().await;
        let passed = hardware.check.success;
        stages.push(hardware);
        if !passed {
            return PreflightOutcome::fail(stages);
        }

        let cache_root = match self.cache.resolve().await {
            Ok(root) => {
                stages.push(StageResult::new(
                    Stage::Cache,
                    CheckResult::pass("cache", format!("Model cache root: {}", root.display())),
                ));
                root.to_path_buf()
            }
            Err(e) => {
                tracing::error!(error = %e, "Cache stage failed");
                stages.push(StageResult::new(
                    Stage::Cache,
                    CheckResult::fail("cache", e.to_string()),
                ));
                return PreflightOutcome::fail(stages);
            }
        };

        let (models_stage, models) = self.model_stage(&cache_root).await;
        let passed = models_stage.check.success;
        stages.push(models_stage);
        if !passed {
            return PreflightOutcome::fail(stages);
        }

        let (assets_stage, assets) = self.asset_stage(&models).await;
        stages.push(assets_stage);

        let report_stage = self.report_stage(&models).await;
        let passed = report_stage.check.success;
        stages.push(report_stage);
        if !passed {
            return PreflightOutcome::fail(stages);
        }

        tracing::info!(models = models.len(), "Preflight checks passed");

        PreflightOutcome {
            stages,
            report: Some(PreflightReport {
                cache_root,
                models,
                assets,
                env_file: self.config.env_file.clone(),
            }),
        }
    }

    async fn tool_stage(&self) -> StageResult {
        let required = RequiredTools {
            tools: self.config.tools.clone(),
            hub_cli: self.config.hub_cli.clone(),
        };
        let check = check_tools(self.runner.as_ref(), &required).await;
        if !check.success {
            tracing::error!(messages = ?check.messages, "Tool stage failed");
        }
        StageResult::new(Stage::Tools, check)
    }

    async fn hardware_stage(&self) -> StageResult {
        let check = check_gpu(self.runner.as_ref(), self.config.gpu_requirements()).await;
        if !check.success {
            tracing::error!(messages = ?check.messages, "Hardware stage failed");
        }
        StageResult::new(Stage::Hardware, check)
    }

    /// Resolve every configured model concurrently
    async fn model_stage(&self, cache_root: &Path) -> (StageResult, Vec<ResolvedModel>) {
        let lookups = self
            .config
            .models
            .iter()
            .map(|model| async move { (model, self.resolve_model(cache_root, &model.id).await) });
        let outcomes = join_all(lookups).await;

        let mut checks = Vec::new();
        let mut remediation = Vec::new();
        let mut resolved = Vec::new();

        for (model, outcome) in outcomes {
            match outcome {
                Ok(paths) => {
                    checks.push(CheckResult::pass(
                        &model.id,
                        format!("{}: {}", model.id, paths.snapshot_dir.display()),
                    ));
                    resolved.push(resolved_model(model, paths));
                }
                Err(e) => {
                    tracing::error!(model_id = %model.id, error = %e, "Model resolution failed");
                    if let Some(fix) = e.remediation(&self.config.download_command) {
                        remediation.push(fix);
                    }
                    checks.push(CheckResult::fail(&model.id, e.to_string()));
                }
            }
        }

        let mut stage = StageResult::new(Stage::Models, CheckResult::aggregate("models", checks));
        stage.remediation = remediation;
        (stage, resolved)
    }

    /// Resolve one model, downloading it first when allowed and missing
    async fn resolve_model(&self, cache_root: &Path, model_id: &str) -> Result<ModelPaths, PreflightError> {
        match self.snapshots.resolve(cache_root, model_id).await {
            Err(PreflightError::ModelNotFound { .. } | PreflightError::SnapshotNotFound { .. })
                if self.config.download_missing =>
            {
                tracing::info!(model_id = %model_id, "Model missing, downloading");
                download_model_to_cache(model_id, cache_root).await?;
                self.snapshots.resolve(cache_root, model_id).await
            }
            other => other,
        }
    }

    /// Reconcile tokenizer assets; never fails the pipeline
    async fn asset_stage(
        &self,
        models: &[ResolvedModel],
    ) -> (StageResult, Vec<(String, ReconciliationReport)>) {
        let runs = self
            .config
            .models
            .iter()
            .filter(|m| !m.assets.is_empty())
            .filter_map(|m| {
                let resolved = models.iter().find(|r| r.id == m.id)?;
                let reconciler = AssetReconciler::new(&self.config.asset_dir, m.assets.clone())
                    .with_test_mode(self.config.test_mode);
                Some(async move {
                    let report = reconciler.reconcile(&resolved.paths.snapshot_dir).await;
                    (m.id.clone(), report)
                })
            });
        let reports = join_all(runs).await;

        let mut check = CheckResult {
            name: "assets".to_string(),
            success: true,
            messages: Vec::new(),
        };
        for (id, report) in &reports {
            check.messages.push(format!("{}: {}", id, report.summary()));
            for skipped in &report.skipped {
                check
                    .messages
                    .push(format!("{}: skipped {} ({})", id, skipped.file, skipped.reason));
            }
        }
        if reports.is_empty() {
            check.messages.push("no assets to reconcile".to_string());
        }

        (StageResult::new(Stage::Assets, check), reports)
    }

    async fn report_stage(&self, models: &[ResolvedModel]) -> StageResult {
        let Some(path) = &self.config.env_file else {
            return StageResult::new(
                Stage::Report,
                CheckResult::pass("report", "no env file configured"),
            );
        };

        let entries: Vec<(String, String)> = models
            .iter()
            .filter_map(|m| {
                let key = m.env_key.clone()?;
                Some((key, m.paths.snapshot_dir.display().to_string()))
            })
            .collect();

        let check = match write_env_file(path, &entries).await {
            Ok(()) => CheckResult::pass(
                "report",
                format!("Wrote {} entries to {}", entries.len(), path.display()),
            ),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to write env file");
                CheckResult::fail(
                    "report",
                    format!("Failed to write env file {}: {}", path.display(), e),
                )
            }
        };
        StageResult::new(Stage::Report, check)
    }
}

fn resolved_model(model: &ModelConfig, paths: ModelPaths) -> ResolvedModel {
    ResolvedModel {
        id: model.id.clone(),
        env_key: model.env_key.clone(),
        paths,
    }
}
