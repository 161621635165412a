//! Run command - the full pipeline for one change

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::{info, warn};

use farmgate_core::config::{validate_config, WorkspaceConfig};
use farmgate_core::error::ConfigError;
use farmgate_core::node::advertised_labels;
use farmgate_core::{
    BoardProfile, Config, Manifest, NodeRequirement, Outcome, PendingPatch, Pipeline,
    PipelineResult, PipelineStages, RunRequest,
};
use farmgate_git::{RepoCli, WorkspaceSynchronizer};
use farmgate_tasks::GitChangeDetector;
use farmgate_testing::{ArtifactManager, TestExecutor, TsvReporter};

use crate::cli::output::{self, SpinnerReporter};
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes;

/// Synchronize, select, execute and report one change
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Manifest URL (overrides manifest.url)
    #[arg(long)]
    pub manifest_url: Option<String>,

    /// Branch to synchronize (overrides manifest.branch)
    #[arg(long, env = "GERRIT_BRANCH")]
    pub branch: Option<String>,

    /// Project the pending change belongs to
    #[arg(long, env = "GERRIT_PROJECT", requires = "change_ref")]
    pub project: Option<String>,

    /// Review reference of the pending change, e.g. refs/changes/34/1234/2
    #[arg(long, env = "GERRIT_REFSPEC", requires = "project")]
    pub change_ref: Option<String>,

    /// Target device identifier
    #[arg(long, env = "FARMGATE_BOARD")]
    pub board: String,

    /// Environment overlay name
    #[arg(long, env = "FARMGATE_OVERLAY")]
    pub overlay: String,

    /// Board configuration file handed to the runner
    #[arg(long, env = "FARMGATE_BOARD_CONFIG")]
    pub board_config: Option<PathBuf>,

    /// Run identifier (default: run-<UTC timestamp>)
    #[arg(long, env = "BUILD_TAG")]
    pub run_id: Option<String>,

    /// Extra runner environment variable
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Write the review comment to this file
    #[arg(long)]
    pub comment_out: Option<PathBuf>,

    /// Exit with a distinct code when any test failed
    #[arg(long)]
    pub fail_on_test_failure: bool,

    /// Parallel jobs for the checkout tool
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl RunCommand {
    /// Execute the run command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<i32> {
        info!(board = %self.board, overlay = %self.overlay, "executing run command");
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<i32> {
        let (mut config, config_path) = cli.load_config()?;
        if let Some(path) = &config_path {
            info!(path = %path.display(), "using configuration");
        }
        self.apply_overrides(&mut config);
        validate_config(&config)?;

        let manifest = Manifest::from_config(&config.manifest)
            .ok_or_else(|| ConfigError::MissingField("manifest.url".to_string()))?;
        let workspace = cli.workspace(&config)?;
        let request = self.request(&config, manifest);

        let mut pipeline = Pipeline::new(self.stages(&config, &workspace)?);
        if cli.text_output() {
            pipeline = pipeline.with_reporter(Arc::new(SpinnerReporter::new()));
        }

        let result = pipeline.run_until(&request, interrupted()).await;

        if let Some(path) = &self.comment_out {
            std::fs::write(path, comment_text(&result))?;
            info!(path = %path.display(), "review comment written");
        }

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            OutputFormat::Text if !cli.quiet => output::print_result(&result),
            OutputFormat::Text => {}
        }

        Ok(exit_codes::for_result(&result, self.fail_on_test_failure))
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(url) = &self.manifest_url {
            config.manifest.url = Some(url.clone());
        }
        if let Some(branch) = &self.branch {
            config.manifest.branch = branch.clone();
        }
    }

    fn request(&self, config: &Config, manifest: Manifest) -> RunRequest {
        let mut profile = BoardProfile::new(&self.board, &self.overlay);
        if let Some(board_config) = &self.board_config {
            profile = profile.with_config(board_config);
        }

        let run_id = self.run_id.clone().unwrap_or_else(default_run_id);
        let mut request = RunRequest::new(run_id, manifest, profile)
            .with_base_ref(config.manifest.resolved_base_ref())
            .with_node(
                NodeRequirement::from_config(&config.node),
                advertised_labels(&config.node),
            )
            .with_env(self.env.iter().cloned().collect());

        if let (Some(project), Some(change_ref)) = (&self.project, &self.change_ref) {
            request = request.with_patch(PendingPatch::new(
                project,
                change_ref,
                &config.manifest.branch,
            ));
        }
        request
    }

    fn stages(&self, config: &Config, workspace: &WorkspaceConfig) -> anyhow::Result<PipelineStages> {
        let mut checkout = RepoCli::default();
        if let Some(jobs) = self.jobs {
            checkout = checkout.with_jobs(jobs);
        }

        Ok(PipelineStages {
            sync: Arc::new(WorkspaceSynchronizer::new(
                workspace.root.clone(),
                Arc::new(checkout),
            )),
            detector: Arc::new(GitChangeDetector::new(&config.selection)?),
            executor: Arc::new(TestExecutor::new(workspace, config.runner.clone())),
            reporter: Arc::new(TsvReporter::new()),
            finalizer: Arc::new(ArtifactManager::new(workspace)),
        })
    }
}

/// Resolves on Ctrl-C; never resolves if the signal cannot be watched
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for interrupts");
        std::future::pending::<()>().await;
    }
}

fn default_run_id() -> String {
    format!("run-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"))
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Text handed to the review poster
fn comment_text(result: &PipelineResult) -> String {
    match &result.outcome {
        Outcome::Completed { report } => report.comment(),
        Outcome::NoOp { summary } => format!(
            "NO_OP: no effective change ({} files, +{} -{})",
            summary.file_count, summary.insertions, summary.deletions
        ),
        Outcome::Failed { stage, reason } => format!("FAILED in {}: {}", stage, reason),
    }
}
