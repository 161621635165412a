//! Test execution in an isolated, per-run environment

use std::collections::BTreeMap;
use std::fs::File;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use farmgate_core::config::{RunnerConfig, WorkspaceConfig};
use farmgate_core::error::ExecutionError;
use farmgate_core::pipeline::TestExecution;
use farmgate_core::{BoardProfile, EnvironmentWarning, Execution, ModuleSelection};

use crate::process::{self, bin_dir, display_command};
use crate::report::load_records;

/// Runner output captured next to the results
pub const RUNNER_LOG: &str = "runner.log";

/// Depth searched for installable sub-repositories
const PROJECT_DEPTH: usize = 3;

/// [`TestExecution`] backed by a Python virtual environment.
///
/// Each run gets a fresh environment under the workspace: the runner package
/// is installed first and must succeed, then every sub-repository carrying a
/// marker file is installed in editable mode on a best-effort basis.
pub struct TestExecutor {
    root: PathBuf,
    results_dir: PathBuf,
    venv_dir: PathBuf,
    runner: RunnerConfig,
}

impl TestExecutor {
    pub fn new(workspace: &WorkspaceConfig, runner: RunnerConfig) -> Self {
        Self {
            root: workspace.root.clone(),
            results_dir: workspace.results_path(),
            venv_dir: workspace.venv_path(),
            runner,
        }
    }

    /// Path the runner is expected to write its results to
    pub fn result_file(&self) -> PathBuf {
        self.results_dir.join(&self.runner.result_file)
    }

    /// Runner arguments for a profile and selection
    pub fn runner_args(&self, profile: &BoardProfile, selection: &ModuleSelection) -> Vec<String> {
        let mut args: Vec<String> = Vec::with_capacity(self.runner.args.len());
        for template in &self.runner.args {
            // Without a board config its argument goes, and a flag directly before it
            if profile.config.is_none() && template.contains("{config}") {
                if template == "{config}" && args.last().is_some_and(|prev| prev.starts_with('-')) {
                    args.pop();
                }
                continue;
            }
            args.push(profile.expand(template, &self.results_dir));
        }
        if !selection.is_empty() {
            args.push(self.runner.module_flag.clone());
            args.extend(selection.ids().into_iter().map(str::to_string));
        }
        args
    }

    /// Sub-repositories with an install marker, relative to the root
    pub fn installable_projects(&self) -> Vec<PathBuf> {
        let skip = [self.venv_dir.as_path(), self.results_dir.as_path()];
        let mut projects = Vec::new();
        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(PROJECT_DEPTH)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_dir() {
                continue;
            }
            let hidden = entry.file_name().to_str().is_some_and(|n| n.starts_with('.'));
            if hidden || skip.contains(&entry.path()) {
                walker.skip_current_dir();
                continue;
            }
            let installable = self
                .runner
                .extra_install
                .iter()
                .any(|marker| entry.path().join(marker).is_file());
            if installable {
                if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                    projects.push(relative.to_path_buf());
                }
                walker.skip_current_dir();
            }
        }
        projects
    }

    async fn provision(&self) -> Result<(), ExecutionError> {
        let provision_error = |reason: String| ExecutionError::Provision {
            path: self.venv_dir.clone(),
            reason,
        };

        if self.venv_dir.exists() {
            warn!(path = %self.venv_dir.display(), "removing environment left by a previous run");
            std::fs::remove_dir_all(&self.venv_dir).map_err(|e| provision_error(e.to_string()))?;
        }

        let venv = self.venv_dir.display().to_string();
        let args = ["-m", "venv", venv.as_str()];
        let command_line = display_command(&self.runner.python, &args);
        let output = process::output(process::command(&self.runner.python, &args, &self.root), &command_line)
            .await
            .map_err(|e| provision_error(e.to_string()))?;
        if !output.status.success() {
            return Err(provision_error(process::failure_reason(&output)));
        }
        info!(path = %self.venv_dir.display(), "environment provisioned");
        Ok(())
    }

    fn pip(&self) -> PathBuf {
        bin_dir(&self.venv_dir).join("pip")
    }

    async fn install_runner(&self) -> Result<(), ExecutionError> {
        let args = ["install", self.runner.package.as_str()];
        let command_line = display_command(self.pip(), &args);
        let install_error = |reason: String| ExecutionError::RunnerInstall {
            package: self.runner.package.clone(),
            reason,
        };

        let output = process::output(process::command(self.pip(), &args, &self.root), &command_line)
            .await
            .map_err(|e| install_error(e.to_string()))?;
        if !output.status.success() {
            return Err(install_error(process::failure_reason(&output)));
        }
        info!(package = %self.runner.package, "test runner installed");
        Ok(())
    }

    async fn install_projects(&self) -> Vec<EnvironmentWarning> {
        let mut warnings = Vec::new();
        for project in self.installable_projects() {
            let path = self.root.join(&project);
            let target = path.display().to_string();
            let args = ["install", "-e", target.as_str()];
            let command_line = display_command(self.pip(), &args);

            let reason = match process::output(process::command(self.pip(), &args, &self.root), &command_line).await {
                Ok(output) if output.status.success() => None,
                Ok(output) => Some(process::failure_reason(&output)),
                Err(e) => Some(e.to_string()),
            };

            match reason {
                None => info!(project = %project.display(), "project dependencies installed"),
                Some(reason) => {
                    warn!(project = %project.display(), reason = %reason, "project dependency install failed");
                    warnings.push(EnvironmentWarning {
                        project: project.display().to_string(),
                        path: project.clone(),
                        reason,
                    });
                }
            }
        }
        warnings
    }
}

#[async_trait]
impl TestExecution for TestExecutor {
    #[instrument(skip_all, fields(board = %profile.board, overlay = %profile.overlay, modules = selection.len()))]
    async fn run(
        &self,
        profile: &BoardProfile,
        selection: &ModuleSelection,
        env: &BTreeMap<String, String>,
    ) -> Result<Execution, ExecutionError> {
        let start = Instant::now();
        std::fs::create_dir_all(&self.results_dir).map_err(|e| ExecutionError::Provision {
            path: self.results_dir.clone(),
            reason: e.to_string(),
        })?;

        self.provision().await?;
        self.install_runner().await?;
        let warnings = self.install_projects().await;

        let binary = bin_dir(&self.venv_dir).join(&self.runner.binary);
        let args = self.runner_args(profile, selection);
        let command_line = display_command(&binary, &args);
        info!(command = %command_line, "starting test runner");

        let log_file = self.results_dir.join(RUNNER_LOG);
        let log = File::create(&log_file)?;
        let mut cmd = process::command(&binary, &args, &self.root);
        cmd.stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .env("VIRTUAL_ENV", &self.venv_dir)
            .envs(&self.runner.env)
            .envs(env);
        if let Some(path) = std::env::var_os("PATH") {
            let mut paths = vec![bin_dir(&self.venv_dir)];
            paths.extend(std::env::split_paths(&path));
            if let Ok(joined) = std::env::join_paths(paths) {
                cmd.env("PATH", joined);
            }
        }

        let mut child = cmd.spawn().map_err(|e| ExecutionError::Spawn {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;
        let timeout = self.runner.timeout_secs.map(Duration::from_secs);
        let status = process::wait(&mut child, timeout).await?;

        // A non-zero exit usually means failed tests; the result file decides
        let result_file = self.result_file();
        let records = load_records(&result_file)?;
        info!(
            exit_code = ?status.code(),
            records = records.len(),
            warnings = warnings.len(),
            duration_ms = start.elapsed().as_millis(),
            "test runner finished"
        );

        Ok(Execution {
            result_file,
            log_file: Some(log_file),
            exit_code: status.code(),
            warnings,
        })
    }
}
