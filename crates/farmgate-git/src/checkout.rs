//! Multi-repository checkout tool adapter
//!
//! Manifest parsing and clone mechanics belong to the external tool. The
//! synchronizer only needs three things from it: initialize a workspace
//! from a manifest, sync every project, and list the projects.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use farmgate_core::error::SyncError;
use farmgate_core::Manifest;

/// A project checked out in the workspace
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Project {
    /// Project name as the manifest declares it
    pub name: String,
    /// Checkout path relative to the workspace root
    pub path: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Black-box multi-repository checkout tool
#[async_trait]
pub trait CheckoutTool: Send + Sync {
    /// Initialize `root` from the manifest, pinned to its branch
    async fn init(&self, root: &Path, manifest: &Manifest) -> Result<(), SyncError>;

    /// Fetch and check out every project, discarding local state
    async fn sync(&self, root: &Path) -> Result<(), SyncError>;

    /// Projects present in the workspace
    async fn projects(&self, root: &Path) -> Result<Vec<Project>, SyncError>;
}

/// Drives the `repo` command line tool
#[derive(Debug, Clone)]
pub struct RepoCli {
    binary: String,
    jobs: Option<usize>,
}

impl Default for RepoCli {
    fn default() -> Self {
        Self::new("repo")
    }
}

impl RepoCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            jobs: None,
        }
    }

    /// Parallel fetch jobs for `repo sync`
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments for `repo init`
    pub fn init_args(manifest: &Manifest) -> Vec<String> {
        vec![
            "init".to_string(),
            "-u".to_string(),
            manifest.url.clone(),
            "-b".to_string(),
            manifest.branch.clone(),
        ]
    }

    /// Arguments for `repo sync`
    pub fn sync_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "sync",
            "-c",
            "-d",
            "--force-sync",
            "--force-remove-dirty",
            "--no-tags",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if let Some(jobs) = self.jobs {
            args.push(format!("-j{}", jobs));
        }
        args
    }

    async fn invoke(&self, root: &Path, args: &[String]) -> Result<String, SyncError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        let start = std::time::Instant::now();
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SyncError::CheckoutTool {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(SyncError::CheckoutTool {
                command,
                reason: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        info!(
            command = %command,
            duration_ms = start.elapsed().as_millis(),
            "checkout tool finished"
        );
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse `repo list` output (`path : name` per line)
pub fn parse_project_list(output: &str) -> Vec<Project> {
    let mut projects: Vec<Project> = output
        .lines()
        .filter_map(|line| {
            let (path, name) = line.split_once(" : ")?;
            let (path, name) = (path.trim(), name.trim());
            if path.is_empty() || name.is_empty() {
                return None;
            }
            Some(Project::new(name, path))
        })
        .collect();
    projects.sort();
    projects
}

#[async_trait]
impl CheckoutTool for RepoCli {
    #[instrument(skip(self, manifest), fields(root = %root.display(), branch = %manifest.branch))]
    async fn init(&self, root: &Path, manifest: &Manifest) -> Result<(), SyncError> {
        self.invoke(root, &Self::init_args(manifest)).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(root = %root.display()))]
    async fn sync(&self, root: &Path) -> Result<(), SyncError> {
        self.invoke(root, &self.sync_args()).await?;
        Ok(())
    }

    async fn projects(&self, root: &Path) -> Result<Vec<Project>, SyncError> {
        let output = self.invoke(root, &["list".to_string()]).await?;
        let projects = parse_project_list(&output);
        debug!(count = projects.len(), "listed projects");
        Ok(projects)
    }
}
