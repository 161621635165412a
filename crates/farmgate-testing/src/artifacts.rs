//! Run artifact archival and workspace teardown

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use farmgate_core::config::WorkspaceConfig;
use farmgate_core::error::ArtifactError;
use farmgate_core::pipeline::ArtifactFinalizer;
use farmgate_core::FinalizeReport;

/// Name of the manifest written into every archive
pub const MANIFEST_FILE: &str = "manifest.json";

/// One archived file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedFile {
    /// Path relative to the run's archive directory
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// SHA256 hash (hex encoded)
    pub sha256: String,
}

/// Contents of `manifest.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub run_id: String,
    pub archived_at: DateTime<Utc>,
    pub files: Vec<ArchivedFile>,
}

impl ArchiveManifest {
    /// Read a manifest back from an archive directory
    pub fn load(archive_dir: &Path) -> Result<Self, ArtifactError> {
        let path = archive_dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| archive_failure(&path, e))?;
        serde_json::from_str(&content).map_err(|e| archive_failure(&path, e))
    }
}

fn archive_failure(path: &Path, reason: impl ToString) -> ArtifactError {
    ArtifactError::ArchiveFailure {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Directory-safe form of a run identifier
fn archive_key(run_id: &str) -> String {
    let key: String = run_id
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '-' } else { c })
        .collect();
    match key.trim_matches('.') {
        "" => "run".to_string(),
        _ => key,
    }
}

/// [`ArtifactFinalizer`] that copies results into `<archive_dir>/<run_id>/`
/// and then deletes the results directory and the workspace root.
///
/// The archive directory is durable and must live outside the workspace.
pub struct ArtifactManager {
    archive_root: PathBuf,
    results_dir: PathBuf,
    workspace_root: PathBuf,
}

impl ArtifactManager {
    pub fn new(workspace: &WorkspaceConfig) -> Self {
        Self {
            archive_root: workspace.archive_dir.clone(),
            results_dir: workspace.results_path(),
            workspace_root: workspace.root.clone(),
        }
    }

    /// Archive directory of a run
    pub fn archive_dir(&self, run_id: &str) -> PathBuf {
        self.archive_root.join(archive_key(run_id))
    }

    /// Files to archive, keyed by their name inside the archive
    fn collect(&self, result_file: Option<&Path>) -> BTreeMap<String, PathBuf> {
        let mut files = BTreeMap::new();

        if self.results_dir.is_dir() {
            for entry in WalkDir::new(&self.results_dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if let Ok(relative) = entry.path().strip_prefix(&self.results_dir) {
                    let name = relative.to_string_lossy().replace('\\', "/");
                    files.insert(name, entry.into_path());
                }
            }
        }

        // A result file outside the results directory is still archived
        if let Some(path) = result_file.filter(|p| p.is_file()) {
            if !path.starts_with(&self.results_dir) {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "result".to_string());
                files.entry(name).or_insert_with(|| path.to_path_buf());
            }
        }
        files
    }

    fn archive(&self, run_id: &str, files: &BTreeMap<String, PathBuf>) -> Result<PathBuf, ArtifactError> {
        let target = self.archive_dir(run_id);
        std::fs::create_dir_all(&target).map_err(|e| archive_failure(&target, e))?;

        let mut archived = Vec::with_capacity(files.len());
        for (name, source) in files {
            let content = std::fs::read(source).map_err(|e| archive_failure(source, e))?;
            let dest = target.join(name);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| archive_failure(parent, e))?;
            }
            std::fs::write(&dest, &content).map_err(|e| archive_failure(&dest, e))?;
            archived.push(ArchivedFile {
                name: name.clone(),
                size: content.len() as u64,
                sha256: format!("{:x}", Sha256::digest(&content)),
            });
        }

        let manifest = ArchiveManifest {
            run_id: run_id.to_string(),
            archived_at: Utc::now(),
            files: archived,
        };
        let manifest_path = target.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| archive_failure(&manifest_path, e))?;
        std::fs::write(&manifest_path, json).map_err(|e| archive_failure(&manifest_path, e))?;
        Ok(target)
    }

    fn remove(path: &Path) -> Result<(), ArtifactError> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(path).map_err(|e| ArtifactError::CleanupFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ArtifactFinalizer for ArtifactManager {
    #[instrument(skip_all, fields(run_id = %run_id))]
    async fn finalize(&self, run_id: &str, result_file: Option<&Path>) -> FinalizeReport {
        let mut report = FinalizeReport::default();

        let files = self.collect(result_file);
        if files.is_empty() {
            info!("nothing to archive");
        } else {
            match self.archive(run_id, &files) {
                Ok(dir) => {
                    info!(path = %dir.display(), files = files.len(), "artifacts archived");
                    report.archive_dir = Some(dir);
                    report.archived = files.into_keys().collect();
                }
                Err(e) => {
                    warn!(error = %e, "archiving failed, cleaning up anyway");
                    report.archive_error = Some(e.to_string());
                }
            }
        }

        for path in [&self.results_dir, &self.workspace_root] {
            if let Err(e) = Self::remove(path) {
                warn!(error = %e, "cleanup failed");
                report.cleanup_errors.push(e.to_string());
            }
        }
        if report.cleanup_errors.is_empty() {
            info!(root = %self.workspace_root.display(), "workspace released");
        }
        report
    }
}
