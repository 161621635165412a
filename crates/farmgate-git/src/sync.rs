//! Reproducible multi-repository workspace synchronization

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use farmgate_core::error::{GitError, SyncError};
use farmgate_core::pipeline::WorkspaceSync;
use farmgate_core::{Manifest, PendingPatch, RepoSnapshot};

use crate::checkout::{CheckoutTool, Project};
use crate::repository::GitRepo;

/// Builds a [`RepoSnapshot`] for a branch plus at most one pending patch.
///
/// The workspace root is owned exclusively by the run. Any previous content
/// is removed before syncing so stale state from a failed run never leaks
/// into the snapshot.
pub struct WorkspaceSynchronizer {
    root: PathBuf,
    checkout: Arc<dyn CheckoutTool>,
}

impl WorkspaceSynchronizer {
    pub fn new(root: impl Into<PathBuf>, checkout: Arc<dyn CheckoutTool>) -> Self {
        Self {
            root: root.into(),
            checkout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn reset_workspace(&self) -> Result<(), SyncError> {
        if self.root.exists() {
            warn!(root = %self.root.display(), "removing stale workspace");
            std::fs::remove_dir_all(&self.root)
                .map_err(|e| SyncError::failure(&self.root, e.to_string()))?;
        }
        std::fs::create_dir_all(&self.root)
            .map_err(|e| SyncError::failure(&self.root, e.to_string()))
    }

    fn apply_patch(
        &self,
        manifest: &Manifest,
        patch: &PendingPatch,
        project: &Project,
    ) -> Result<String, SyncError> {
        let repo = GitRepo::open(&self.root.join(&project.path))?;
        let change = repo
            .fetch_change(&manifest.remote, &patch.change_ref)
            .map_err(|e| SyncError::failure(&project.path, e.to_string()))?;
        repo.checkout_detached(change)?;

        let upstream = format!("{}/{}", manifest.remote, patch.target_branch);
        match repo.rebase_onto(&upstream) {
            Ok(head) => Ok(head.to_string()),
            Err(e @ GitError::RebaseConflict { .. }) => Err(SyncError::PatchConflict {
                project: patch.project.clone(),
                change_ref: patch.change_ref.clone(),
                reason: e.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve every project, apply the patch, and collect the snapshot.
    ///
    /// Runs between awaits so no git2 handle is held across a suspension point.
    fn resolve(
        &self,
        manifest: &Manifest,
        patch: Option<&PendingPatch>,
        projects: &[Project],
    ) -> Result<RepoSnapshot, SyncError> {
        let mut snapshot = RepoSnapshot::new(&self.root);

        for project in projects {
            let repo = GitRepo::open(&self.root.join(&project.path))?;
            repo.discard_local_changes()?;
        }

        if let Some(patch) = patch {
            let project = projects
                .iter()
                .find(|p| p.name == patch.project || p.path == Path::new(&patch.project))
                .ok_or_else(|| SyncError::UnknownProject(patch.project.clone()))?;
            let head = self.apply_patch(manifest, patch, project)?;
            info!(project = %project.name, head = %head, "pending patch applied");
            snapshot.patched = Some(project.name.clone());
        }

        for project in projects {
            let repo = GitRepo::open(&self.root.join(&project.path))?;
            snapshot.insert(&project.name, &project.path, repo.head_id()?);
        }

        Ok(snapshot)
    }
}

#[async_trait]
impl WorkspaceSync for WorkspaceSynchronizer {
    #[instrument(skip_all, fields(root = %self.root.display(), branch = %manifest.branch))]
    async fn sync(
        &self,
        manifest: &Manifest,
        patch: Option<&PendingPatch>,
    ) -> Result<RepoSnapshot, SyncError> {
        let start = std::time::Instant::now();
        self.reset_workspace()?;

        self.checkout.init(&self.root, manifest).await?;
        self.checkout.sync(&self.root).await?;
        let projects = self.checkout.projects(&self.root).await?;
        if projects.is_empty() {
            return Err(SyncError::failure(&self.root, "manifest resolved to no projects"));
        }

        let snapshot = self.resolve(manifest, patch, &projects)?;
        info!(
            repos = snapshot.len(),
            patched = ?snapshot.patched,
            duration_ms = start.elapsed().as_millis(),
            "workspace synchronized"
        );
        Ok(snapshot)
    }
}
