//! Git-backed change detection

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use farmgate_core::config::SelectionConfig;
use farmgate_core::error::{DetectError, GitError};
use farmgate_core::pipeline::ChangeDetection;
use farmgate_core::{DiffSummary, ModuleSelection, RepoSnapshot, SelectionReason};
use farmgate_git::{shortstat, GitRepo};

use crate::module_selection::{ModuleMap, ModuleSelector};
use crate::overlay::{is_hidden, resolve_overlay};

/// How deep below the workspace root repositories are looked for
const REPO_SEARCH_DEPTH: usize = 6;

fn canonical(path: &Path) -> Result<PathBuf, DetectError> {
    path.canonicalize().map_err(|e| {
        DetectError::ModuleSelection(format!("cannot resolve {}: {}", path.display(), e))
    })
}

/// Working trees of the repositories under `root`, sorted
fn workspace_repos(root: &Path) -> Vec<PathBuf> {
    let mut repos: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(REPO_SEARCH_DEPTH)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.path().join(".git").exists())
        .map(|e| e.into_path())
        .collect();
    repos.sort();
    repos
}

/// [`ChangeDetection`] over real checkouts: `git diff --shortstat` for the
/// effective-change gate, git2 tree diffs plus the import graph for selection
pub struct GitChangeDetector {
    selector: ModuleSelector,
    search_depth: usize,
}

impl GitChangeDetector {
    pub fn new(config: &SelectionConfig) -> Result<Self, DetectError> {
        Ok(Self {
            selector: ModuleSelector::new(config)?,
            search_depth: config.search_depth,
        })
    }

    /// Changed files across the workspace: overlay files relative to the
    /// overlay, everything else absolute. Returns the repository roots too.
    ///
    /// The overlay's own repository must resolve both refs. Other
    /// repositories that do not know `base_ref` are skipped.
    fn workspace_changes(
        &self,
        workspace_root: &Path,
        overlay: &Path,
        base_ref: &str,
        head_ref: &str,
    ) -> Result<(BTreeSet<PathBuf>, Vec<PathBuf>), DetectError> {
        let overlay_repo = canonical(GitRepo::discover(overlay)?.path())?;
        let mut roots = vec![overlay_repo.clone()];
        for repo in workspace_repos(workspace_root) {
            if !roots.contains(&repo) {
                roots.push(repo);
            }
        }

        let mut changed = BTreeSet::new();
        for root in &roots {
            let files = match GitRepo::open(root)?.changed_files(base_ref, head_ref) {
                Ok(files) => files,
                Err(GitError::UnknownRef { reference, .. }) if *root != overlay_repo => {
                    warn!(repo = %root.display(), reference = %reference, "reference unknown, repository skipped");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            debug!(repo = %root.display(), files = files.len(), "repository changes");
            for file in files {
                let path = root.join(file);
                let relative = path.strip_prefix(overlay).map(Path::to_path_buf);
                changed.insert(relative.unwrap_or(path));
            }
        }
        Ok((changed, roots))
    }
}

#[async_trait]
impl ChangeDetection for GitChangeDetector {
    #[instrument(skip_all, fields(base_ref = %base_ref, repos = snapshot.len()))]
    async fn has_effective_change(
        &self,
        snapshot: &RepoSnapshot,
        base_ref: &str,
    ) -> Result<DiffSummary, DetectError> {
        let mut stats = Vec::with_capacity(snapshot.len());
        for (name, repo) in &snapshot.repos {
            let path = snapshot.root.join(&repo.path);
            let stat = shortstat(&path, base_ref, &repo.commit)
                .await
                .map_err(|source| DetectError::DiffStat {
                    repo: name.clone(),
                    source,
                })?;
            debug!(repo = %name, files = stat.files_changed, "diff statistic");
            stats.push((name.clone(), stat));
        }

        let summary = DiffSummary::from_stats(stats);
        info!(files = summary.file_count, "effective change computed");
        Ok(summary)
    }

    #[instrument(skip(self), fields(root = %workspace_root.display()))]
    async fn select_modules(
        &self,
        base_ref: &str,
        head_ref: &str,
        overlay: &str,
        workspace_root: &Path,
    ) -> Result<ModuleSelection, DetectError> {
        let overlay_dir = canonical(&resolve_overlay(workspace_root, overlay, self.search_depth)?)?;
        let root = canonical(workspace_root)?;
        let (changed, roots) = self.workspace_changes(&root, &overlay_dir, base_ref, head_ref)?;
        info!(repos = roots.len(), changed_files = changed.len(), "workspace changes collected");
        let map = ModuleMap::build_with_roots(&overlay_dir, &roots)?;

        let mut selection = self.selector.select(&map, overlay, &changed);
        // Dependencies outside the overlay are reported relative to the workspace
        for module in &mut selection.modules {
            if let SelectionReason::DependencyChanged(path) = &mut module.reason {
                if let Ok(relative) = path.strip_prefix(&root) {
                    *path = relative.to_path_buf();
                }
            }
        }
        Ok(selection)
    }
}
