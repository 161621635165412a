//! WorkspaceSynchronizer against local upstream repositories

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use git2::{Commit, Oid, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;

use farmgate_core::error::SyncError;
use farmgate_core::pipeline::WorkspaceSync;
use farmgate_core::{Manifest, PendingPatch};
use farmgate_git::{shortstat, CheckoutTool, Project, WorkspaceSynchronizer};

/// Checkout tool that clones each upstream with git2
struct LocalClone {
    upstreams: Vec<(Project, PathBuf)>,
}

#[async_trait]
impl CheckoutTool for LocalClone {
    async fn init(&self, root: &Path, _manifest: &Manifest) -> Result<(), SyncError> {
        std::fs::create_dir_all(root.join(".repo"))
            .map_err(|e| SyncError::failure(root, e.to_string()))
    }

    async fn sync(&self, root: &Path) -> Result<(), SyncError> {
        for (project, upstream) in &self.upstreams {
            let dest = root.join(&project.path);
            std::fs::create_dir_all(&dest).map_err(|e| SyncError::failure(root, e.to_string()))?;
            Repository::clone(upstream.to_str().unwrap(), &dest)
                .map_err(|e| SyncError::failure(root, e.to_string()))?;
        }
        Ok(())
    }

    async fn projects(&self, _root: &Path) -> Result<Vec<Project>, SyncError> {
        Ok(self.upstreams.iter().map(|(p, _)| p.clone()).collect())
    }
}

fn commit_on(repo: &Repository, update_ref: &str, parent: Option<Oid>, files: &[(&str, &str)]) -> Oid {
    let sig = Signature::now("Test", "test@example.com").unwrap();
    let parent_commit = parent.map(|p| repo.find_commit(p).unwrap());
    let base_tree = parent_commit.as_ref().map(|c| c.tree().unwrap());
    let mut builder = repo.treebuilder(base_tree.as_ref()).unwrap();
    for (name, content) in files {
        let blob = repo.blob(content.as_bytes()).unwrap();
        builder.insert(*name, blob, 0o100644).unwrap();
    }
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let parents: Vec<&Commit> = parent_commit.iter().collect();
    repo.commit(Some(update_ref), &sig, &sig, "commit", &tree, &parents)
        .unwrap()
}

struct Fixture {
    temp: TempDir,
    boardfarm_tip: Oid,
    overlay_tip: Oid,
}

impl Fixture {
    /// Two upstreams; boardfarm carries a clean change and a conflicting one
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.bare(true).initial_head("master");

        let bf = Repository::init_opts(temp.path().join("up/boardfarm.git"), &opts).unwrap();
        let base = commit_on(&bf, "refs/heads/master", None, &[("a.py", "A = 1\n")]);
        let boardfarm_tip = commit_on(&bf, "refs/heads/master", Some(base), &[("b.py", "B = 1\n")]);
        commit_on(&bf, "refs/changes/34/1234/2", Some(base), &[("c.py", "C = 1\n")]);
        commit_on(&bf, "refs/changes/35/1235/1", Some(base), &[("b.py", "B = 2\n")]);

        let lab = Repository::init_opts(temp.path().join("up/lab-a.git"), &opts).unwrap();
        let overlay_tip = commit_on(&lab, "refs/heads/master", None, &[("conftest.py", "\n")]);

        Self {
            temp,
            boardfarm_tip,
            overlay_tip,
        }
    }

    fn workspace(&self) -> PathBuf {
        self.temp.path().join("ws")
    }

    fn synchronizer(&self) -> WorkspaceSynchronizer {
        let tool = LocalClone {
            upstreams: vec![
                (
                    Project::new("rdk/boardfarm", "boardfarm"),
                    self.temp.path().join("up/boardfarm.git"),
                ),
                (
                    Project::new("rdk/lab-a", "overlays/lab-a"),
                    self.temp.path().join("up/lab-a.git"),
                ),
            ],
        };
        WorkspaceSynchronizer::new(self.workspace(), Arc::new(tool))
    }
}

fn manifest() -> Manifest {
    Manifest::new("https://gerrit.example.com/manifest", "master")
}

#[tokio::test]
async fn test_sync_without_patch_pins_branch_tips() {
    let fixture = Fixture::new();
    let snapshot = fixture.synchronizer().sync(&manifest(), None).await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        snapshot.commit("rdk/boardfarm"),
        Some(fixture.boardfarm_tip.to_string().as_str())
    );
    assert_eq!(
        snapshot.commit("rdk/lab-a"),
        Some(fixture.overlay_tip.to_string().as_str())
    );
    assert!(snapshot.patched.is_none());
}

#[tokio::test]
async fn test_sync_applies_patch_on_branch_tip() {
    let fixture = Fixture::new();
    let patch = PendingPatch::new("rdk/boardfarm", "refs/changes/34/1234/2", "master");
    let snapshot = fixture
        .synchronizer()
        .sync(&manifest(), Some(&patch))
        .await
        .unwrap();

    assert_eq!(snapshot.patched.as_deref(), Some("rdk/boardfarm"));
    let head = snapshot.commit("rdk/boardfarm").unwrap().to_string();
    assert_ne!(head, fixture.boardfarm_tip.to_string());
    assert_eq!(
        snapshot.commit("rdk/lab-a"),
        Some(fixture.overlay_tip.to_string().as_str())
    );

    let repo = Repository::open(fixture.workspace().join("boardfarm")).unwrap();
    let commit = repo.find_commit(Oid::from_str(&head).unwrap()).unwrap();
    assert_eq!(commit.parent_id(0).unwrap(), fixture.boardfarm_tip);
    assert!(fixture.workspace().join("boardfarm/c.py").exists());
    assert!(fixture.workspace().join("boardfarm/b.py").exists());
}

#[tokio::test]
async fn test_conflicting_patch_is_patch_conflict() {
    let fixture = Fixture::new();
    let patch = PendingPatch::new("rdk/boardfarm", "refs/changes/35/1235/1", "master");
    let err = fixture
        .synchronizer()
        .sync(&manifest(), Some(&patch))
        .await
        .unwrap_err();

    assert!(err.is_patch_conflict(), "unexpected error: {err}");
    assert!(err.to_string().contains("b.py"));
}

#[tokio::test]
async fn test_unknown_project() {
    let fixture = Fixture::new();
    let patch = PendingPatch::new("rdk/nope", "refs/changes/34/1234/2", "master");
    let err = fixture
        .synchronizer()
        .sync(&manifest(), Some(&patch))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::UnknownProject(_)));
}

#[tokio::test]
async fn test_resync_over_failed_workspace_is_identical() {
    let fixture = Fixture::new();
    let sync = fixture.synchronizer();
    let patch = PendingPatch::new("rdk/boardfarm", "refs/changes/34/1234/2", "master");

    // Leave a half-built workspace behind, as a crashed run would
    std::fs::create_dir_all(fixture.workspace().join("boardfarm")).unwrap();
    std::fs::write(fixture.workspace().join("boardfarm/stale.txt"), "x").unwrap();
    std::fs::create_dir_all(fixture.workspace().join("results")).unwrap();

    let first = sync.sync(&manifest(), None).await.unwrap();
    let second = sync.sync(&manifest(), None).await.unwrap();
    assert_eq!(first, second);
    assert!(!fixture.workspace().join("boardfarm/stale.txt").exists());
    assert!(!fixture.workspace().join("results").exists());

    // A patched run leaves no trace in the next unpatched one
    sync.sync(&manifest(), Some(&patch)).await.unwrap();
    let third = sync.sync(&manifest(), None).await.unwrap();
    assert_eq!(first, third);
}

#[tokio::test]
async fn test_shortstat_of_patched_snapshot() {
    if which::which("git").is_err() {
        return;
    }
    let fixture = Fixture::new();
    let patch = PendingPatch::new("rdk/boardfarm", "refs/changes/34/1234/2", "master");
    let snapshot = fixture
        .synchronizer()
        .sync(&manifest(), Some(&patch))
        .await
        .unwrap();

    let repo_path = snapshot.repo_path("rdk/boardfarm").unwrap();
    let head = snapshot.commit("rdk/boardfarm").unwrap();
    let stat = shortstat(&repo_path, "origin/master", head).await.unwrap();
    assert_eq!(stat.files_changed, 1);
    assert_eq!(stat.insertions, 1);

    let overlay_path = snapshot.repo_path("rdk/lab-a").unwrap();
    let overlay_head = snapshot.commit("rdk/lab-a").unwrap();
    let stat = shortstat(&overlay_path, "origin/master", overlay_head)
        .await
        .unwrap();
    assert!(stat.is_empty());
}
