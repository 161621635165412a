//! GitChangeDetector against real repositories

use std::path::{Path, PathBuf};

use git2::{Repository, Signature};
use tempfile::TempDir;

use farmgate_core::config::SelectionConfig;
use farmgate_core::error::DetectError;
use farmgate_core::pipeline::ChangeDetection;
use farmgate_core::{RepoSnapshot, SelectionReason};
use farmgate_tasks::GitChangeDetector;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn commit_all(repo: &Repository, message: &str) -> git2::Oid {
    let sig = Signature::now("Test", "test@example.com").unwrap();
    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .unwrap();
    index.update_all(["*"].iter(), None).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => Vec::new(),
    };
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
}

/// Workspace `ws/` holding one repository `lab` with the overlay nested at
/// `overlays/lab-a`
struct Workspace {
    temp: TempDir,
    repo: Repository,
    base: git2::Oid,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let lab = temp.path().join("ws/lab");
        std::fs::create_dir_all(&lab).unwrap();
        let repo = Repository::init(&lab).unwrap();

        let overlay = lab.join("overlays/lab-a");
        write(&overlay, "lib/__init__.py", "");
        write(&overlay, "lib/radio.py", "FREQ = 5\n");
        write(&overlay, "lib/wifi.py", "from .radio import FREQ\n");
        write(&overlay, "tests/test_wifi.py", "from lib.wifi import FREQ\n");
        write(&overlay, "tests/test_dhcp.py", "import pytest\n");
        write(&lab, "README.md", "lab\n");
        let base = commit_all(&repo, "base");

        Self { temp, repo, base }
    }

    fn root(&self) -> PathBuf {
        self.temp.path().join("ws")
    }

    fn overlay(&self) -> PathBuf {
        self.root().join("lab/overlays/lab-a")
    }

    fn detector() -> GitChangeDetector {
        GitChangeDetector::new(&SelectionConfig::default()).unwrap()
    }
}

#[tokio::test]
async fn test_shared_dependency_change_selects_importers() {
    let ws = Workspace::new();
    write(&ws.overlay(), "lib/radio.py", "FREQ = 6\n");
    commit_all(&ws.repo, "retune");

    let selection = Workspace::detector()
        .select_modules(&ws.base.to_string(), "HEAD", "lab-a", &ws.root())
        .await
        .unwrap();

    assert_eq!(selection.overlay, "lab-a");
    assert_eq!(selection.ids(), vec!["tests.test_wifi"]);
    assert_eq!(
        selection.modules[0].reason,
        SelectionReason::DependencyChanged(PathBuf::from("lib/radio.py"))
    );
}

#[tokio::test]
async fn test_change_outside_overlay_selects_nothing() {
    let ws = Workspace::new();
    write(&ws.root().join("lab"), "README.md", "lab v2\n");
    commit_all(&ws.repo, "docs");

    let selection = Workspace::detector()
        .select_modules(&ws.base.to_string(), "HEAD", "lab-a", &ws.root())
        .await
        .unwrap();
    assert!(selection.is_empty());
}

#[tokio::test]
async fn test_selection_is_stable_across_invocations() {
    let ws = Workspace::new();
    write(&ws.overlay(), "lib/radio.py", "FREQ = 6\n");
    write(&ws.overlay(), "tests/test_dhcp.py", "import pytest\nimport os\n");
    commit_all(&ws.repo, "two changes");

    let detector = Workspace::detector();
    let base = ws.base.to_string();
    let first = detector
        .select_modules(&base, "HEAD", "lab-a", &ws.root())
        .await
        .unwrap();
    for _ in 0..3 {
        let again = detector
            .select_modules(&base, "HEAD", "lab-a", &ws.root())
            .await
            .unwrap();
        assert_eq!(first, again);
    }
    assert_eq!(first.ids(), vec!["tests.test_dhcp", "tests.test_wifi"]);
}

#[tokio::test]
async fn test_missing_overlay_fails_loud() {
    let ws = Workspace::new();
    let err = Workspace::detector()
        .select_modules(&ws.base.to_string(), "HEAD", "lab-z", &ws.root())
        .await
        .unwrap_err();
    assert!(matches!(err, DetectError::OverlayNotFound { .. }));
}

#[tokio::test]
async fn test_broken_import_fails_loud() {
    let ws = Workspace::new();
    write(&ws.overlay(), "tests/test_broken.py", "from .gone import x\n");
    commit_all(&ws.repo, "broken");

    let err = Workspace::detector()
        .select_modules(&ws.base.to_string(), "HEAD", "lab-a", &ws.root())
        .await
        .unwrap_err();
    assert!(matches!(err, DetectError::ModuleSelection(_)));
}

/// Library repository `boardfarm` and overlay repository `lab-a`, both with a
/// `base` branch at their first commit, plus a `docs` repository without one
fn two_repo_workspace() -> (TempDir, Repository) {
    let temp = TempDir::new().unwrap();
    let ws = temp.path().join("ws");

    let init = |name: &str| {
        std::fs::create_dir_all(ws.join(name)).unwrap();
        Repository::init(ws.join(name)).unwrap()
    };

    let boardfarm = init("boardfarm");
    write(&ws.join("boardfarm"), "boardfarm/__init__.py", "");
    write(&ws.join("boardfarm"), "boardfarm/dhcp.py", "LEASE = 60\n");
    write(&ws.join("boardfarm"), "setup.py", "");
    let base = commit_all(&boardfarm, "base");
    boardfarm
        .branch("base", &boardfarm.find_commit(base).unwrap(), false)
        .unwrap();

    let lab = init("lab-a");
    write(&ws.join("lab-a"), "tests/test_dhcp.py", "from boardfarm.dhcp import LEASE\n");
    write(&ws.join("lab-a"), "tests/test_boot.py", "import os\n");
    let base = commit_all(&lab, "base");
    lab.branch("base", &lab.find_commit(base).unwrap(), false)
        .unwrap();

    let docs = init("docs");
    write(&ws.join("docs"), "conf.py", "import boardfarm.dhcp\n");
    commit_all(&docs, "docs");

    (temp, boardfarm)
}

#[tokio::test]
async fn test_library_change_in_other_repository_selects_importers() {
    let (temp, boardfarm) = two_repo_workspace();
    let ws = temp.path().join("ws");
    write(&ws.join("boardfarm"), "boardfarm/dhcp.py", "LEASE = 120\n");
    commit_all(&boardfarm, "longer lease");

    let selection = Workspace::detector()
        .select_modules("base", "HEAD", "lab-a", &ws)
        .await
        .unwrap();

    assert_eq!(selection.ids(), vec!["tests.test_dhcp"]);
    assert_eq!(
        selection.modules[0].reason,
        SelectionReason::DependencyChanged(PathBuf::from("boardfarm/boardfarm/dhcp.py"))
    );
}

#[tokio::test]
async fn test_unrelated_library_change_selects_nothing() {
    let (temp, boardfarm) = two_repo_workspace();
    let ws = temp.path().join("ws");
    write(&ws.join("boardfarm"), "boardfarm/tftp.py", "PORT = 69\n");
    commit_all(&boardfarm, "tftp");

    let selection = Workspace::detector()
        .select_modules("base", "HEAD", "lab-a", &ws)
        .await
        .unwrap();
    assert!(selection.is_empty());
}

#[tokio::test]
async fn test_overlay_repository_must_know_base_ref() {
    let (temp, _boardfarm) = two_repo_workspace();
    let err = Workspace::detector()
        .select_modules("origin/nope", "HEAD", "lab-a", &temp.path().join("ws"))
        .await
        .unwrap_err();
    assert!(matches!(err, DetectError::Git(_)));
}

#[tokio::test]
async fn test_effective_change_counts_files() {
    if which::which("git").is_err() {
        return;
    }
    let ws = Workspace::new();
    let base = ws.base.to_string();

    let mut snapshot = RepoSnapshot::new(ws.root());
    snapshot.insert("rdk/lab", "lab", base.clone());
    let summary = Workspace::detector()
        .has_effective_change(&snapshot, &base)
        .await
        .unwrap();
    assert!(summary.is_empty());

    write(&ws.overlay(), "lib/radio.py", "FREQ = 6\nBAND = 2\n");
    let head = commit_all(&ws.repo, "retune");
    let mut snapshot = RepoSnapshot::new(ws.root());
    snapshot.insert("rdk/lab", "lab", head.to_string());
    let summary = Workspace::detector()
        .has_effective_change(&snapshot, &base)
        .await
        .unwrap();
    assert_eq!(summary.file_count, 1);
    assert_eq!(summary.per_repo["rdk/lab"].insertions, 2);
}

#[tokio::test]
async fn test_unknown_base_ref_is_diff_stat_error() {
    if which::which("git").is_err() {
        return;
    }
    let ws = Workspace::new();
    let mut snapshot = RepoSnapshot::new(ws.root());
    snapshot.insert("rdk/lab", "lab", ws.base.to_string());
    let err = Workspace::detector()
        .has_effective_change(&snapshot, "origin/nope")
        .await
        .unwrap_err();
    assert!(matches!(err, DetectError::DiffStat { ref repo, .. } if repo == "rdk/lab"));
}
