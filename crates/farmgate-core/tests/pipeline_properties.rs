//! Pipeline behaviour driven through in-memory stage implementations

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use farmgate_core::error::{DetectError, ExecutionError, GitError, ResultFileError, SyncError};
use farmgate_core::pipeline::{
    ArtifactFinalizer, ChangeDetection, CollectingReporter, ResultReporting, TestExecution,
    WorkspaceSync,
};
use farmgate_core::{
    BoardProfile, DiffSummary, EnvironmentWarning, Execution, FailureReason, FinalizeReport,
    Grade, GradeCounts, Manifest, ModuleSelection, NodeRequirement, Outcome, PendingPatch,
    Pipeline, PipelineStages, RepoSnapshot, ResultRecord, RunReport, RunRequest,
    SelectedModule, SelectionReason, ShortStat, Stage,
};

#[derive(Clone, Copy, PartialEq)]
enum Inject {
    Nothing,
    SyncFailure,
    PatchConflict,
    DiffFailure,
    EmptyDiff,
    SelectionFailure,
    UnknownBaseInOverlay,
    ExecutionFailure,
    ResultMissing,
    ReportCorrupt,
    HangIn(Stage),
}

struct Fakes {
    workspace: PathBuf,
    inject: Inject,
    executed: AtomicUsize,
    finalized: AtomicUsize,
    finalized_with: Mutex<Vec<Option<PathBuf>>>,
}

impl Fakes {
    fn new(workspace: PathBuf, inject: Inject) -> Arc<Self> {
        Arc::new(Self {
            workspace,
            inject,
            executed: AtomicUsize::new(0),
            finalized: AtomicUsize::new(0),
            finalized_with: Mutex::new(Vec::new()),
        })
    }

    async fn maybe_hang(&self, stage: Stage) {
        if self.inject == Inject::HangIn(stage) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

#[async_trait]
impl WorkspaceSync for Fakes {
    async fn sync(
        &self,
        _manifest: &Manifest,
        patch: Option<&PendingPatch>,
    ) -> Result<RepoSnapshot, SyncError> {
        std::fs::create_dir_all(self.workspace.join("results"))
            .map_err(|e| SyncError::failure(&self.workspace, e.to_string()))?;
        self.maybe_hang(Stage::Sync).await;
        match self.inject {
            Inject::SyncFailure => Err(SyncError::failure(&self.workspace, "repo init failed")),
            Inject::PatchConflict => Err(SyncError::PatchConflict {
                project: "boardfarm".to_string(),
                change_ref: "refs/changes/34/1234/2".to_string(),
                reason: "conflict in boardfarm/lib/a.py".to_string(),
            }),
            _ => {
                let mut snapshot = RepoSnapshot::new(&self.workspace);
                snapshot.insert("boardfarm", "boardfarm", "1111111");
                snapshot.patched = patch.map(|p| p.project.clone());
                Ok(snapshot)
            }
        }
    }
}

#[async_trait]
impl ChangeDetection for Fakes {
    async fn has_effective_change(
        &self,
        _snapshot: &RepoSnapshot,
        _base_ref: &str,
    ) -> Result<DiffSummary, DetectError> {
        self.maybe_hang(Stage::Detect).await;
        match self.inject {
            Inject::DiffFailure => Err(DetectError::Git(GitError::UnknownRef {
                repo: "boardfarm".to_string(),
                reference: "origin/master".to_string(),
            })),
            Inject::EmptyDiff => Ok(DiffSummary::from_stats(vec![(
                "boardfarm",
                ShortStat::default(),
            )])),
            _ => Ok(DiffSummary::from_stats(vec![(
                "boardfarm",
                ShortStat {
                    files_changed: 1,
                    insertions: 3,
                    deletions: 0,
                },
            )])),
        }
    }

    async fn select_modules(
        &self,
        _base_ref: &str,
        _head_ref: &str,
        overlay: &str,
        _workspace_root: &Path,
    ) -> Result<ModuleSelection, DetectError> {
        self.maybe_hang(Stage::Select).await;
        if self.inject == Inject::SelectionFailure {
            return Err(DetectError::AmbiguousOverlay {
                overlay: overlay.to_string(),
                candidates: vec![PathBuf::from("a/lab"), PathBuf::from("b/lab")],
            });
        }
        if self.inject == Inject::UnknownBaseInOverlay {
            return Err(DetectError::Git(GitError::UnknownRef {
                repo: overlay.to_string(),
                reference: "origin/master".to_string(),
            }));
        }
        Ok(ModuleSelection {
            overlay: overlay.to_string(),
            modules: vec![SelectedModule {
                id: "tests.wifi.scan".to_string(),
                path: PathBuf::from("tests/wifi/scan.py"),
                reason: SelectionReason::DirectChange(PathBuf::from("tests/wifi/scan.py")),
            }],
        })
    }
}

#[async_trait]
impl TestExecution for Fakes {
    async fn run(
        &self,
        _profile: &BoardProfile,
        _selection: &ModuleSelection,
        _env: &BTreeMap<String, String>,
    ) -> Result<Execution, ExecutionError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        self.maybe_hang(Stage::Execute).await;
        let result_file = self.workspace.join("results").join("test_results.json");
        match self.inject {
            Inject::ExecutionFailure => Err(ExecutionError::Timeout { seconds: 60 }),
            Inject::ResultMissing => Err(ExecutionError::Results(ResultFileError::Missing {
                path: result_file,
            })),
            _ => Ok(Execution {
                result_file,
                log_file: None,
                exit_code: Some(1),
                warnings: vec![EnvironmentWarning {
                    project: "docsis".to_string(),
                    path: PathBuf::from("docsis"),
                    reason: "exit status: 1".to_string(),
                }],
            }),
        }
    }
}

impl ResultReporting for Fakes {
    fn parse(&self, result_file: &Path) -> Result<Vec<ResultRecord>, ResultFileError> {
        if self.inject == Inject::ReportCorrupt {
            return Err(ResultFileError::corrupt(result_file, "test_results is not an array"));
        }
        Ok(vec![ResultRecord::new(Grade::Fail, "t2", "timeout", 30.0)])
    }

    fn render(&self, records: &[ResultRecord]) -> RunReport {
        RunReport {
            lines: records.iter().map(|r| r.name.clone()).collect(),
            summary: GradeCounts::from_records(records),
            annotations: Vec::new(),
        }
    }
}

#[async_trait]
impl ArtifactFinalizer for Fakes {
    async fn finalize(&self, _run_id: &str, result_file: Option<&Path>) -> FinalizeReport {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        self.finalized_with
            .lock()
            .unwrap()
            .push(result_file.map(Path::to_path_buf));
        let mut report = FinalizeReport::default();
        if self.workspace.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.workspace) {
                report.cleanup_errors.push(e.to_string());
            }
        }
        report
    }
}

fn pipeline_for(fakes: &Arc<Fakes>) -> Pipeline {
    Pipeline::new(PipelineStages {
        sync: fakes.clone(),
        detector: fakes.clone(),
        executor: fakes.clone(),
        reporter: fakes.clone(),
        finalizer: fakes.clone(),
    })
}

fn request() -> RunRequest {
    RunRequest::new(
        "run-test",
        Manifest::new("https://gerrit.example.com/manifest", "master"),
        BoardProfile::new("rpi4", "lab-a"),
    )
    .with_patch(PendingPatch::new(
        "boardfarm",
        "refs/changes/34/1234/2",
        "master",
    ))
}

#[tokio::test]
async fn test_completed_run_reports_counts() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(temp.path().join("ws"), Inject::Nothing);
    let result = pipeline_for(&fakes).run(&request()).await;

    let report = result.outcome.report().expect("completed");
    assert_eq!(report.summary, GradeCounts { pass: 0, fail: 1, skip: 0 });
    assert_eq!(report.annotations.len(), 1);
    assert!(result.tests_failed());
    assert!(!result.infrastructure_failed());
    assert_eq!(result.selection.unwrap().ids(), vec!["tests.wifi.scan"]);
    assert_eq!(fakes.finalized.load(Ordering::SeqCst), 1);
    assert_eq!(
        fakes.finalized_with.lock().unwrap()[0],
        Some(temp.path().join("ws/results/test_results.json"))
    );
    assert!(!temp.path().join("ws").exists());
}

#[tokio::test]
async fn test_empty_diff_is_no_op_and_never_executes() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(temp.path().join("ws"), Inject::EmptyDiff);
    let result = pipeline_for(&fakes).run(&request()).await;

    assert!(result.outcome.is_no_op());
    assert_eq!(fakes.executed.load(Ordering::SeqCst), 0);
    assert_eq!(fakes.finalized.load(Ordering::SeqCst), 1);
    assert_eq!(fakes.finalized_with.lock().unwrap()[0], None);
    assert!(!temp.path().join("ws").exists());
}

#[tokio::test]
async fn test_patch_conflict_fails_sync_without_executing() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(temp.path().join("ws"), Inject::PatchConflict);
    let result = pipeline_for(&fakes).run(&request()).await;

    match &result.outcome {
        Outcome::Failed { stage, reason } => {
            assert_eq!(*stage, Stage::Sync);
            assert_eq!(reason.kind(), "PatchConflict");
        }
        other => panic!("unexpected outcome {other}"),
    }
    assert_eq!(fakes.executed.load(Ordering::SeqCst), 0);
    assert!(result.snapshot.is_none());
}

#[tokio::test]
async fn test_finalize_fires_once_for_failure_at_every_stage() {
    let cases = [
        (Inject::SyncFailure, Stage::Sync, "SyncFailure"),
        (Inject::PatchConflict, Stage::Sync, "PatchConflict"),
        (Inject::DiffFailure, Stage::Detect, "ChangeDetection"),
        (Inject::SelectionFailure, Stage::Select, "ModuleSelection"),
        (Inject::UnknownBaseInOverlay, Stage::Select, "ModuleSelection"),
        (Inject::ExecutionFailure, Stage::Execute, "Execution"),
        (Inject::ResultMissing, Stage::Execute, "ResultFileMissing"),
        (Inject::ReportCorrupt, Stage::Report, "ResultFileCorrupt"),
    ];

    for (inject, expected_stage, expected_kind) in cases {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ws");
        let fakes = Fakes::new(workspace.clone(), inject);
        let result = pipeline_for(&fakes).run(&request()).await;

        match &result.outcome {
            Outcome::Failed { stage, reason } => {
                assert_eq!(*stage, expected_stage, "stage for {expected_kind}");
                assert_eq!(reason.kind(), expected_kind);
            }
            other => panic!("expected failure for {expected_kind}, got {other}"),
        }
        assert_eq!(fakes.finalized.load(Ordering::SeqCst), 1, "{expected_kind}");
        assert!(!workspace.exists(), "{expected_kind} left the workspace behind");
    }
}

#[tokio::test]
async fn test_git_error_while_selecting_is_module_selection_failure() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(temp.path().join("ws"), Inject::UnknownBaseInOverlay);
    let result = pipeline_for(&fakes).run(&request()).await;

    match &result.outcome {
        Outcome::Failed {
            stage: Stage::Select,
            reason: FailureReason::ModuleSelection(detail),
        } => assert!(detail.contains("origin/master"), "{detail}"),
        other => panic!("unexpected outcome {other}"),
    }
    assert!(result.snapshot.is_some());
    assert!(result.selection.is_none());
    assert_eq!(fakes.executed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_node_mismatch_fails_preflight() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(temp.path().join("ws"), Inject::Nothing);
    let collecting = Arc::new(CollectingReporter::default());
    let pipeline = pipeline_for(&fakes).with_reporter(collecting.clone());
    let req = request().with_node(
        NodeRequirement::new(["boardfarm", "lab-a"]),
        vec!["boardfarm".to_string(), "lab-b".to_string()],
    );
    let result = pipeline.run(&req).await;

    assert_eq!(
        result.outcome,
        Outcome::Failed {
            stage: Stage::Preflight,
            reason: FailureReason::NodeCapability(
                "Node lacks required capabilities: lab-a".to_string()
            ),
        }
    );
    assert_eq!(
        collecting.started_stages(),
        vec![Stage::Preflight, Stage::Finalize]
    );
    assert_eq!(fakes.finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_still_finalizes() {
    for hang in [Stage::Sync, Stage::Detect, Stage::Select, Stage::Execute] {
        let temp = TempDir::new().unwrap();
        let workspace = temp.path().join("ws");
        let fakes = Fakes::new(workspace.clone(), Inject::HangIn(hang));
        let cancel = tokio::time::sleep(Duration::from_secs(5));
        let result = pipeline_for(&fakes).run_until(&request(), cancel).await;

        assert_eq!(
            result.outcome,
            Outcome::Failed {
                stage: hang,
                reason: FailureReason::Cancelled,
            }
        );
        assert_eq!(fakes.finalized.load(Ordering::SeqCst), 1);
        assert!(!workspace.exists());
    }
}

#[tokio::test]
async fn test_stage_order() {
    let temp = TempDir::new().unwrap();
    let fakes = Fakes::new(temp.path().join("ws"), Inject::Nothing);
    let collecting = Arc::new(CollectingReporter::default());
    pipeline_for(&fakes)
        .with_reporter(collecting.clone())
        .run(&request())
        .await;

    assert_eq!(
        collecting.started_stages(),
        vec![
            Stage::Preflight,
            Stage::Sync,
            Stage::Detect,
            Stage::Select,
            Stage::Execute,
            Stage::Report,
            Stage::Finalize,
        ]
    );
}
