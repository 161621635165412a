//! Change-driven test pipeline
//!
//! Stages run strictly in sequence: preflight, sync, detect, select,
//! execute, report. Whatever happens (a stage failing, the diff being empty,
//! the caller cancelling) finalize runs exactly once afterwards.

pub mod events;
pub mod outcome;
pub mod stages;

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use crate::node::NodeRequirement;
use crate::types::{BoardProfile, Manifest, ModuleSelection, PendingPatch, RepoSnapshot};

pub use events::{CollectingReporter, StageEvent, StageReporter, TracingReporter};
pub use outcome::{FailureReason, Outcome, PipelineResult, Stage};
pub use stages::{ArtifactFinalizer, ChangeDetection, ResultReporting, TestExecution, WorkspaceSync};

/// Head reference used for module selection in the patched workspace
pub const HEAD_REF: &str = "HEAD";

/// Stage implementations a pipeline is assembled from
#[derive(Clone)]
pub struct PipelineStages {
    pub sync: Arc<dyn WorkspaceSync>,
    pub detector: Arc<dyn ChangeDetection>,
    pub executor: Arc<dyn TestExecution>,
    pub reporter: Arc<dyn ResultReporting>,
    pub finalizer: Arc<dyn ArtifactFinalizer>,
}

/// Inputs of a single run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub manifest: Manifest,
    pub patch: Option<PendingPatch>,
    /// Base reference for change detection, e.g. `origin/master`
    pub base_ref: String,
    pub profile: BoardProfile,
    /// Extra environment for the runner
    pub env: BTreeMap<String, String>,
    pub node: NodeRequirement,
    /// Labels the current node advertises
    pub node_labels: Vec<String>,
}

impl RunRequest {
    pub fn new(run_id: impl Into<String>, manifest: Manifest, profile: BoardProfile) -> Self {
        let base_ref = manifest.upstream();
        Self {
            run_id: run_id.into(),
            manifest,
            patch: None,
            base_ref,
            profile,
            env: BTreeMap::new(),
            node: NodeRequirement::default(),
            node_labels: Vec::new(),
        }
    }

    pub fn with_patch(mut self, patch: PendingPatch) -> Self {
        self.patch = Some(patch);
        self
    }

    pub fn with_base_ref(mut self, base_ref: impl Into<String>) -> Self {
        self.base_ref = base_ref.into();
        self
    }

    pub fn with_node(mut self, node: NodeRequirement, labels: Vec<String>) -> Self {
        self.node = node;
        self.node_labels = labels;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// How far a run got; read after the stage sequence ends or is cancelled
#[derive(Default)]
struct Progress {
    stage: Cell<Option<Stage>>,
    snapshot: RefCell<Option<RepoSnapshot>>,
    selection: RefCell<Option<ModuleSelection>>,
    result_file: RefCell<Option<PathBuf>>,
}

/// The pipeline orchestrator
pub struct Pipeline {
    stages: PipelineStages,
    reporters: Vec<Arc<dyn StageReporter>>,
}

impl Pipeline {
    /// Create a pipeline that reports progress to tracing
    pub fn new(stages: PipelineStages) -> Self {
        Self {
            stages,
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    /// Add a progress reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn StageReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    fn emit(&self, event: StageEvent) {
        for reporter in &self.reporters {
            reporter.report(&event);
        }
    }

    /// Run to completion
    pub async fn run(&self, request: &RunRequest) -> PipelineResult {
        self.run_until(request, std::future::pending::<()>()).await
    }

    /// Run until the stage sequence ends or `cancel` resolves, then finalize
    #[instrument(skip_all, fields(run_id = %request.run_id))]
    pub async fn run_until<C>(&self, request: &RunRequest, cancel: C) -> PipelineResult
    where
        C: Future<Output = ()>,
    {
        let start = Instant::now();
        let progress = Progress::default();
        self.emit(StageEvent::RunStarted {
            run_id: request.run_id.clone(),
        });

        let outcome = tokio::select! {
            outcome = self.execute_stages(request, &progress) => outcome,
            _ = cancel => {
                let stage = progress.stage.get().unwrap_or(Stage::Preflight);
                info!(stage = %stage, "run cancelled");
                self.emit(StageEvent::Failed {
                    stage,
                    duration: start.elapsed(),
                    error: FailureReason::Cancelled.to_string(),
                });
                Outcome::Failed { stage, reason: FailureReason::Cancelled }
            }
        };

        let finalize_start = Instant::now();
        self.emit(StageEvent::Started {
            stage: Stage::Finalize,
        });
        let result_file = progress.result_file.borrow_mut().take();
        let finalize = self
            .stages
            .finalizer
            .finalize(&request.run_id, result_file.as_deref())
            .await;
        if let Some(err) = &finalize.archive_error {
            self.emit(StageEvent::Warning {
                stage: Stage::Finalize,
                message: format!("archive failed: {}", err),
            });
        }
        for err in &finalize.cleanup_errors {
            self.emit(StageEvent::Warning {
                stage: Stage::Finalize,
                message: format!("cleanup failed: {}", err),
            });
        }
        self.emit(StageEvent::Completed {
            stage: Stage::Finalize,
            duration: finalize_start.elapsed(),
        });

        let duration = start.elapsed();
        self.emit(StageEvent::Finished {
            run_id: request.run_id.clone(),
            outcome: outcome.name().to_string(),
            duration,
        });

        let snapshot = progress.snapshot.borrow_mut().take();
        let selection = progress.selection.borrow_mut().take();
        PipelineResult {
            run_id: request.run_id.clone(),
            outcome,
            snapshot,
            selection,
            finalize,
            duration_ms: duration.as_millis() as u64,
        }
    }

    fn enter(&self, progress: &Progress, stage: Stage) -> Instant {
        progress.stage.set(Some(stage));
        self.emit(StageEvent::Started { stage });
        Instant::now()
    }

    fn fail(&self, stage: Stage, started: Instant, reason: FailureReason) -> Outcome {
        self.emit(StageEvent::Failed {
            stage,
            duration: started.elapsed(),
            error: reason.to_string(),
        });
        Outcome::Failed { stage, reason }
    }

    fn done(&self, stage: Stage, started: Instant) {
        self.emit(StageEvent::Completed {
            stage,
            duration: started.elapsed(),
        });
    }

    async fn execute_stages(&self, request: &RunRequest, progress: &Progress) -> Outcome {
        let started = self.enter(progress, Stage::Preflight);
        if let Err(e) = request.node.check(&request.node_labels) {
            return self.fail(Stage::Preflight, started, (&e).into());
        }
        self.done(Stage::Preflight, started);

        let started = self.enter(progress, Stage::Sync);
        let snapshot = match self
            .stages
            .sync
            .sync(&request.manifest, request.patch.as_ref())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => return self.fail(Stage::Sync, started, (&e).into()),
        };
        for line in snapshot.listing() {
            info!(stage = "sync", "{}", line);
        }
        *progress.snapshot.borrow_mut() = Some(snapshot.clone());
        self.done(Stage::Sync, started);

        let started = self.enter(progress, Stage::Detect);
        let summary = match self
            .stages
            .detector
            .has_effective_change(&snapshot, &request.base_ref)
            .await
        {
            Ok(summary) => summary,
            Err(e) => return self.fail(Stage::Detect, started, (&e).into()),
        };
        self.done(Stage::Detect, started);
        if summary.is_empty() {
            info!(base_ref = %request.base_ref, "no effective change, nothing to test");
            return Outcome::NoOp { summary };
        }
        info!(files = summary.file_count, "effective change detected");

        let started = self.enter(progress, Stage::Select);
        let selection = match self
            .stages
            .detector
            .select_modules(
                &request.base_ref,
                HEAD_REF,
                &request.profile.overlay,
                &snapshot.root,
            )
            .await
        {
            Ok(selection) => selection,
            Err(e) => {
                let reason = FailureReason::ModuleSelection(e.to_string());
                return self.fail(Stage::Select, started, reason);
            }
        };
        info!(modules = ?selection.ids(), "module selection");
        *progress.selection.borrow_mut() = Some(selection.clone());
        self.done(Stage::Select, started);

        let started = self.enter(progress, Stage::Execute);
        let execution = match self
            .stages
            .executor
            .run(&request.profile, &selection, &request.env)
            .await
        {
            Ok(execution) => execution,
            Err(e) => return self.fail(Stage::Execute, started, (&e).into()),
        };
        *progress.result_file.borrow_mut() = Some(execution.result_file.clone());
        for warning in &execution.warnings {
            self.emit(StageEvent::Warning {
                stage: Stage::Execute,
                message: warning.to_string(),
            });
        }
        self.done(Stage::Execute, started);

        let started = self.enter(progress, Stage::Report);
        let records = match self.stages.reporter.parse(&execution.result_file) {
            Ok(records) => records,
            Err(e) => return self.fail(Stage::Report, started, (&e).into()),
        };
        let mut report = self.stages.reporter.render(&records);
        report.annotate(&execution.warnings);
        self.done(Stage::Report, started);

        Outcome::Completed { report }
    }
}
