//! Stage contracts
//!
//! Each stage is a trait so the pipeline can be driven with real git/process
//! backed implementations or with in-memory fakes.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::{DetectError, ExecutionError, ResultFileError, SyncError};
use crate::types::{
    BoardProfile, DiffSummary, Execution, FinalizeReport, Manifest, ModuleSelection,
    PendingPatch, RepoSnapshot, ResultRecord, RunReport,
};

/// Builds the multi-repository snapshot for a branch plus at most one patch
#[async_trait]
pub trait WorkspaceSync: Send + Sync {
    async fn sync(
        &self,
        manifest: &Manifest,
        patch: Option<&PendingPatch>,
    ) -> Result<RepoSnapshot, SyncError>;
}

/// Decides whether a snapshot changes anything and which modules it touches
#[async_trait]
pub trait ChangeDetection: Send + Sync {
    /// Diff statistic between `base_ref` and the snapshot across all repositories
    async fn has_effective_change(
        &self,
        snapshot: &RepoSnapshot,
        base_ref: &str,
    ) -> Result<DiffSummary, DetectError>;

    /// Test modules of `overlay` reachable from files changed between the refs
    async fn select_modules(
        &self,
        base_ref: &str,
        head_ref: &str,
        overlay: &str,
        workspace_root: &Path,
    ) -> Result<ModuleSelection, DetectError>;
}

/// Runs the selected modules against a board
#[async_trait]
pub trait TestExecution: Send + Sync {
    async fn run(
        &self,
        profile: &BoardProfile,
        selection: &ModuleSelection,
        env: &BTreeMap<String, String>,
    ) -> Result<Execution, ExecutionError>;
}

/// Turns a result file into a reviewer-facing report
pub trait ResultReporting: Send + Sync {
    fn parse(&self, result_file: &Path) -> Result<Vec<ResultRecord>, ResultFileError>;

    fn render(&self, records: &[ResultRecord]) -> RunReport;
}

/// Archives artifacts and releases the workspace; must never fail the run
#[async_trait]
pub trait ArtifactFinalizer: Send + Sync {
    async fn finalize(&self, run_id: &str, result_file: Option<&Path>) -> FinalizeReport;
}
