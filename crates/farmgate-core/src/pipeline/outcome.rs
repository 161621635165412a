//! Terminal outcomes of a pipeline run

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DetectError, ExecutionError, NodeError, ResultFileError, SyncError};
use crate::types::{DiffSummary, FinalizeReport, ModuleSelection, RepoSnapshot, RunReport};

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preflight,
    Sync,
    Detect,
    Select,
    Execute,
    Report,
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Sync => "sync",
            Self::Detect => "detect",
            Self::Select => "select",
            Self::Execute => "execute",
            Self::Report => "report",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a stage aborted the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    NodeCapability(String),
    SyncFailure(String),
    PatchConflict(String),
    ChangeDetection(String),
    ModuleSelection(String),
    Execution(String),
    ResultFileMissing(String),
    ResultFileCorrupt(String),
    Cancelled,
}

impl FailureReason {
    /// Short tag for dashboards
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeCapability(_) => "NodeCapability",
            Self::SyncFailure(_) => "SyncFailure",
            Self::PatchConflict(_) => "PatchConflict",
            Self::ChangeDetection(_) => "ChangeDetection",
            Self::ModuleSelection(_) => "ModuleSelection",
            Self::Execution(_) => "Execution",
            Self::ResultFileMissing(_) => "ResultFileMissing",
            Self::ResultFileCorrupt(_) => "ResultFileCorrupt",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::NodeCapability(d)
            | Self::SyncFailure(d)
            | Self::PatchConflict(d)
            | Self::ChangeDetection(d)
            | Self::ModuleSelection(d)
            | Self::Execution(d)
            | Self::ResultFileMissing(d)
            | Self::ResultFileCorrupt(d) => Some(d),
            Self::Cancelled => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {}", self.kind(), detail),
            None => write!(f, "{}", self.kind()),
        }
    }
}

impl From<&NodeError> for FailureReason {
    fn from(err: &NodeError) -> Self {
        Self::NodeCapability(err.to_string())
    }
}

impl From<&SyncError> for FailureReason {
    fn from(err: &SyncError) -> Self {
        if err.is_patch_conflict() {
            Self::PatchConflict(err.to_string())
        } else {
            Self::SyncFailure(err.to_string())
        }
    }
}

impl From<&DetectError> for FailureReason {
    fn from(err: &DetectError) -> Self {
        match err {
            DetectError::DiffStat { .. } | DetectError::Git(_) => {
                Self::ChangeDetection(err.to_string())
            }
            DetectError::OverlayNotFound { .. }
            | DetectError::AmbiguousOverlay { .. }
            | DetectError::ModuleSelection(_) => Self::ModuleSelection(err.to_string()),
        }
    }
}

impl From<&ResultFileError> for FailureReason {
    fn from(err: &ResultFileError) -> Self {
        match err {
            ResultFileError::Missing { .. } => Self::ResultFileMissing(err.to_string()),
            ResultFileError::Corrupt { .. } => Self::ResultFileCorrupt(err.to_string()),
        }
    }
}

impl From<&ExecutionError> for FailureReason {
    fn from(err: &ExecutionError) -> Self {
        match err {
            ExecutionError::Results(inner) => inner.into(),
            _ => Self::Execution(err.to_string()),
        }
    }
}

/// Terminal outcome of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// No effective change, zero tests run
    NoOp { summary: DiffSummary },
    /// Tests ran and were reported
    Completed { report: RunReport },
    /// A stage aborted before a report was produced
    Failed { stage: Stage, reason: FailureReason },
}

impl Outcome {
    pub fn failed(stage: Stage, reason: impl Into<FailureReason>) -> Self {
        Self::Failed {
            stage,
            reason: reason.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoOp { .. } => "NO_OP",
            Self::Completed { .. } => "COMPLETED",
            Self::Failed { .. } => "FAILED",
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::NoOp { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed { report } => Some(report),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp { summary } => write!(f, "NO_OP ({})", summary),
            Self::Completed { report } => write!(f, "COMPLETED ({})", report.summary),
            Self::Failed { stage, reason } => write!(f, "FAILED({}, {})", stage, reason),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,
    pub outcome: Outcome,
    /// Snapshot, when sync got that far
    pub snapshot: Option<RepoSnapshot>,
    /// Module selection, when selection got that far
    pub selection: Option<ModuleSelection>,
    pub finalize: FinalizeReport,
    /// Total duration in milliseconds
    pub duration_ms: u64,
}

impl PipelineResult {
    /// Whether the run ended in a failed stage
    pub fn infrastructure_failed(&self) -> bool {
        self.outcome.is_failed()
    }

    /// Whether tests ran and at least one graded FAIL
    pub fn tests_failed(&self) -> bool {
        self.outcome
            .report()
            .is_some_and(|r| r.summary.has_failures())
    }
}
