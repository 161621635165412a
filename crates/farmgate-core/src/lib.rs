//! farmgate core - types, configuration and pipeline orchestration
//!
//! This crate provides the error taxonomy, configuration, domain types,
//! the node capability contract and the staged pipeline that drives a
//! change-driven hardware-in-the-loop test run.

pub mod config;
pub mod error;
pub mod node;
pub mod pipeline;
pub mod types;

pub use config::Config;
pub use error::{FarmgateError, Result};
pub use node::NodeRequirement;
pub use pipeline::{
    FailureReason, Outcome, Pipeline, PipelineResult, PipelineStages, RunRequest, Stage,
};
pub use types::{
    BoardProfile, DiffSummary, EnvironmentWarning, Execution, FinalizeReport, Grade,
    GradeCounts, Manifest, ModuleSelection, PendingPatch, RepoSnapshot, ResultRecord,
    RunReport, SelectedModule, SelectionReason, ShortStat,
};
