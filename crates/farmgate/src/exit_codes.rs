//! Exit codes for the CLI

use farmgate_core::error::{ConfigError, ResultFileError};
use farmgate_core::{FailureReason, FarmgateError, Outcome, PipelineResult};

/// Success: COMPLETED or NO_OP
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Tests ran and at least one failed (only with `--fail-on-test-failure`)
pub const TEST_FAILURE: i32 = 3;

/// Workspace could not be synchronized
pub const SYNC_FAILURE: i32 = 10;

/// Pending patch does not rebase cleanly
pub const PATCH_CONFLICT: i32 = 11;

/// Change detection or module selection failed
pub const SELECTION_FAILURE: i32 = 12;

/// Node lacks a required capability
pub const NODE_MISMATCH: i32 = 13;

/// Environment or runner failure
pub const EXECUTION_FAILURE: i32 = 14;

/// Result file missing or corrupt
pub const RESULT_FILE: i32 = 15;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Exit code for a finished run
pub fn for_result(result: &PipelineResult, fail_on_test_failure: bool) -> i32 {
    match &result.outcome {
        Outcome::NoOp { .. } => SUCCESS,
        Outcome::Completed { .. } if fail_on_test_failure && result.tests_failed() => TEST_FAILURE,
        Outcome::Completed { .. } => SUCCESS,
        Outcome::Failed { reason, .. } => for_reason(reason),
    }
}

/// Exit code for a failed stage
pub fn for_reason(reason: &FailureReason) -> i32 {
    match reason {
        FailureReason::SyncFailure(_) => SYNC_FAILURE,
        FailureReason::PatchConflict(_) => PATCH_CONFLICT,
        FailureReason::ChangeDetection(_) | FailureReason::ModuleSelection(_) => SELECTION_FAILURE,
        FailureReason::NodeCapability(_) => NODE_MISMATCH,
        FailureReason::Execution(_) => EXECUTION_FAILURE,
        FailureReason::ResultFileMissing(_) | FailureReason::ResultFileCorrupt(_) => RESULT_FILE,
        FailureReason::Cancelled => CANCELLED,
    }
}

/// Exit code for an error that escaped a command
pub fn for_error(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigError>().is_some() {
        return CONFIG_ERROR;
    }
    if err.downcast_ref::<ResultFileError>().is_some() {
        return RESULT_FILE;
    }
    match err.downcast_ref::<FarmgateError>() {
        Some(FarmgateError::Config(_)) => CONFIG_ERROR,
        Some(FarmgateError::ResultFile(_)) => RESULT_FILE,
        Some(FarmgateError::Detect(_)) => SELECTION_FAILURE,
        _ => ERROR,
    }
}
