//! Error types for farmgate

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using FarmgateError
pub type Result<T> = std::result::Result<T, FarmgateError>;

/// Main error type for farmgate operations
#[derive(Debug, Error)]
pub enum FarmgateError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Git-related errors
    #[error(transparent)]
    Git(#[from] GitError),

    /// Workspace synchronization errors
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Change detection errors
    #[error(transparent)]
    Detect(#[from] DetectError),

    /// Node capability errors
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Test execution errors
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Result file errors
    #[error(transparent)]
    ResultFile(#[from] ResultFileError),

    /// Artifact errors
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Git-related errors
#[derive(Debug, Error)]
pub enum GitError {
    /// Repository not found
    #[error("Git repository not found at {0}")]
    RepositoryNotFound(PathBuf),

    /// Failed to open repository
    #[error("Failed to open repository: {0}")]
    OpenFailed(String),

    /// Reference could not be resolved
    #[error("Cannot resolve reference '{reference}' in {repo}")]
    UnknownRef { repo: String, reference: String },

    /// Remote not found
    #[error("Remote not found: {0}")]
    RemoteNotFound(String),

    /// Failed to fetch
    #[error("Failed to fetch {refspec} from {remote}: {reason}")]
    FetchFailed {
        remote: String,
        refspec: String,
        reason: String,
    },

    /// Rebase stopped on conflicting paths
    #[error("Rebase onto {upstream} conflicts in: {}", paths.join(", "))]
    RebaseConflict { upstream: String, paths: Vec<String> },

    /// Git command line invocation failed
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Diff statistic output could not be understood
    #[error("Unrecognized diff statistic output: {0}")]
    UnparsableStat(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Git2 library error
    #[error("Git error: {0}")]
    Git2(#[from] git2::Error),
}

/// Workspace synchronization errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// Workspace could not be created or reset
    #[error("Workspace sync failed at {path}: {reason}")]
    SyncFailure { path: PathBuf, reason: String },

    /// Checkout tool invocation failed
    #[error("Checkout tool `{command}` failed: {reason}")]
    CheckoutTool { command: String, reason: String },

    /// The pending patch names a project the manifest does not contain
    #[error("Project '{0}' is not part of the manifest")]
    UnknownProject(String),

    /// The pending patch could not be rebased cleanly
    #[error("Patch {change_ref} for {project} does not apply: {reason}")]
    PatchConflict {
        project: String,
        change_ref: String,
        reason: String,
    },

    /// Git error while resolving the snapshot
    #[error(transparent)]
    Git(#[from] GitError),
}

impl SyncError {
    /// Create a sync failure for a workspace path
    pub fn failure(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SyncFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a patch conflict (human actionable)
    pub fn is_patch_conflict(&self) -> bool {
        matches!(self, Self::PatchConflict { .. })
    }
}

/// Change detection errors
#[derive(Debug, Error)]
pub enum DetectError {
    /// Diff statistic could not be computed
    #[error("Diff statistic for {repo} failed: {source}")]
    DiffStat {
        repo: String,
        #[source]
        source: GitError,
    },

    /// Overlay directory does not exist under the workspace
    #[error("Overlay '{overlay}' not found under {root}")]
    OverlayNotFound { overlay: String, root: PathBuf },

    /// Overlay name matches more than one directory
    #[error("Overlay '{overlay}' is ambiguous: {}", candidates.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    AmbiguousOverlay {
        overlay: String,
        candidates: Vec<PathBuf>,
    },

    /// Module selection failed
    #[error("Module selection failed: {0}")]
    ModuleSelection(String),

    /// Git error while listing changed files
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Node capability errors
#[derive(Debug, Error)]
pub enum NodeError {
    /// The node lacks one or more declared capabilities
    #[error("Node lacks required capabilities: {}", missing.join(", "))]
    MissingCapabilities { missing: Vec<String> },
}

/// Test execution errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Isolated environment could not be provisioned
    #[error("Failed to provision environment at {path}: {reason}")]
    Provision { path: PathBuf, reason: String },

    /// The test runner itself could not be installed
    #[error("Failed to install test runner '{package}': {reason}")]
    RunnerInstall { package: String, reason: String },

    /// The runner process could not be started
    #[error("Failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// The runner exceeded its time budget
    #[error("Test runner timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The runner finished but its results are unusable
    #[error(transparent)]
    Results(#[from] ResultFileError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result file errors
#[derive(Debug, Error)]
pub enum ResultFileError {
    /// The runner did not produce a result file
    #[error("Result file missing: {path}")]
    Missing { path: PathBuf },

    /// The result file exists but is malformed
    #[error("Result file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

impl ResultFileError {
    /// Create a corrupt-file error
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Artifact errors
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Archiving to durable storage failed
    #[error("Failed to archive {path}: {reason}")]
    ArchiveFailure { path: PathBuf, reason: String },

    /// Workspace cleanup failed
    #[error("Failed to remove {path}: {reason}")]
    CleanupFailure { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_conflict_lists_paths() {
        let err = GitError::RebaseConflict {
            upstream: "origin/master".to_string(),
            paths: vec!["a.py".to_string(), "b.py".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Rebase onto origin/master conflicts in: a.py, b.py"
        );
    }

    #[test]
    fn test_patch_conflict_detection() {
        let err = SyncError::PatchConflict {
            project: "boardfarm".to_string(),
            change_ref: "refs/changes/12/1234/2".to_string(),
            reason: "conflict".to_string(),
        };
        assert!(err.is_patch_conflict());
        assert!(!SyncError::failure("/tmp/ws", "gone").is_patch_conflict());
    }

    #[test]
    fn test_error_conversion() {
        let err: FarmgateError = NodeError::MissingCapabilities {
            missing: vec!["lab-a".to_string()],
        }
        .into();
        assert!(err.to_string().contains("lab-a"));
    }
}
