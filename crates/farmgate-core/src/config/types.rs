//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration for farmgate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Manifest / branch to synchronize
    pub manifest: ManifestConfig,

    /// Workspace layout
    pub workspace: WorkspaceConfig,

    /// Test runner invocation
    pub runner: RunnerConfig,

    /// Module selection
    pub selection: SelectionConfig,

    /// Execution node requirements
    pub node: NodeConfig,
}

/// Manifest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Manifest URL handed to the checkout tool
    pub url: Option<String>,

    /// Branch all repositories are pinned to
    pub branch: String,

    /// Remote name used for fetching and rebasing
    pub remote: String,

    /// Base reference for change detection (`{remote}` and `{branch}` are expanded)
    pub base_ref: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            url: None,
            branch: "master".to_string(),
            remote: "origin".to_string(),
            base_ref: "{remote}/{branch}".to_string(),
        }
    }
}

impl ManifestConfig {
    /// Base reference with placeholders expanded
    pub fn resolved_base_ref(&self) -> String {
        self.base_ref
            .replace("{remote}", &self.remote)
            .replace("{branch}", &self.branch)
    }
}

/// Workspace layout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Workspace root holding every synchronized repository
    pub root: PathBuf,

    /// Results directory, relative to the workspace root
    pub results_dir: PathBuf,

    /// Durable archive directory (not removed at teardown)
    pub archive_dir: PathBuf,

    /// Isolated environment directory, relative to the workspace root
    pub venv_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("hil-workspace"),
            results_dir: PathBuf::from("results"),
            archive_dir: PathBuf::from("artifacts"),
            venv_dir: PathBuf::from(".venv"),
        }
    }
}

impl WorkspaceConfig {
    /// Absolute-or-cwd-relative results directory
    pub fn results_path(&self) -> PathBuf {
        self.root.join(&self.results_dir)
    }

    /// Absolute-or-cwd-relative environment directory
    pub fn venv_path(&self) -> PathBuf {
        self.root.join(&self.venv_dir)
    }

    /// Re-anchor relative paths at `base`
    pub fn anchored(&self, base: &Path) -> Self {
        let anchor = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self {
            root: anchor(&self.root),
            results_dir: self.results_dir.clone(),
            archive_dir: anchor(&self.archive_dir),
            venv_dir: self.venv_dir.clone(),
        }
    }
}

/// Test runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Interpreter used to create the isolated environment
    pub python: String,

    /// Package providing the runner
    pub package: String,

    /// Runner executable inside the environment
    pub binary: String,

    /// Argument template; `{config}` and the flag before it are left out
    /// when no board config is given
    pub args: Vec<String>,

    /// Flag preceding the selected module identifiers
    pub module_flag: String,

    /// Result file name, relative to the results directory
    pub result_file: String,

    /// Marker files that make a sub-repository installable
    pub extra_install: Vec<String>,

    /// Wall-clock budget for the runner
    pub timeout_secs: Option<u64>,

    /// Extra environment variables for the runner
    pub env: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            package: "boardfarm".to_string(),
            binary: "bft".to_string(),
            args: vec![
                "-b".to_string(),
                "{board}".to_string(),
                "--env-overlay".to_string(),
                "{overlay}".to_string(),
                "-c".to_string(),
                "{config}".to_string(),
                "-o".to_string(),
                "{results_dir}".to_string(),
            ],
            module_flag: "-e".to_string(),
            result_file: "test_results.json".to_string(),
            extra_install: vec!["setup.py".to_string(), "pyproject.toml".to_string()],
            timeout_secs: None,
            env: BTreeMap::new(),
        }
    }
}

/// Module selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Globs (relative to the overlay) that identify test modules
    pub module_patterns: Vec<String>,

    /// Globs excluded from the module set
    pub exclude: Vec<String>,

    /// Maximum depth searched when the overlay is not directly under the root
    pub search_depth: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            module_patterns: vec!["tests/**/*.py".to_string()],
            exclude: vec!["**/__init__.py".to_string()],
            search_depth: 3,
        }
    }
}

/// Execution node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Labels the node must carry
    pub required_labels: Vec<String>,

    /// Environment variable listing the node's labels (comma separated)
    pub labels_env: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            required_labels: Vec::new(),
            labels_env: "NODE_LABELS".to_string(),
        }
    }
}
