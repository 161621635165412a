//! Core types for farmgate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::ManifestConfig;

/// Set of repositories to synchronize, pinned to one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// URL handed to the checkout tool
    pub url: String,
    /// Branch every repository is pinned to
    pub branch: String,
    /// Remote used for fetching patches and rebasing
    pub remote: String,
}

impl Manifest {
    /// Create a manifest reference using the `origin` remote
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            remote: "origin".to_string(),
        }
    }

    /// Build from the `manifest` config section, if a URL is configured
    pub fn from_config(config: &ManifestConfig) -> Option<Self> {
        config.url.as_ref().map(|url| Self {
            url: url.clone(),
            branch: config.branch.clone(),
            remote: config.remote.clone(),
        })
    }

    /// Remote-tracking reference of the branch tip
    pub fn upstream(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

/// One unmerged change to apply on top of the branch tip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPatch {
    /// Project (repository) name as listed by the manifest
    pub project: String,
    /// Review-system reference, e.g. `refs/changes/34/1234/2`
    pub change_ref: String,
    /// Branch the change will be rebased onto
    pub target_branch: String,
}

impl PendingPatch {
    pub fn new(
        project: impl Into<String>,
        change_ref: impl Into<String>,
        target_branch: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            change_ref: change_ref.into(),
            target_branch: target_branch.into(),
        }
    }
}

impl fmt::Display for PendingPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} -> {}", self.project, self.change_ref, self.target_branch)
    }
}

/// A repository at its resolved commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRepo {
    /// Checkout path relative to the workspace root
    pub path: PathBuf,
    /// Full commit hash
    pub commit: String,
}

/// Resolved commit for every repository of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSnapshot {
    /// Workspace root
    pub root: PathBuf,
    /// Repository name -> resolved repository
    pub repos: BTreeMap<String, ResolvedRepo>,
    /// Project the pending patch was applied to
    pub patched: Option<String>,
}

impl RepoSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            repos: BTreeMap::new(),
            patched: None,
        }
    }

    /// Record a repository's resolved commit
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>, commit: impl Into<String>) {
        self.repos.insert(
            name.into(),
            ResolvedRepo {
                path: path.into(),
                commit: commit.into(),
            },
        );
    }

    /// Resolved commit of a repository
    pub fn commit(&self, name: &str) -> Option<&str> {
        self.repos.get(name).map(|r| r.commit.as_str())
    }

    /// Absolute working copy path of a repository
    pub fn repo_path(&self, name: &str) -> Option<PathBuf> {
        self.repos.get(name).map(|r| self.root.join(&r.path))
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Manifest-equivalent listing, one `name path commit` line per repository
    pub fn listing(&self) -> Vec<String> {
        self.repos
            .iter()
            .map(|(name, repo)| format!("{} {} {}", name, repo.path.display(), repo.commit))
            .collect()
    }
}

/// Parsed diff statistic of one repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortStat {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl ShortStat {
    pub fn is_empty(&self) -> bool {
        self.files_changed == 0
    }
}

/// Diff statistic across every repository of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub file_count: usize,
    pub insertions: usize,
    pub deletions: usize,
    /// Per-repository statistic (only repositories that were diffed)
    pub per_repo: BTreeMap<String, ShortStat>,
}

impl DiffSummary {
    /// Aggregate per-repository statistics
    pub fn from_stats<I, S>(stats: I) -> Self
    where
        I: IntoIterator<Item = (S, ShortStat)>,
        S: Into<String>,
    {
        let mut summary = Self::default();
        for (repo, stat) in stats {
            summary.file_count += stat.files_changed;
            summary.insertions += stat.insertions;
            summary.deletions += stat.deletions;
            summary.per_repo.insert(repo.into(), stat);
        }
        summary
    }

    /// Whether there is nothing worth testing
    pub fn is_empty(&self) -> bool {
        self.file_count == 0
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files changed, {} insertions(+), {} deletions(-)",
            self.file_count, self.insertions, self.deletions
        )
    }
}

/// Reason a test module was selected
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum SelectionReason {
    /// The module's own file changed
    DirectChange(PathBuf),
    /// A file the module imports (possibly transitively) changed
    DependencyChanged(PathBuf),
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectChange(p) => write!(f, "changed: {}", p.display()),
            Self::DependencyChanged(p) => write!(f, "imports changed {}", p.display()),
        }
    }
}

/// A selected test module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedModule {
    /// Dotted identifier relative to the overlay (`tests.wifi.scan`)
    pub id: String,
    /// File path relative to the overlay
    pub path: PathBuf,
    pub reason: SelectionReason,
}

/// Ordered, de-duplicated set of test modules impacted by a diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSelection {
    pub overlay: String,
    pub modules: Vec<SelectedModule>,
}

impl ModuleSelection {
    pub fn empty(overlay: impl Into<String>) -> Self {
        Self {
            overlay: overlay.into(),
            modules: Vec::new(),
        }
    }

    /// Module identifiers in selection order
    pub fn ids(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Target device and environment overlay for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardProfile {
    /// Target device identifier
    pub board: String,
    /// Environment overlay name
    pub overlay: String,
    /// Board configuration file
    pub config: Option<PathBuf>,
}

impl BoardProfile {
    pub fn new(board: impl Into<String>, overlay: impl Into<String>) -> Self {
        Self {
            board: board.into(),
            overlay: overlay.into(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: impl Into<PathBuf>) -> Self {
        self.config = Some(config.into());
        self
    }

    /// Expand `{board}`, `{overlay}`, `{config}` and `{results_dir}` in a template
    pub fn expand(&self, template: &str, results_dir: &Path) -> String {
        let config = self
            .config
            .as_ref()
            .map(|c| c.display().to_string())
            .unwrap_or_default();
        template
            .replace("{board}", &self.board)
            .replace("{overlay}", &self.overlay)
            .replace("{config}", &config)
            .replace("{results_dir}", &results_dir.display().to_string())
    }
}

/// Grade of one executed test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    Pass,
    Fail,
    Skip,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Grade {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PASS" | "OK" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Fail),
            "SKIP" => Ok(Self::Skip),
            _ => Err(format!("Unknown grade: {}", s)),
        }
    }
}

/// One executed test, in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub grade: Grade,
    pub name: String,
    pub message: String,
    /// Elapsed time in seconds
    pub elapsed_time: f64,
}

impl ResultRecord {
    pub fn new(grade: Grade, name: impl Into<String>, message: impl Into<String>, elapsed_time: f64) -> Self {
        Self {
            grade,
            name: name.into(),
            message: message.into(),
            elapsed_time,
        }
    }
}

/// Number of records per grade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCounts {
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
}

impl GradeCounts {
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            match record.grade {
                Grade::Pass => counts.pass += 1,
                Grade::Fail => counts.fail += 1,
                Grade::Skip => counts.skip += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pass + self.fail + self.skip
    }

    pub fn has_failures(&self) -> bool {
        self.fail > 0
    }
}

impl fmt::Display for GradeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PASS: {}, FAIL: {}, SKIP: {}", self.pass, self.fail, self.skip)
    }
}

/// Reviewer-facing report: one formatted line per record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub lines: Vec<String>,
    pub summary: GradeCounts,
    /// Non-fatal problems worth surfacing to the reviewer
    pub annotations: Vec<String>,
}

impl RunReport {
    /// Attach one `WARNING:` annotation per environment warning
    pub fn annotate(&mut self, warnings: &[EnvironmentWarning]) {
        self.annotations
            .extend(warnings.iter().map(|w| format!("WARNING: {}", w)));
    }

    /// Record lines joined by newlines
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }

    /// Full review comment: summary, annotations, then the record lines
    pub fn comment(&self) -> String {
        let mut out = vec![self.summary.to_string()];
        out.extend(self.annotations.iter().cloned());
        out.extend(self.lines.iter().cloned());
        out.join("\n")
    }
}

/// A sub-repository whose extra dependencies failed to install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentWarning {
    pub project: String,
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for EnvironmentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dependency install failed for {} ({}): {}",
            self.project,
            self.path.display(),
            self.reason
        )
    }
}

/// Output of a test execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Validated result file
    pub result_file: PathBuf,
    /// Captured runner output
    pub log_file: Option<PathBuf>,
    /// Runner exit code (test failures are data, not errors)
    pub exit_code: Option<i32>,
    pub warnings: Vec<EnvironmentWarning>,
}

/// What finalize did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeReport {
    /// Archive directory for this run, if anything was archived
    pub archive_dir: Option<PathBuf>,
    /// File names copied into the archive
    pub archived: Vec<String>,
    /// Archive failure, if any
    pub archive_error: Option<String>,
    /// Cleanup failures
    pub cleanup_errors: Vec<String>,
}

impl FinalizeReport {
    pub fn is_clean(&self) -> bool {
        self.archive_error.is_none() && self.cleanup_errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_parsing() {
        assert_eq!("pass".parse::<Grade>().unwrap(), Grade::Pass);
        assert_eq!("OK".parse::<Grade>().unwrap(), Grade::Pass);
        assert_eq!(" Fail ".parse::<Grade>().unwrap(), Grade::Fail);
        assert_eq!("SKIP".parse::<Grade>().unwrap(), Grade::Skip);
        assert!("ERROR".parse::<Grade>().is_err());
    }

    #[test]
    fn test_grade_counts() {
        let records = vec![
            ResultRecord::new(Grade::Pass, "a", "", 1.0),
            ResultRecord::new(Grade::Fail, "b", "boom", 2.0),
            ResultRecord::new(Grade::Pass, "c", "", 0.5),
        ];
        let counts = GradeCounts::from_records(&records);
        assert_eq!(counts, GradeCounts { pass: 2, fail: 1, skip: 0 });
        assert_eq!(counts.total(), 3);
        assert!(counts.has_failures());
        assert_eq!(counts.to_string(), "PASS: 2, FAIL: 1, SKIP: 0");
    }

    #[test]
    fn test_diff_summary_aggregation() {
        let summary = DiffSummary::from_stats(vec![
            ("boardfarm", ShortStat { files_changed: 2, insertions: 10, deletions: 1 }),
            ("docsis", ShortStat::default()),
        ]);
        assert_eq!(summary.file_count, 2);
        assert_eq!(summary.per_repo.len(), 2);
        assert!(!summary.is_empty());
        assert!(DiffSummary::default().is_empty());
    }

    #[test]
    fn test_snapshot_listing() {
        let mut snapshot = RepoSnapshot::new("/ws");
        snapshot.insert("boardfarm", "boardfarm", "abc123");
        snapshot.insert("athena", "overlays/athena", "def456");
        assert_eq!(
            snapshot.listing(),
            vec!["athena overlays/athena def456", "boardfarm boardfarm abc123"]
        );
        assert_eq!(snapshot.repo_path("athena"), Some(PathBuf::from("/ws/overlays/athena")));
        assert_eq!(snapshot.commit("boardfarm"), Some("abc123"));
    }

    #[test]
    fn test_board_profile_expand() {
        let profile = BoardProfile::new("rpi4", "lab-a").with_config("/etc/boards.json");
        assert_eq!(profile.expand("-b={board}", Path::new("/r")), "-b=rpi4");
        assert_eq!(profile.expand("{overlay}:{config}", Path::new("/r")), "lab-a:/etc/boards.json");
        assert_eq!(profile.expand("{results_dir}/x", Path::new("/r")), "/r/x");
        assert_eq!(BoardProfile::new("b", "o").expand("{config}", Path::new("/r")), "");
    }

    #[test]
    fn test_report_comment() {
        let mut report = RunReport {
            lines: vec!["PASS\tt1\t\t1.2".to_string()],
            summary: GradeCounts { pass: 1, fail: 0, skip: 0 },
            annotations: Vec::new(),
        };
        report.annotate(&[EnvironmentWarning {
            project: "docsis".to_string(),
            path: PathBuf::from("docsis"),
            reason: "exit status 1".to_string(),
        }]);
        let comment = report.comment();
        let lines: Vec<&str> = comment.lines().collect();
        assert_eq!(lines[0], "PASS: 1, FAIL: 0, SKIP: 0");
        assert!(lines[1].starts_with("WARNING: dependency install failed for docsis"));
        assert_eq!(lines[2], "PASS\tt1\t\t1.2");
        assert_eq!(report.body(), "PASS\tt1\t\t1.2");
    }
}
