//! Typed adapter over `git diff --shortstat`

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, instrument};

use farmgate_core::error::GitError;
use farmgate_core::ShortStat;

use crate::repository::Result;

static SHORTSTAT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\d+) files? changed(?:, (\d+) insertions?\(\+\))?(?:, (\d+) deletions?\(-\))?\s*$",
    )
    .expect("Invalid regex")
});

/// Parse the output of `git diff --shortstat`; empty output means no change
pub fn parse_shortstat(output: &str) -> Result<ShortStat> {
    let line = output.trim();
    if line.is_empty() {
        return Ok(ShortStat::default());
    }

    let caps = SHORTSTAT_REGEX
        .captures(line)
        .ok_or_else(|| GitError::UnparsableStat(line.to_string()))?;
    let number = |i: usize| -> Result<usize> {
        caps.get(i)
            .map(|m| {
                m.as_str()
                    .parse::<usize>()
                    .map_err(|_| GitError::UnparsableStat(line.to_string()))
            })
            .unwrap_or(Ok(0))
    };

    Ok(ShortStat {
        files_changed: number(1)?,
        insertions: number(2)?,
        deletions: number(3)?,
    })
}

/// Run `git diff --shortstat <base> <head>` in a repository and parse it
#[instrument(fields(repo = %repo_path.display()))]
pub async fn shortstat(repo_path: &Path, base: &str, head: &str) -> Result<ShortStat> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_path)
        .args(["diff", "--shortstat", base, head])
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(GitError::CommandFailed {
            command: format!("diff --shortstat {} {}", base, head),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let stat = parse_shortstat(&String::from_utf8_lossy(&output.stdout))?;
    debug!(
        files = stat.files_changed,
        insertions = stat.insertions,
        deletions = stat.deletions,
        "diff statistic"
    );
    Ok(stat)
}
