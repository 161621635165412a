//! Doctor command - check the node for required tools and configuration

use std::process::Command;

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use farmgate_core::config::validate_config;
use farmgate_core::Config;

use crate::cli::{Cli, OutputFormat};

/// Check the node for required tools and a valid configuration
#[derive(Debug, Args)]
pub struct DoctorCommand {
    /// Show suggestions for fixing issues
    #[arg(long)]
    pub fix: bool,
}

/// Result of a single check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: Option<String>,
    pub fix_suggestion: Option<String>,
}

/// Status of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

/// Summary of all checks
#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub checks: Vec<CheckResult>,
    pub ok_count: usize,
    pub warn_count: usize,
    pub fail_count: usize,
}

impl DoctorSummary {
    fn new(checks: Vec<CheckResult>) -> Self {
        let count = |status| checks.iter().filter(|c| c.status == status).count();
        Self {
            ok_count: count(CheckStatus::Ok),
            warn_count: count(CheckStatus::Warn),
            fail_count: count(CheckStatus::Fail),
            checks,
        }
    }
}

impl DoctorCommand {
    /// Execute the doctor command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(fix = self.fix, "executing doctor command");

        if cli.text_output() {
            println!("{}", style("Checking node...").bold());
            println!();
        }

        let mut checks = Vec::new();
        let config = match cli.load_config() {
            Ok((config, path)) => {
                checks.push(check_config(&config, path.as_deref()));
                config
            }
            Err(e) => {
                checks.push(CheckResult {
                    name: "Configuration".to_string(),
                    status: CheckStatus::Fail,
                    message: Some(format!("{:#}", e)),
                    fix_suggestion: Some("Fix the file or run 'farmgate init --force'".to_string()),
                });
                Config::default()
            }
        };

        checks.push(check_tool(
            "repo",
            "repo",
            "Install the repo launcher from https://gerrit.googlesource.com/git-repo",
        ));
        checks.push(check_tool("Git", "git", "Install Git from https://git-scm.com"));
        checks.push(check_tool(
            "Python",
            &config.runner.python,
            "Install Python 3 with the venv module or set runner.python",
        ));

        let summary = DoctorSummary::new(checks);

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    print_results(&summary.checks);
                    print_summary(&summary);
                }
                if self.fix && (summary.fail_count > 0 || summary.warn_count > 0) {
                    println!();
                    println!("{}", style("Suggested fixes:").bold());
                    for check in summary.checks.iter().filter(|c| c.status != CheckStatus::Ok) {
                        if let Some(ref fix) = check.fix_suggestion {
                            println!(
                                "  {} {}: {}",
                                status_icon(check.status),
                                style(&check.name).bold(),
                                fix
                            );
                        }
                    }
                }
            }
        }

        if summary.fail_count > 0 {
            anyhow::bail!("{} check(s) failed", summary.fail_count);
        }

        Ok(())
    }
}

fn check_config(config: &Config, path: Option<&std::path::Path>) -> CheckResult {
    let name = "Configuration".to_string();
    if let Err(e) = validate_config(config) {
        return CheckResult {
            name,
            status: CheckStatus::Fail,
            message: Some(e.to_string()),
            fix_suggestion: None,
        };
    }
    match (path, &config.manifest.url) {
        (None, _) => CheckResult {
            name,
            status: CheckStatus::Warn,
            message: Some("no configuration file, using defaults".to_string()),
            fix_suggestion: Some("Run 'farmgate init'".to_string()),
        },
        (Some(path), None) => CheckResult {
            name,
            status: CheckStatus::Warn,
            message: Some(format!("{} has no manifest.url", path.display())),
            fix_suggestion: Some("Set manifest.url or pass --manifest-url to 'farmgate run'".to_string()),
        },
        (Some(path), Some(_)) => CheckResult {
            name,
            status: CheckStatus::Ok,
            message: Some(path.display().to_string()),
            fix_suggestion: None,
        },
    }
}

fn check_tool(name: &str, binary: &str, fix: &str) -> CheckResult {
    match which::which(binary) {
        Ok(path) => {
            let message = get_command_version(binary)
                .unwrap_or_else(|| path.display().to_string());
            CheckResult {
                name: name.to_string(),
                status: CheckStatus::Ok,
                message: Some(message),
                fix_suggestion: None,
            }
        }
        Err(_) => CheckResult {
            name: name.to_string(),
            status: CheckStatus::Fail,
            message: Some(format!("'{}' not found on PATH", binary)),
            fix_suggestion: Some(fix.to_string()),
        },
    }
}

fn print_results(checks: &[CheckResult]) {
    for check in checks {
        let icon = status_icon(check.status);
        let msg = check.message.as_deref().unwrap_or("");
        let name = match check.status {
            CheckStatus::Ok => style(&check.name).green(),
            CheckStatus::Warn => style(&check.name).yellow(),
            CheckStatus::Fail => style(&check.name).red(),
        };
        println!("  {} {} {}", icon, name, style(msg).dim());
    }
}

fn print_summary(summary: &DoctorSummary) {
    println!();
    if summary.fail_count == 0 && summary.warn_count == 0 {
        println!(
            "{} All {} checks passed!",
            style("✓").green().bold(),
            summary.ok_count
        );
    } else {
        println!(
            "Summary: {} ok, {} warnings, {} failed",
            style(summary.ok_count).green(),
            style(summary.warn_count).yellow(),
            style(summary.fail_count).red(),
        );
        println!(
            "{} Run '{}' for suggestions.",
            style("!").yellow().bold(),
            style("farmgate doctor --fix").cyan()
        );
    }
}

fn status_icon(status: CheckStatus) -> console::StyledObject<&'static str> {
    match status {
        CheckStatus::Ok => style("[OK]").green(),
        CheckStatus::Warn => style("[WARN]").yellow(),
        CheckStatus::Fail => style("[FAIL]").red(),
    }
}

/// First line of `<cmd> --version`
fn get_command_version(cmd: &str) -> Option<String> {
    Command::new(cmd)
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| {
            // Older pythons print their version on stderr
            let text = if o.stdout.is_empty() { o.stderr } else { o.stdout };
            String::from_utf8_lossy(&text)
                .lines()
                .next()
                .map(|l| l.trim().to_string())
        })
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_missing_tool_fails() {
        let check = check_tool("Ghost", "farmgate-no-such-binary", "install it");
        assert_eq!(check.status, CheckStatus::Fail);
        assert_eq!(check.fix_suggestion.as_deref(), Some("install it"));
    }

    #[test]
    fn test_config_checks() {
        let mut config = Config::default();
        assert_eq!(check_config(&config, None).status, CheckStatus::Warn);
        assert_eq!(
            check_config(&config, Some(Path::new("farmgate.yaml"))).status,
            CheckStatus::Warn
        );

        config.manifest.url = Some("https://review.example.com/manifest".to_string());
        assert_eq!(
            check_config(&config, Some(Path::new("farmgate.yaml"))).status,
            CheckStatus::Ok
        );

        config.runner.args.clear();
        assert_eq!(
            check_config(&config, Some(Path::new("farmgate.yaml"))).status,
            CheckStatus::Fail
        );
    }

    #[test]
    fn test_summary_counts() {
        let summary = DoctorSummary::new(vec![
            check_tool("Ghost", "farmgate-no-such-binary", ""),
            CheckResult {
                name: "x".to_string(),
                status: CheckStatus::Ok,
                message: None,
                fix_suggestion: None,
            },
        ]);
        assert_eq!(summary.ok_count, 1);
        assert_eq!(summary.fail_count, 1);
        assert_eq!(summary.warn_count, 0);
    }
}
