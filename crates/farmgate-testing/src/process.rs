//! Child process helpers

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use farmgate_core::error::ExecutionError;

/// Lines of stderr kept in error messages
const STDERR_TAIL: usize = 20;

/// Render a command line for logs and error messages
pub fn display_command<S: AsRef<OsStr>>(program: impl AsRef<OsStr>, args: &[S]) -> String {
    std::iter::once(program.as_ref())
        .chain(args.iter().map(AsRef::as_ref))
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Directory holding executables of an isolated environment
pub fn bin_dir(venv: &Path) -> PathBuf {
    if cfg!(windows) {
        venv.join("Scripts")
    } else {
        venv.join("bin")
    }
}

/// Build a command whose child dies with the handle
pub(crate) fn command<S: AsRef<OsStr>>(program: impl AsRef<OsStr>, args: &[S], cwd: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// Run to completion capturing stdout and stderr
pub(crate) async fn output(mut cmd: Command, command_line: &str) -> Result<Output, ExecutionError> {
    debug!(command = command_line, "running");
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.output().await.map_err(|e| ExecutionError::Spawn {
        command: command_line.to_string(),
        reason: e.to_string(),
    })
}

/// Last lines of stderr, or the exit status when stderr is empty
pub(crate) fn failure_reason(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return format!("exited with {}", output.status);
    }
    lines[lines.len().saturating_sub(STDERR_TAIL)..].join("\n")
}

/// Wait for a child, killing it once the optional budget is spent
pub(crate) async fn wait(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, ExecutionError> {
    let Some(limit) = timeout else {
        return Ok(child.wait().await?);
    };

    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            warn!(seconds = limit.as_secs(), "runner timed out, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill runner");
            }
            Err(ExecutionError::Timeout {
                seconds: limit.as_secs(),
            })
        }
    }
}
