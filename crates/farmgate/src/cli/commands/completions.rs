//! Shell completion scripts for farmgate

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use tracing::info;

use crate::cli::Cli;

/// Print or install a completion script
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Target shell; taken from $SHELL when omitted
    #[arg(value_enum)]
    pub shell: Option<Shell>,

    /// Write the script to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Completion script for `shell`
pub(crate) fn script(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut buf = Vec::new();
    generate(shell, &mut cmd, name, &mut buf);
    buf
}

impl CompletionsCommand {
    fn shell(&self) -> anyhow::Result<Shell> {
        self.shell
            .or_else(Shell::from_env)
            .context("cannot detect the shell from $SHELL, pass one explicitly")
    }

    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let shell = self.shell()?;
        info!(%shell, "generating completions");
        let script = script(shell);

        let Some(path) = &self.output else {
            std::io::stdout().write_all(&script)?;
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        std::fs::write(path, &script)
            .with_context(|| format!("cannot write {}", path.display()))?;
        if !cli.quiet {
            println!("{} completions written to {}", shell, path.display());
        }
        Ok(())
    }
}
