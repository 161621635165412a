//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::debug;

use farmgate_core::config::{load_config, load_config_or_default, WorkspaceConfig};
use farmgate_core::Config;

use commands::{
    CompletionsCommand, DoctorCommand, InitCommand, ReportCommand, RunCommand, SelectCommand,
};

/// farmgate - change-driven hardware-in-the-loop regression runner
#[derive(Debug, Parser)]
#[command(name = "farmgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (default: discovered from the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synchronize, select, execute and report one change
    Run(RunCommand),

    /// Print the test modules affected by a change
    Select(SelectCommand),

    /// Render a result file as review lines
    Report(ReportCommand),

    /// Check the node for required tools and a valid configuration
    Doctor(DoctorCommand),

    /// Write a default configuration file
    Init(InitCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

impl Cli {
    /// Execute the CLI command, returning the process exit code
    pub fn execute(self) -> anyhow::Result<i32> {
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)
                .with_context(|| format!("cannot enter {}", dir.display()))?;
        }

        match self.command {
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Select(ref cmd) => cmd.execute(&self).map(|_| crate::exit_codes::SUCCESS),
            Commands::Report(ref cmd) => cmd.execute(&self).map(|_| crate::exit_codes::SUCCESS),
            Commands::Doctor(ref cmd) => cmd.execute(&self).map(|_| crate::exit_codes::SUCCESS),
            Commands::Init(ref cmd) => cmd.execute(&self).map(|_| crate::exit_codes::SUCCESS),
            Commands::Completions(ref cmd) => {
                cmd.execute(&self).map(|_| crate::exit_codes::SUCCESS)
            }
        }
    }

    /// Whether styled text should be printed
    pub fn text_output(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }

    /// Load the explicit `--config` file, or discover one from the working directory
    pub fn load_config(&self) -> anyhow::Result<(Config, Option<PathBuf>)> {
        if let Some(path) = &self.config {
            let config = load_config(path)?;
            return Ok((config, Some(path.clone())));
        }
        let cwd = std::env::current_dir()?;
        Ok(load_config_or_default(&cwd)?)
    }

    /// Workspace layout with relative paths anchored at the working directory
    pub fn workspace(&self, config: &Config) -> anyhow::Result<WorkspaceConfig> {
        let cwd = std::env::current_dir()?;
        let workspace = anchor_workspace(&config.workspace, &cwd);
        debug!(root = %workspace.root.display(), "workspace anchored");
        Ok(workspace)
    }
}

fn anchor_workspace(workspace: &WorkspaceConfig, cwd: &Path) -> WorkspaceConfig {
    workspace.anchored(cwd)
}
