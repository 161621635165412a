//! Init command

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::info;

use farmgate_core::config::{DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML};
use farmgate_core::Config;

use crate::cli::Cli;

/// Write a default configuration file
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Write TOML instead of YAML
    #[arg(long)]
    pub toml: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, toml = self.toml, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self.config_path(&cwd);

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists at {}. Use --force to overwrite.",
                config_path.display()
            );
        }

        let content = if self.toml {
            toml::to_string_pretty(&Config::default())?
        } else {
            DEFAULT_CONFIG_TEMPLATE.to_string()
        };
        std::fs::write(&config_path, &content)?;

        if !cli.quiet {
            println!(
                "{} Created configuration at {}",
                style("✓").green().bold(),
                style(config_path.display()).cyan()
            );
            println!();
            println!("Next steps:");
            println!("  1. Set manifest.url in {}", config_path.display());
            println!("  2. Run {} to verify the node", style("farmgate doctor").cyan());
            println!(
                "  3. Run {} to test a change",
                style("farmgate run --board <board> --overlay <overlay>").cyan()
            );
        }

        Ok(())
    }

    fn config_path(&self, cwd: &Path) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None if self.toml => cwd.join(DEFAULT_CONFIG_TOML),
            None => cwd.join(DEFAULT_CONFIG_YAML),
        }
    }
}
