//! Select command - change detection without running anything

use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::info;

use farmgate_core::pipeline::{ChangeDetection, HEAD_REF};
use farmgate_core::FarmgateError;
use farmgate_tasks::GitChangeDetector;

use crate::cli::{Cli, OutputFormat};

/// Print the test modules affected by a change
#[derive(Debug, Args)]
pub struct SelectCommand {
    /// Base reference (default: manifest.base_ref)
    #[arg(long)]
    pub base: Option<String>,

    /// Head reference
    #[arg(long, default_value = HEAD_REF)]
    pub head: String,

    /// Environment overlay name
    #[arg(long, env = "FARMGATE_OVERLAY")]
    pub overlay: String,

    /// Workspace root to search (default: workspace.root)
    #[arg(long)]
    pub workspace: Option<PathBuf>,
}

impl SelectCommand {
    /// Execute the select command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(overlay = %self.overlay, head = %self.head, "executing select command");
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let (config, _) = cli.load_config()?;
        let base = self
            .base
            .clone()
            .unwrap_or_else(|| config.manifest.resolved_base_ref());
        let root = match &self.workspace {
            Some(root) => root.clone(),
            None => cli.workspace(&config)?.root,
        };

        let detector = GitChangeDetector::new(&config.selection).map_err(FarmgateError::from)?;
        let selection = detector
            .select_modules(&base, &self.head, &self.overlay, &root)
            .await
            .map_err(FarmgateError::from)?;

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&selection)?);
            }
            OutputFormat::Text if cli.quiet => {
                for id in selection.ids() {
                    println!("{}", id);
                }
            }
            OutputFormat::Text => {
                println!(
                    "{} {}..{} in {}",
                    style("Changes").bold(),
                    style(&base).yellow(),
                    style(&self.head).yellow(),
                    style(&self.overlay).cyan()
                );
                println!();
                if selection.is_empty() {
                    println!("  {}", style("no test modules affected").dim());
                }
                for module in &selection.modules {
                    println!(
                        "  {} {}",
                        style(&module.id).green(),
                        style(format!("({})", module.reason)).dim()
                    );
                }
                println!();
                println!("{} module(s) selected", selection.len());
            }
        }
        Ok(())
    }
}
