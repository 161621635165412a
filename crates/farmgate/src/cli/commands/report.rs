//! Report command - render a result file

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use farmgate_core::pipeline::ResultReporting;
use farmgate_testing::TsvReporter;

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Render a result file as review lines
#[derive(Debug, Args)]
pub struct ReportCommand {
    /// Result file written by the test runner
    pub result_file: PathBuf,

    /// Also print grade counts
    #[arg(long)]
    pub summary: bool,
}

impl ReportCommand {
    /// Execute the report command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(path = %self.result_file.display(), "executing report command");
        let reporter = TsvReporter::new();
        let records = reporter.parse(&self.result_file)?;
        let report = reporter.render(&records);

        match cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Text => {
                if self.summary && !cli.quiet {
                    println!("{}", output::header(&report.summary.to_string()));
                }
                for line in &report.lines {
                    println!("{}", line);
                }
            }
        }
        Ok(())
    }
}
