//! Output formatting utilities

mod progress;

pub use progress::SpinnerReporter;

use console::{style, Style};

use farmgate_core::{Outcome, PipelineResult};

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), message);
}

/// Create a styled header
pub fn header(text: &str) -> String {
    style(text).bold().to_string()
}

/// Create a styled key-value line
pub fn key_value(key: &str, value: &str) -> String {
    format!("  {}: {}", style(key).dim(), value)
}

/// Style for paths
pub fn path_style() -> Style {
    Style::new().cyan()
}

/// Print the terminal outcome of a run with its report
pub fn print_result(result: &PipelineResult) {
    println!();
    match &result.outcome {
        Outcome::NoOp { summary } => {
            success(&format!(
                "{} - no effective change ({} files, +{} -{})",
                style("NO_OP").green().bold(),
                summary.file_count,
                summary.insertions,
                summary.deletions
            ));
        }
        Outcome::Completed { report } => {
            let label = if report.summary.has_failures() {
                style("COMPLETED").yellow().bold()
            } else {
                style("COMPLETED").green().bold()
            };
            success(&format!("{} - {}", label, report.summary));
            for annotation in &report.annotations {
                warning(annotation);
            }
            if !report.lines.is_empty() {
                println!();
                println!("{}", report.body());
            }
        }
        Outcome::Failed { stage, reason } => {
            error(&format!(
                "{} in {} - {}",
                style("FAILED").red().bold(),
                style(stage).bold(),
                reason
            ));
        }
    }

    println!();
    if let Some(selection) = &result.selection {
        println!("{}", key_value("Modules", &selection.len().to_string()));
    }
    if let Some(dir) = &result.finalize.archive_dir {
        println!(
            "{}",
            key_value("Archive", &path_style().apply_to(dir.display()).to_string())
        );
    }
    if let Some(err) = &result.finalize.archive_error {
        warning(&format!("archive failed: {}", err));
    }
    for err in &result.finalize.cleanup_errors {
        warning(&format!("cleanup failed: {}", err));
    }
    println!(
        "{}",
        key_value("Duration", &format!("{:.1}s", result.duration_ms as f64 / 1000.0))
    );
}
