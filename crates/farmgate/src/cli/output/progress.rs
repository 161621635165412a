//! Terminal progress for pipeline runs

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use farmgate_core::pipeline::{StageEvent, StageReporter};

/// [`StageReporter`] that drives a spinner and prints one line per stage
pub struct SpinnerReporter {
    bar: ProgressBar,
}

impl SpinnerReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl Default for SpinnerReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StageReporter for SpinnerReporter {
    fn report(&self, event: &StageEvent) {
        match event {
            StageEvent::RunStarted { run_id } => {
                self.bar
                    .println(format!("{} {}", style("Run").bold(), style(run_id).cyan()));
            }
            StageEvent::Started { stage } => {
                self.bar.set_message(format!("{stage}..."));
            }
            StageEvent::Completed { stage, duration } => {
                self.bar.println(format!(
                    "  {} {} {}",
                    style("✓").green().bold(),
                    stage,
                    style(format!("({:.1}s)", duration.as_secs_f64())).dim()
                ));
            }
            StageEvent::Failed { stage, error, .. } => {
                self.bar.println(format!(
                    "  {} {} {}",
                    style("✗").red().bold(),
                    stage,
                    style(error).red()
                ));
            }
            StageEvent::Warning { stage, message } => {
                self.bar.println(format!(
                    "  {} {} {}",
                    style("!").yellow().bold(),
                    stage,
                    message
                ));
            }
            StageEvent::Finished { .. } => {
                self.bar.finish_and_clear();
            }
        }
    }
}
