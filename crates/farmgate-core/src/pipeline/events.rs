//! Pipeline progress reporting

use std::sync::Mutex;
use std::time::Duration;

use super::outcome::Stage;

/// Events emitted while a run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    /// A run is starting
    RunStarted { run_id: String },
    /// A stage is starting
    Started { stage: Stage },
    /// A stage completed
    Completed { stage: Stage, duration: Duration },
    /// A stage aborted the run
    Failed {
        stage: Stage,
        duration: Duration,
        error: String,
    },
    /// A non-fatal problem worth surfacing
    Warning { stage: Stage, message: String },
    /// The run finished (after finalize)
    Finished {
        run_id: String,
        outcome: String,
        duration: Duration,
    },
}

/// Trait for reporting pipeline progress
pub trait StageReporter: Send + Sync {
    /// Handle a stage event
    fn report(&self, event: &StageEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl StageReporter for TracingReporter {
    fn report(&self, event: &StageEvent) {
        match event {
            StageEvent::RunStarted { run_id } => {
                tracing::info!(run_id = %run_id, "run started");
            }
            StageEvent::Started { stage } => {
                tracing::info!(stage = %stage, "stage started");
            }
            StageEvent::Completed { stage, duration } => {
                tracing::info!(
                    stage = %stage,
                    duration_ms = duration.as_millis() as u64,
                    "stage completed"
                );
            }
            StageEvent::Failed {
                stage,
                duration,
                error,
            } => {
                tracing::error!(
                    stage = %stage,
                    duration_ms = duration.as_millis() as u64,
                    error = %error,
                    "stage failed"
                );
            }
            StageEvent::Warning { stage, message } => {
                tracing::warn!(stage = %stage, "{}", message);
            }
            StageEvent::Finished {
                run_id,
                outcome,
                duration,
            } => {
                tracing::info!(
                    run_id = %run_id,
                    outcome = %outcome,
                    duration_ms = duration.as_millis() as u64,
                    "run finished"
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<StageEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<StageEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stages that were started, in order
    pub fn started_stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StageEvent::Started { stage } => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl StageReporter for CollectingReporter {
    fn report(&self, event: &StageEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
