//! farmgate testing - execution, reporting and artifacts
//!
//! Provides the stage implementations that touch the test runner: the
//! isolated-environment [`TestExecutor`], the tab separated [`TsvReporter`]
//! and the [`ArtifactManager`] that archives results and releases the
//! workspace on every exit path.

pub mod artifacts;
pub mod executor;
pub mod process;
pub mod report;

pub use artifacts::{ArchiveManifest, ArchivedFile, ArtifactManager};
pub use executor::{TestExecutor, RUNNER_LOG};
pub use report::{load_records, parse_rendered, render_line, TsvReporter};
