//! CLI commands

mod completions;
mod doctor;
mod init;
mod report;
mod run;
mod select;

pub use completions::CompletionsCommand;
pub use doctor::DoctorCommand;
pub use init::InitCommand;
pub use report::ReportCommand;
pub use run::RunCommand;
pub use select::SelectCommand;
