//! farmgate git - workspace synchronization and git plumbing
//!
//! This crate wraps git2 for the operations the pipeline needs (reset,
//! fetch, detached checkout, rebase, tree diffs), adapts the external
//! multi-repository checkout tool, and parses `git diff --shortstat` into
//! typed statistics.

pub mod checkout;
mod diff;
pub mod patch;
mod remote;
mod repository;
pub mod shortstat;
mod status;
pub mod sync;

pub use checkout::{CheckoutTool, Project, RepoCli};
pub use repository::{GitRepo, Result};
pub use shortstat::{parse_shortstat, shortstat};
pub use sync::WorkspaceSynchronizer;
