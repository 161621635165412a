//! farmgate tasks - change detection and selective module execution
//!
//! Decides whether a synchronized workspace differs from its base at all,
//! and which overlay test modules a change reaches through the Python
//! import graph.

pub mod detector;
pub mod module_selection;
pub mod overlay;

pub use detector::GitChangeDetector;
pub use module_selection::{module_id, parse_imports, ModuleMap, ModuleSelector};
pub use overlay::resolve_overlay;
