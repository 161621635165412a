//! Execution node capability contract
//!
//! Matching jobs to machines is the scheduler's job. The pipeline only
//! refuses to run when the node it landed on does not advertise every
//! label the run requires.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::config::NodeConfig;
use crate::error::NodeError;

/// Labels a node must carry for the run to proceed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRequirement {
    required: BTreeSet<String>,
}

impl NodeRequirement {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(config.required_labels.iter().cloned())
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    /// Check the labels the node advertises.
    ///
    /// A node that advertises nothing was placed by the scheduler and is trusted.
    pub fn check(&self, advertised: &[String]) -> Result<(), NodeError> {
        if self.required.is_empty() {
            return Ok(());
        }
        if advertised.is_empty() {
            warn!(
                required = ?self.required,
                "node advertises no labels, trusting scheduler placement"
            );
            return Ok(());
        }

        let have: BTreeSet<&str> = advertised.iter().map(String::as_str).collect();
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|label| !have.contains(label.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            debug!(labels = ?self.required, "node capabilities satisfied");
            Ok(())
        } else {
            Err(NodeError::MissingCapabilities { missing })
        }
    }
}

/// Split a label list as found in the node environment (comma or whitespace separated)
pub fn parse_labels(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Labels advertised through the environment variable named by `labels_env`
pub fn advertised_labels(config: &NodeConfig) -> Vec<String> {
    std::env::var(&config.labels_env)
        .map(|v| parse_labels(&v))
        .unwrap_or_default()
}
