//! Remote operations

use tracing::{info, instrument};

use crate::repository::{GitRepo, Result};
use farmgate_core::error::GitError;

impl GitRepo {
    /// Fetch refspecs from a remote
    #[instrument(skip(self), fields(remote = %remote_name))]
    pub fn fetch(&self, remote_name: &str, refspecs: &[&str]) -> Result<()> {
        let start = std::time::Instant::now();
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .map_err(|_| GitError::RemoteNotFound(remote_name.to_string()))?;

        remote
            .fetch(refspecs, None, None)
            .map_err(|e| GitError::FetchFailed {
                remote: remote_name.to_string(),
                refspec: refspecs.join(" "),
                reason: e.message().to_string(),
            })?;

        info!(
            remote = remote_name,
            duration_ms = start.elapsed().as_millis(),
            "fetched from remote"
        );
        Ok(())
    }
}
