//! Pending patch application: fetch, detach, rebase

use git2::{ErrorCode, Oid, Rebase, RebaseOptions, Signature};
use tracing::{debug, info, instrument, warn};

use crate::repository::{GitRepo, Result};
use farmgate_core::error::GitError;

/// Local reference the fetched change is stored under
pub const PENDING_REF: &str = "refs/farmgate/pending";

const COMMITTER_NAME: &str = "farmgate";
const COMMITTER_EMAIL: &str = "farmgate@localhost";

impl GitRepo {
    /// Fetch a review-system change reference and return its commit
    #[instrument(skip(self), fields(path = %self.path().display()))]
    pub fn fetch_change(&self, remote: &str, change_ref: &str) -> Result<Oid> {
        if let Ok(mut stale) = self.repo.find_reference(PENDING_REF) {
            stale.delete()?;
        }
        let refspec = format!("+{}:{}", change_ref, PENDING_REF);
        self.fetch(remote, &[&refspec])?;
        let oid = self
            .repo
            .refname_to_id(PENDING_REF)
            .map_err(|_| self.unknown_ref(change_ref))?;
        info!(change_ref, commit = %oid, "fetched change");
        Ok(oid)
    }

    /// Force-checkout a commit with a detached HEAD
    pub fn checkout_detached(&self, oid: Oid) -> Result<()> {
        self.repo.set_head_detached(oid)?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        self.repo.checkout_head(Some(&mut checkout))?;
        debug!(commit = %oid, "checked out detached HEAD");
        Ok(())
    }

    /// Rebase HEAD onto `upstream`; returns the rebased HEAD commit.
    ///
    /// A conflicting operation aborts the rebase and leaves the working copy
    /// where it was. Commits already present upstream are skipped.
    #[instrument(skip(self), fields(path = %self.path().display()))]
    pub fn rebase_onto(&self, upstream: &str) -> Result<Oid> {
        let upstream_id = self.resolve_commit(upstream)?;
        let upstream_commit = self.repo.find_annotated_commit(upstream_id)?;
        let signature = Signature::now(COMMITTER_NAME, COMMITTER_EMAIL)?;

        let mut opts = RebaseOptions::new();
        let mut rebase = self
            .repo
            .rebase(None, Some(&upstream_commit), None, Some(&mut opts))?;

        while let Some(op) = rebase.next() {
            if let Err(e) = op {
                abort_rebase(&mut rebase);
                return Err(match e.code() {
                    ErrorCode::Conflict | ErrorCode::MergeConflict | ErrorCode::Unmerged => {
                        GitError::RebaseConflict {
                            upstream: upstream.to_string(),
                            paths: Vec::new(),
                        }
                    }
                    _ => GitError::Git2(e),
                });
            }

            let index = self.repo.index()?;
            if index.has_conflicts() {
                let paths = conflicted_paths(&index);
                warn!(upstream, conflicts = ?paths, "rebase conflict, aborting");
                rebase.abort()?;
                return Err(GitError::RebaseConflict {
                    upstream: upstream.to_string(),
                    paths,
                });
            }

            match rebase.commit(None, &signature, None) {
                Ok(oid) => debug!(commit = %oid, "rebased commit"),
                Err(e) if e.code() == ErrorCode::Applied => {
                    debug!("commit already applied upstream, skipping");
                }
                Err(e) => {
                    abort_rebase(&mut rebase);
                    return Err(GitError::Git2(e));
                }
            }
        }

        rebase.finish(Some(&signature))?;
        let head = self.resolve_commit("HEAD")?;
        info!(upstream, head = %head, "rebase complete");
        Ok(head)
    }
}

/// Abort a rebase, logging rather than raising a failed abort
fn abort_rebase(rebase: &mut Rebase<'_>) {
    if let Err(e) = rebase.abort() {
        warn!(error = %e, "rebase abort failed, working copy may be mid-rebase");
    }
}

fn conflicted_paths(index: &git2::Index) -> Vec<String> {
    let mut paths: Vec<String> = match index.conflicts() {
        Ok(conflicts) => conflicts
            .filter_map(|c| c.ok())
            .filter_map(|c| c.our.or(c.their).or(c.ancestor))
            .map(|entry| String::from_utf8_lossy(&entry.path).into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    paths.sort();
    paths.dedup();
    paths
}
