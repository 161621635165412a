//! Working copy status and reset

use git2::build::CheckoutBuilder;
use git2::ResetType;
use tracing::{debug, instrument};

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Modified, staged or untracked files
    pub fn modified_files(&self) -> Result<Vec<String>> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = self.repo.statuses(Some(&mut opts))?;
        let mut files = Vec::new();

        for entry in statuses.iter() {
            if let Some(path) = entry.path() {
                let status = entry.status();
                if status.is_wt_modified()
                    || status.is_index_modified()
                    || status.is_wt_new()
                    || status.is_index_new()
                    || status.is_wt_deleted()
                    || status.is_index_deleted()
                    || status.is_wt_renamed()
                    || status.is_index_renamed()
                    || status.is_wt_typechange()
                    || status.is_index_typechange()
                {
                    files.push(path.to_string());
                }
            }
        }

        Ok(files)
    }

    /// Hard reset to HEAD and remove untracked files
    #[instrument(skip(self), fields(path = %self.path().display()))]
    pub fn discard_local_changes(&self) -> Result<()> {
        let dirty = self.modified_files()?;
        if dirty.is_empty() {
            return Ok(());
        }
        let head = self.head_commit()?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo
            .reset(head.as_object(), ResetType::Hard, Some(&mut checkout))?;
        self.repo.checkout_head(Some(
            CheckoutBuilder::new()
                .force()
                .remove_untracked(true),
        ))?;
        self.remove_untracked()?;
        debug!(commit = %head.id(), files = dirty.len(), "local changes discarded");
        Ok(())
    }

    /// Delete untracked files and directories, leaving ignored ones alone
    fn remove_untracked(&self) -> Result<()> {
        let Some(workdir) = self.repo.workdir() else {
            return Ok(());
        };
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(false);
        let statuses = self.repo.statuses(Some(&mut opts))?;

        for entry in statuses.iter().filter(|e| e.status().is_wt_new()) {
            let Some(path) = entry.path() else { continue };
            let target = workdir.join(path);
            if target.is_dir() {
                std::fs::remove_dir_all(&target)?;
            } else {
                std::fs::remove_file(&target)?;
            }
            debug!(path, "untracked path removed");
        }
        Ok(())
    }
}
