//! Tree-to-tree diffs

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, instrument};

use crate::repository::{GitRepo, Result};

impl GitRepo {
    /// Files touched between two revisions, relative to the repository root.
    ///
    /// Both sides of renames are reported; deleted files are included.
    #[instrument(skip(self), fields(path = %self.path().display()))]
    pub fn changed_files(&self, base: &str, head: &str) -> Result<BTreeSet<PathBuf>> {
        let base_tree = self.repo.find_commit(self.resolve_commit(base)?)?.tree()?;
        let head_tree = self.repo.find_commit(self.resolve_commit(head)?)?.tree()?;

        let mut opts = git2::DiffOptions::new();
        opts.include_typechange(true);
        let mut diff =
            self.repo
                .diff_tree_to_tree(Some(&base_tree), Some(&head_tree), Some(&mut opts))?;
        diff.find_similar(None)?;

        let mut files = BTreeSet::new();
        for delta in diff.deltas() {
            if let Some(p) = delta.old_file().path() {
                files.insert(p.to_path_buf());
            }
            if let Some(p) = delta.new_file().path() {
                files.insert(p.to_path_buf());
            }
        }

        debug!(base, head, count = files.len(), "changed files");
        Ok(files)
    }
}
