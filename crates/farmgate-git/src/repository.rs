//! Git repository operations

use std::path::{Path, PathBuf};

use git2::{Oid, Repository};
use tracing::{debug, instrument};

use farmgate_core::error::GitError;

/// Result type for git operations
pub type Result<T> = std::result::Result<T, GitError>;

/// Git repository wrapper
pub struct GitRepo {
    pub(crate) repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open a repository at the given path
    #[instrument(fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "opening git repository");
        let repo = Repository::open(path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RepositoryNotFound(path.to_path_buf())
            } else {
                GitError::OpenFailed(e.to_string())
            }
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            repo,
        })
    }

    /// Discover and open a repository by searching parent directories
    #[instrument(fields(start_path = %start_path.display()))]
    pub fn discover(start_path: &Path) -> Result<Self> {
        debug!(start_path = %start_path.display(), "discovering git repository");
        let repo = Repository::discover(start_path).map_err(|e| {
            if e.code() == git2::ErrorCode::NotFound {
                GitError::RepositoryNotFound(start_path.to_path_buf())
            } else {
                GitError::OpenFailed(e.to_string())
            }
        })?;

        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();

        Ok(Self { repo, path })
    }

    /// Get the repository path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the HEAD commit
    pub fn head_commit(&self) -> Result<git2::Commit<'_>> {
        let head = self.repo.head().map_err(GitError::Git2)?;
        head.peel_to_commit().map_err(GitError::Git2)
    }

    /// Hash of the HEAD commit
    pub fn head_id(&self) -> Result<String> {
        Ok(self.head_commit()?.id().to_string())
    }

    /// Resolve a revision (branch, remote ref, hash, `HEAD`) to a commit id
    pub fn resolve_commit(&self, spec: &str) -> Result<Oid> {
        let object = self
            .repo
            .revparse_single(spec)
            .map_err(|_| self.unknown_ref(spec))?;
        let commit = object.peel_to_commit().map_err(|_| self.unknown_ref(spec))?;
        Ok(commit.id())
    }

    pub(crate) fn unknown_ref(&self, spec: &str) -> GitError {
        GitError::UnknownRef {
            repo: self.path.display().to_string(),
            reference: spec.to_string(),
        }
    }
}
