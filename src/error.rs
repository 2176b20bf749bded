use std::path::PathBuf;
use thiserror::Error;

/// failure reported by a change source (libgit2 or the git binary)
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("not a git repository: {}: {reason}", path.display())]
    RepositoryNotFound { path: PathBuf, reason: String },

    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` did not finish within {secs}s")]
    TimedOut { command: String, secs: u64 },

    #[error("{0} is not staged")]
    NotStaged(String),
}

impl SourceError {
    pub fn is_repository_not_found(&self) -> bool {
        matches!(self, SourceError::RepositoryNotFound { .. })
    }
}

/// failure that aborts a whole collection, no change set is produced
#[derive(Error, Debug)]
pub enum CollectError {
    #[error(transparent)]
    RepositoryNotFound(SourceError),

    #[error("failed to list staged files")]
    ListingFailed(#[source] SourceError),

    #[error("failed to fetch diff for {path}")]
    DiffFetchFailed {
        path: String,
        #[source]
        source: SourceError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to start diff worker")]
    Worker(#[source] std::io::Error),
}

impl CollectError {
    /// map a listing failure into the fatal taxonomy
    pub fn from_listing(err: SourceError) -> Self {
        if err.is_repository_not_found() {
            CollectError::RepositoryNotFound(err)
        } else {
            CollectError::ListingFailed(err)
        }
    }
}
