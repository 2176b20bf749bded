use crate::changeset::FileStatus;
use crate::error::SourceError;
use crate::git::Git2Source;
use crate::git_command::GitCommandSource;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// diff of one staged file as returned by a change source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDiff {
    pub text: String,
    pub status: FileStatus,
    pub renamed_from: Option<String>,
}

impl FetchedDiff {
    pub fn binary(renamed_from: Option<String>) -> Self {
        Self {
            text: String::new(),
            status: FileStatus::Binary,
            renamed_from,
        }
    }
}

/// read-only access to the staging area of a repository
///
/// implementations hold no repository state between calls, every call
/// reopens the repository named by `repo`
pub trait ChangeSource: Send + Sync {
    /// paths with staged changes, in the collaborator's own order
    fn list_staged_paths(&self, repo: &Path) -> Result<Vec<String>, SourceError>;

    /// diff of one listed path against HEAD
    fn fetch_diff(&self, repo: &Path, path: &str) -> Result<FetchedDiff, SourceError>;

    /// checked-out branch, `None` for a detached HEAD
    fn current_branch(&self, repo: &Path) -> Result<Option<String>, SourceError>;
}

/// which collaborator answers staging-area queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// in-process libgit2
    #[default]
    Libgit2,
    /// the `git` executable
    Git,
}

impl Backend {
    pub fn build(
        self,
        context_lines: u32,
        git_program: &str,
        git_timeout: Duration,
    ) -> Arc<dyn ChangeSource> {
        match self {
            Backend::Libgit2 => Arc::new(Git2Source::new().with_context_lines(context_lines)),
            Backend::Git => Arc::new(
                GitCommandSource::new()
                    .with_program(git_program)
                    .with_context_lines(context_lines)
                    .with_timeout(git_timeout),
            ),
        }
    }
}

/// check a rendered patch for git's binary markers
pub fn has_binary_marker(patch: &str) -> bool {
    patch.lines().any(|line| {
        (line.starts_with("Binary files ") && line.ends_with(" differ"))
            || line == "GIT binary patch"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_marker_detected() {
        let patch = "diff --git a/logo.png b/logo.png\n\
                     new file mode 100644\n\
                     index 0000000..e69de29\n\
                     Binary files /dev/null and b/logo.png differ\n";
        assert!(has_binary_marker(patch));
        assert!(has_binary_marker("diff --git a/x b/x\nGIT binary patch\nliteral 8\n"));
    }

    #[test]
    fn test_text_patch_is_not_binary() {
        let patch = "diff --git a/notes.txt b/notes.txt\n\
                     --- a/notes.txt\n\
                     +++ b/notes.txt\n\
                     @@ -1 +1 @@\n\
                     -Binary files are fun\n\
                     +Binary files a and b differ in size\n";
        assert!(!has_binary_marker(patch));
    }
}
