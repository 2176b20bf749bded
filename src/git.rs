use crate::changeset::FileStatus;
use crate::constants::{DEFAULT_CONTEXT, RENAME_THRESHOLD};
use crate::error::SourceError;
use crate::source::{ChangeSource, FetchedDiff, has_binary_marker};
use git2::{Delta, DiffDelta, DiffFindOptions, DiffOptions, ErrorCode, Patch, Repository};
use log::{debug, warn};
use std::borrow::Cow;
use std::path::Path;

/// change source backed by libgit2
#[derive(Debug, Clone)]
pub struct Git2Source {
    context_lines: u32,
}

impl Default for Git2Source {
    fn default() -> Self {
        Self::new()
    }
}

impl Git2Source {
    pub fn new() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT,
        }
    }

    pub fn with_context_lines(mut self, context_lines: u32) -> Self {
        self.context_lines = context_lines;
        self
    }
}

impl ChangeSource for Git2Source {
    fn list_staged_paths(&self, repo_path: &Path) -> Result<Vec<String>, SourceError> {
        let repo = open(repo_path)?;
        let mut diff = create_staged_diff(&repo, self.context_lines, None)?;
        detect_renames(&mut diff)?;

        let mut paths = Vec::with_capacity(diff.deltas().len());
        for delta in diff.deltas() {
            if file_status(delta.status()).is_none() {
                debug!("skipping {:?} entry in staged diff", delta.status());
                continue;
            }
            if let Some(path) = delta_path(&delta) {
                let path = path.to_string_lossy();
                if let Cow::Owned(_) = path {
                    warn!("staged path is not valid UTF-8, listing it as {path}");
                }
                paths.push(path.into_owned());
            }
        }

        Ok(paths)
    }

    fn fetch_diff(&self, repo_path: &Path, path: &str) -> Result<FetchedDiff, SourceError> {
        let repo = open(repo_path)?;
        let narrow = create_staged_diff(&repo, self.context_lines, Some(path))?;

        // a diff limited to one path shows a rename target as an addition, so
        // additions go through rename detection when anything was deleted
        let maybe_renamed = narrow.deltas().any(|delta| delta.status() == Delta::Added);
        if maybe_renamed {
            let mut full = create_staged_diff(&repo, self.context_lines, None)?;
            if full.deltas().any(|delta| delta.status() == Delta::Deleted) {
                detect_renames(&mut full)?;
                return diff_for_path(&full, path);
            }
        }

        diff_for_path(&narrow, path)
    }

    fn current_branch(&self, repo_path: &Path) -> Result<Option<String>, SourceError> {
        let repo = open(repo_path)?;

        match repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None), // detached HEAD
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // no commits yet, HEAD still names the branch it will create
                let head = repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .map(|target| target.strip_prefix("refs/heads/").unwrap_or(target))
                    .map(str::to_string))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// open the repository containing `path`
fn open(path: &Path) -> Result<Repository, SourceError> {
    Repository::discover(path).map_err(|e| match e.code() {
        ErrorCode::NotFound => SourceError::RepositoryNotFound {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        },
        _ => SourceError::Git(e),
    })
}

/// build the fetched diff for `path` from a staged diff that contains it
fn diff_for_path(diff: &git2::Diff<'_>, path: &str) -> Result<FetchedDiff, SourceError> {
    let (idx, status, renamed_from, flagged_binary) = diff
        .deltas()
        .enumerate()
        .find_map(|(idx, delta)| {
            let status = file_status(delta.status())?;
            if delta_path(&delta)?.to_string_lossy() != path {
                return None;
            }
            let renamed_from = if status == FileStatus::Renamed {
                delta
                    .old_file()
                    .path()
                    .map(|p| p.to_string_lossy().into_owned())
            } else {
                None
            };
            Some((idx, status, renamed_from, is_binary(&delta)))
        })
        .ok_or_else(|| SourceError::NotStaged(path.to_string()))?;

    // `None` only for an unmodified delta, which was filtered out above
    let (text, patch_binary) = match Patch::from_diff(diff, idx)? {
        Some(mut patch) => {
            let binary = is_binary(&patch.delta());
            let buf = patch.to_buf()?;
            (String::from_utf8_lossy(&buf).into_owned(), binary)
        }
        None => (String::new(), false),
    };

    if flagged_binary || patch_binary || has_binary_marker(&text) {
        return Ok(FetchedDiff::binary(renamed_from));
    }

    Ok(FetchedDiff {
        text,
        status,
        renamed_from,
    })
}

/// create a diff object for staged changes, optionally limited to one exact path
fn create_staged_diff<'r>(
    repo: &'r Repository,
    context_lines: u32,
    only: Option<&str>,
) -> Result<git2::Diff<'r>, git2::Error> {
    // handle unborn branch (no commits yet) - compare against empty tree
    let tree = match repo.head() {
        Ok(head) => Some(head.peel_to_tree()?),
        Err(e) if e.code() == ErrorCode::UnbornBranch => None,
        Err(e) => return Err(e),
    };

    let mut opts = DiffOptions::new();
    opts.context_lines(context_lines);
    if let Some(path) = only {
        opts.pathspec(path).disable_pathspec_match(true);
    }
    repo.diff_tree_to_index(tree.as_ref(), None, Some(&mut opts))
}

/// pair deleted and added files into renames
fn detect_renames(diff: &mut git2::Diff<'_>) -> Result<(), git2::Error> {
    let mut find_opts = DiffFindOptions::new();
    find_opts.renames(true);
    find_opts.rename_threshold(RENAME_THRESHOLD);
    diff.find_similar(Some(&mut find_opts))
}

/// map a libgit2 delta status onto a staged file status
fn file_status(delta: Delta) -> Option<FileStatus> {
    match delta {
        Delta::Added | Delta::Copied => Some(FileStatus::Added),
        Delta::Modified | Delta::Typechange => Some(FileStatus::Modified),
        Delta::Deleted => Some(FileStatus::Deleted),
        Delta::Renamed => Some(FileStatus::Renamed),
        _ => None, // unmodified, ignored, untracked, conflicted
    }
}

/// path a delta is listed under: the old path for deletions, the new one otherwise
fn delta_path<'a>(delta: &DiffDelta<'a>) -> Option<&'a Path> {
    if delta.status() == Delta::Deleted {
        delta.old_file().path()
    } else {
        delta.new_file().path()
    }
}

fn is_binary(delta: &DiffDelta<'_>) -> bool {
    delta.flags().is_binary() || delta.old_file().is_binary() || delta.new_file().is_binary()
}
