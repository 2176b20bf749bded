use serde::Serialize;
use std::path::{Path, PathBuf};

/// change type of a staged file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Binary,
    /// the diff could not be fetched (only produced under the record-error policy)
    Unreadable,
}

impl FileStatus {
    /// single character marker, as shown by `git status --short`
    pub fn as_char(self) -> char {
        match self {
            FileStatus::Added => 'A',
            FileStatus::Modified => 'M',
            FileStatus::Deleted => 'D',
            FileStatus::Renamed => 'R',
            FileStatus::Binary => 'B',
            FileStatus::Unreadable => '?',
        }
    }
}

/// one staged file and its diff against HEAD
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub status: FileStatus,
    pub diff_text: String,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>, // set for renames only
}

impl FileDiff {
    /// build an entry, cutting the diff to `max_bytes` if it is longer
    ///
    /// the cut lands on the last char boundary at or before `max_bytes`, so a
    /// multibyte character straddling the limit leaves the text a few bytes short
    /// of it rather than splitting the character
    pub fn new(
        path: String,
        status: FileStatus,
        mut diff_text: String,
        renamed_from: Option<String>,
        max_bytes: Option<usize>,
    ) -> Self {
        let truncated = match max_bytes {
            Some(max) => truncate_at_char_boundary(&mut diff_text, max),
            None => false,
        };
        let renamed_from = if status == FileStatus::Renamed {
            renamed_from
        } else {
            None
        };
        Self {
            path,
            status,
            diff_text,
            truncated,
            renamed_from,
        }
    }

    /// placeholder kept in position for a file whose diff could not be read
    pub fn unreadable(path: String) -> Self {
        Self {
            path,
            status: FileStatus::Unreadable,
            diff_text: String::new(),
            truncated: false,
            renamed_from: None,
        }
    }
}

/// cut `text` to at most `max` bytes without splitting a UTF-8 sequence
fn truncate_at_char_boundary(text: &mut String, max: usize) -> bool {
    if text.len() <= max {
        return false;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    true
}

/// snapshot of the staging area, in the order the files were listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedChangeSet {
    repository_path: PathBuf,
    files: Vec<FileDiff>,
}

impl StagedChangeSet {
    pub fn new(repository_path: PathBuf, files: Vec<FileDiff>) -> Self {
        debug_assert!(
            files
                .iter()
                .enumerate()
                .all(|(i, f)| files[..i].iter().all(|g| g.path != f.path)),
            "change set paths must be unique"
        );
        Self {
            repository_path,
            files,
        }
    }

    /// nothing is staged
    pub fn empty(repository_path: PathBuf) -> Self {
        Self::new(repository_path, Vec::new())
    }

    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    pub fn files(&self) -> &[FileDiff] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    /// combined size of all diff texts
    pub fn diff_bytes(&self) -> usize {
        self.files.iter().map(|f| f.diff_text.len()).sum()
    }
}

/// a file whose diff could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub path: String,
    pub reason: String,
}
