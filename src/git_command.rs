use crate::changeset::FileStatus;
use crate::constants::{DEFAULT_CONTEXT, GIT_PROGRAM, GIT_TIMEOUT_SECS};
use crate::error::SourceError;
use crate::source::{ChangeSource, FetchedDiff, has_binary_marker};
use log::{debug, warn};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// change source that shells out to the `git` executable
#[derive(Debug, Clone)]
pub struct GitCommandSource {
    program: String,
    context_lines: u32,
    timeout: Duration,
}

impl Default for GitCommandSource {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCommandSource {
    pub fn new() -> Self {
        Self {
            program: GIT_PROGRAM.to_string(),
            context_lines: DEFAULT_CONTEXT,
            timeout: Duration::from_secs(GIT_TIMEOUT_SECS),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_context_lines(mut self, context_lines: u32) -> Self {
        self.context_lines = context_lines;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// staged entries with their status, in git's order, optionally limited to one path
    fn staged_entries(
        &self,
        repo: &Path,
        only: Option<&str>,
    ) -> Result<Vec<StatusEntry>, SourceError> {
        let pathspec = only.map(literal_pathspec);
        let mut args = vec!["diff", "--cached", "-M", "--name-status", "-z", "--no-color"];
        if let Some(pathspec) = &pathspec {
            args.extend(["--", pathspec.as_str()]);
        }
        let output = self.run(repo, &args)?;
        Ok(parse_name_status(&output.checked(repo)?))
    }

    fn has_staged_deletions(&self, repo: &Path) -> Result<bool, SourceError> {
        let output = self.run(
            repo,
            &["diff", "--cached", "--no-renames", "--diff-filter=D", "--name-only", "-z"],
        )?;
        Ok(!output.checked(repo)?.is_empty())
    }

    /// status entry for one staged path
    ///
    /// a path-limited query sees a rename target as an addition, so additions are
    /// looked up again in the full listing when a rename source could exist
    fn staged_entry(&self, repo: &Path, path: &str) -> Result<StatusEntry, SourceError> {
        let find = |entries: Vec<StatusEntry>| {
            entries
                .into_iter()
                .find(|entry| entry.path == path)
                .ok_or_else(|| SourceError::NotStaged(path.to_string()))
        };

        let entry = find(self.staged_entries(repo, Some(path))?)?;
        if entry.status != FileStatus::Added || !self.has_staged_deletions(repo)? {
            return Ok(entry);
        }
        find(self.staged_entries(repo, None)?)
    }

    /// run git in `repo` with a timeout, collecting its output
    fn run(&self, repo: &Path, args: &[&str]) -> Result<GitOutput, SourceError> {
        let repo_arg = repo.to_string_lossy();
        let mut words = vec![self.program.as_str(), "-C", &*repo_arg];
        words.extend_from_slice(args);
        let command = shlex::try_join(words.iter().copied()).unwrap_or_else(|_| words.join(" "));
        debug!("running {command}");

        let mut child = Command::new(&self.program)
            .arg("-C")
            .arg(repo)
            .args(args)
            .env("GIT_OPTIONAL_LOCKS", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // drain both pipes while waiting so a large diff cannot fill them
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => status,
            None => {
                if let Err(e) = child.kill() {
                    warn!("failed to kill timed out git process: {e}");
                }
                let _ = child.wait();
                return Err(SourceError::TimedOut {
                    command,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        Ok(GitOutput {
            command,
            status,
            stdout: collect(stdout)?,
            stderr: collect(stderr)?,
        })
    }
}

impl ChangeSource for GitCommandSource {
    fn list_staged_paths(&self, repo: &Path) -> Result<Vec<String>, SourceError> {
        Ok(self
            .staged_entries(repo, None)?
            .into_iter()
            .map(|entry| entry.path)
            .collect())
    }

    fn fetch_diff(&self, repo: &Path, path: &str) -> Result<FetchedDiff, SourceError> {
        let entry = self.staged_entry(repo, path)?;

        // a rename only pairs up when both sides are inside the pathspec
        let mut pathspecs = vec![literal_pathspec(&entry.path)];
        if let Some(old_path) = &entry.renamed_from {
            pathspecs.push(literal_pathspec(old_path));
        }

        let context = format!("-U{}", self.context_lines);
        let mut args = vec![
            "diff",
            "--cached",
            "-M",
            "--no-color",
            "--no-ext-diff",
            context.as_str(),
            "--",
        ];
        args.extend(pathspecs.iter().map(String::as_str));

        let output = self.run(repo, &args)?.checked(repo)?;
        let text = String::from_utf8_lossy(&output).into_owned();

        if has_binary_marker(&text) {
            return Ok(FetchedDiff::binary(entry.renamed_from));
        }

        Ok(FetchedDiff {
            text,
            status: entry.status,
            renamed_from: entry.renamed_from,
        })
    }

    fn current_branch(&self, repo: &Path) -> Result<Option<String>, SourceError> {
        let output = self.run(repo, &["symbolic-ref", "--quiet", "--short", "HEAD"])?;

        // exit status 1 means HEAD is not a symbolic ref (detached)
        if output.status.code() == Some(1) {
            return Ok(None);
        }

        let stdout = output.checked(repo)?;
        let branch = String::from_utf8_lossy(&stdout).trim().to_string();
        Ok((!branch.is_empty()).then_some(branch))
    }
}

struct GitOutput {
    command: String,
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl GitOutput {
    /// stdout of a successful run, or the failure mapped to a source error
    fn checked(self, repo: &Path) -> Result<Vec<u8>, SourceError> {
        if self.status.success() {
            return Ok(self.stdout);
        }

        let stderr = String::from_utf8_lossy(&self.stderr).trim().to_string();
        if stderr.contains("not a git repository") || stderr.contains("cannot change to") {
            return Err(SourceError::RepositoryNotFound {
                path: repo.to_path_buf(),
                reason: stderr,
            });
        }

        Err(SourceError::CommandFailed {
            command: self.command,
            status: self.status.to_string(),
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> io::Result<Vec<u8>> {
    match handle {
        Some(handle) => handle
            .join()
            .map_err(|_| io::Error::other("git output reader panicked"))?,
        None => Ok(Vec::new()),
    }
}

/// pathspec matching exactly `path`, relative to the top of the work tree
fn literal_pathspec(path: &str) -> String {
    format!(":(top,literal){path}")
}

#[derive(Debug, PartialEq, Eq)]
struct StatusEntry {
    status: FileStatus,
    path: String,
    renamed_from: Option<String>,
}

/// parse `git diff --name-status -z` output
///
/// records are NUL separated: a status code followed by one path, or by the
/// source and destination paths for renames and copies
fn parse_name_status(output: &[u8]) -> Vec<StatusEntry> {
    // nothing staged: no records, not one empty record
    if output.is_empty() {
        return Vec::new();
    }

    let text = String::from_utf8_lossy(output);
    // the final terminator yields an empty field, never a path
    let mut fields = text.split('\0');
    let mut next_field = move || fields.next().filter(|field| !field.is_empty());
    let mut entries = Vec::new();

    while let Some(code) = next_field() {
        let Some(kind) = code.chars().next() else {
            continue;
        };

        if matches!(kind, 'R' | 'C') {
            let (Some(from), Some(to)) = (next_field(), next_field()) else {
                warn!("incomplete {code} record in git output");
                break;
            };
            let (status, renamed_from) = if kind == 'R' {
                (FileStatus::Renamed, Some(from.to_string()))
            } else {
                (FileStatus::Added, None)
            };
            entries.push(StatusEntry {
                status,
                path: to.to_string(),
                renamed_from,
            });
            continue;
        }

        let Some(path) = next_field() else {
            warn!("incomplete {code} record in git output");
            break;
        };
        let status = match kind {
            'A' => FileStatus::Added,
            'M' | 'T' => FileStatus::Modified,
            'D' => FileStatus::Deleted,
            _ => {
                debug!("skipping {code} entry for {path}");
                continue;
            }
        };
        entries.push(StatusEntry {
            status,
            path: path.to_string(),
            renamed_from: None,
        });
    }

    entries
}
