use crate::cancel::CancelToken;
use crate::changeset::{FileDiff, FileError, StagedChangeSet};
use crate::constants::{CANCEL_POLL_INTERVAL_MS, DEFAULT_FETCH_WORKERS, DEFAULT_MAX_DIFF_BYTES};
use crate::error::{CollectError, SourceError};
use crate::source::{ChangeSource, FetchedDiff};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// what to do when one file's diff cannot be fetched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FileErrorPolicy {
    /// fail the whole collection
    AbortAll,
    /// leave the file out and report it in the error list
    #[default]
    SkipFile,
    /// report it in the error list and keep an `unreadable` entry in its place
    RecordError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectOptions {
    /// per-file diff cap, `None` for no cap
    pub max_diff_bytes: Option<usize>,
    pub on_file_error: FileErrorPolicy,
    /// upper bound on concurrent fetches
    pub jobs: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            max_diff_bytes: Some(DEFAULT_MAX_DIFF_BYTES),
            on_file_error: FileErrorPolicy::default(),
            jobs: DEFAULT_FETCH_WORKERS,
        }
    }
}

/// result of a successful collection: the change set plus per-file failures
#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    pub changes: StagedChangeSet,
    pub errors: Vec<FileError>,
}

impl CollectReport {
    /// nothing staged and nothing failed
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty() && self.errors.is_empty()
    }

    /// some files could not be read
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

type FetchResult = Result<FetchedDiff, SourceError>;

/// builds a `StagedChangeSet` from a change source
pub struct Collector {
    source: Arc<dyn ChangeSource>,
    options: CollectOptions,
}

impl Collector {
    pub fn new(source: Arc<dyn ChangeSource>, options: CollectOptions) -> Self {
        Self { source, options }
    }

    /// list staged files, fetch their diffs concurrently and assemble them in listing order
    pub fn collect(&self, repo: &Path, cancel: &CancelToken) -> Result<CollectReport, CollectError> {
        if cancel.is_cancelled() {
            return Err(CollectError::Cancelled);
        }

        let listed = self
            .source
            .list_staged_paths(repo)
            .map_err(CollectError::from_listing)?;
        let paths = unique_paths(listed);

        if paths.is_empty() {
            debug!("nothing staged in {}", repo.display());
            return Ok(CollectReport {
                changes: StagedChangeSet::empty(repo.to_path_buf()),
                errors: Vec::new(),
            });
        }

        let results = self.fetch_all(repo, paths.clone(), cancel)?;
        self.assemble(repo, paths, results)
    }

    /// fetch every path on a bounded pool of worker threads
    ///
    /// returns one result per path, indexed like `paths`
    fn fetch_all(
        &self,
        repo: &Path,
        paths: Vec<String>,
        cancel: &CancelToken,
    ) -> Result<Vec<FetchResult>, CollectError> {
        let total = paths.len();
        let workers = self.options.jobs.clamp(1, total);
        debug!("fetching {total} diff(s) with {workers} worker(s)");

        let paths = Arc::new(paths);
        let next = Arc::new(AtomicUsize::new(0));
        let halt = HaltOnDrop(Arc::new(AtomicBool::new(false)));
        let (tx, rx) = mpsc::channel::<(usize, FetchResult)>();

        for id in 0..workers {
            let source = Arc::clone(&self.source);
            let paths = Arc::clone(&paths);
            let next = Arc::clone(&next);
            let stop = Arc::clone(&halt.0);
            let cancel = cancel.clone();
            let repo = repo.to_path_buf();
            let tx = tx.clone();

            thread::Builder::new()
                .name(format!("diff-fetch-{id}"))
                .spawn(move || {
                    while !stop.load(Ordering::SeqCst) && !cancel.is_cancelled() {
                        let idx = next.fetch_add(1, Ordering::SeqCst);
                        let Some(path) = paths.get(idx) else { break };

                        let started = Instant::now();
                        let result = source.fetch_diff(&repo, path);
                        debug!("fetched {path} in {:?}", started.elapsed());

                        if tx.send((idx, result)).is_err() {
                            break; // collector gave up
                        }
                    }
                })
                .map_err(CollectError::Worker)?;
        }
        drop(tx);

        let mut slots: Vec<Option<FetchResult>> = (0..total).map(|_| None).collect();
        let mut remaining = total;
        let poll = Duration::from_millis(CANCEL_POLL_INTERVAL_MS);

        while remaining > 0 {
            if cancel.is_cancelled() {
                // in-flight fetches are abandoned, `halt` stops the rest
                return Err(CollectError::Cancelled);
            }
            match rx.recv_timeout(poll) {
                Ok((idx, result)) => {
                    if self.options.on_file_error == FileErrorPolicy::AbortAll
                        && let Err(source) = result
                    {
                        return Err(CollectError::DiffFetchFailed {
                            path: paths[idx].clone(),
                            source,
                        });
                    }
                    slots[idx] = Some(result);
                    remaining -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // every worker exited with paths still outstanding (a fetch panicked)
        Ok(slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(SourceError::Io(std::io::Error::other(
                        "diff worker exited before reporting",
                    )))
                })
            })
            .collect())
    }

    /// turn fetch results into the change set, applying the file error policy
    fn assemble(
        &self,
        repo: &Path,
        paths: Vec<String>,
        results: Vec<FetchResult>,
    ) -> Result<CollectReport, CollectError> {
        let mut files = Vec::with_capacity(paths.len());
        let mut errors = Vec::new();

        for (path, result) in paths.into_iter().zip(results) {
            match result {
                Ok(fetched) => files.push(FileDiff::new(
                    path,
                    fetched.status,
                    fetched.text,
                    fetched.renamed_from,
                    self.options.max_diff_bytes,
                )),
                Err(source) => match self.options.on_file_error {
                    FileErrorPolicy::AbortAll => {
                        return Err(CollectError::DiffFetchFailed { path, source });
                    }
                    FileErrorPolicy::SkipFile => {
                        warn!("skipping {path}: {source}");
                        errors.push(FileError {
                            path,
                            reason: source.to_string(),
                        });
                    }
                    FileErrorPolicy::RecordError => {
                        errors.push(FileError {
                            path: path.clone(),
                            reason: source.to_string(),
                        });
                        files.push(FileDiff::unreadable(path));
                    }
                },
            }
        }

        Ok(CollectReport {
            changes: StagedChangeSet::new(repo.to_path_buf(), files),
            errors,
        })
    }
}

/// drop empty entries and repeated paths, keeping first occurrences in order
fn unique_paths(listed: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(listed.len());
    let mut paths = Vec::with_capacity(listed.len());

    for path in listed {
        if path.is_empty() {
            warn!("ignoring empty path in staged listing");
        } else if seen.contains(&path) {
            warn!("{path} listed more than once, keeping the first entry");
        } else {
            seen.insert(path.clone());
            paths.push(path);
        }
    }

    paths
}

/// tells workers to stop picking up paths once the collector returns
struct HaltOnDrop(Arc<AtomicBool>);

impl Drop for HaltOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
