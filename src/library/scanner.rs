//! Directory scanner that feeds the catalog.
//!
//! Walks a root directory recursively and catalogs every supported file
//! (pdf, epub, fb2) it has not seen before. Two policies differ from the
//! reader adapters on purpose:
//!
//! - **abort-on-error**: any walk error (permission denied, broken symlink,
//!   symlink loop) stops the scan and is returned. Files walked before the
//!   error stay cataloged.
//! - **skip-if-known**: a cataloged path is not extracted again unless its
//!   modification time changed (and stale refresh is enabled).
//!
//! An `.ignore` file directly inside the root lists child directory names
//! (one per line) whose subtrees are pruned.
//!
//! The root is canonicalized before walking, so every catalog key is an
//! absolute path without `.`/`..` segments. Files whose path is not valid
//! UTF-8 are skipped with a warning: the catalog keys paths by text.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use super::catalog::{CatalogStore, StoreError};
use super::metadata::{title_from_filename, BookMetadata, MetadataExtractor};
use crate::domain::{BookFormat, CatalogEntry};

/// Name of the ignore-list file inside a scan root
pub const IGNORE_FILE: &str = ".ignore";

/// Errors that abort a scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to resolve scan root {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read ignore file {path}: {source}")]
    IgnoreFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Scan tuning
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Files extracted concurrently (1 = strictly sequential)
    pub concurrency: usize,

    /// Re-extract cataloged files whose mtime changed
    pub refresh_stale: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            refresh_stale: true,
        }
    }
}

/// Result of a directory scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// New catalog entries
    pub added: usize,

    /// Existing entries re-extracted after an mtime change
    pub refreshed: usize,

    /// Supported files already cataloged and left alone
    pub unchanged: usize,

    /// Subtrees pruned by the ignore list
    pub ignored_dirs: usize,

    /// Supported files skipped because their path is not valid UTF-8
    pub skipped: usize,
}

impl ScanReport {
    pub fn total_books(&self) -> usize {
        self.added + self.refreshed + self.unchanged
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobKind {
    Add,
    Refresh,
}

/// A file waiting for extraction
#[derive(Debug)]
struct Job {
    path: PathBuf,
    format: BookFormat,
    mtime: Option<i64>,
    kind: JobKind,
}

/// Walks a directory tree and writes new books to the catalog
pub struct Scanner<'a> {
    store: &'a CatalogStore,
    extractor: &'a MetadataExtractor,
    options: ScanOptions,
}

impl<'a> Scanner<'a> {
    pub fn new(store: &'a CatalogStore, extractor: &'a MetadataExtractor) -> Self {
        Self {
            store,
            extractor,
            options: ScanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    /// Scan `root` recursively
    pub async fn scan(&self, root: &Path) -> Result<ScanReport, ScanError> {
        let root = canonical_root(root)?;
        let root = root.as_path();
        let ignored = read_ignore_list(root)?;
        let batch_size = self.options.concurrency.max(1);

        let mut report = ScanReport::default();
        let mut batch: Vec<Job> = Vec::with_capacity(batch_size);
        let mut pruned = 0usize;

        tracing::info!("Scanning {}", root.display());

        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| {
                let skip = is_ignored(entry, &ignored);
                if skip {
                    tracing::info!("Ignoring directory: {}", entry.path().display());
                    pruned += 1;
                }
                !skip
            });

        for entry in walker {
            let planned = entry
                .map_err(ScanError::from)
                .and_then(|entry| self.plan(&entry, &mut report));

            match planned {
                Ok(Some(job)) => {
                    batch.push(job);
                    if batch.len() >= batch_size {
                        self.flush(&mut batch, &mut report).await?;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.flush(&mut batch, &mut report).await?;
                    tracing::warn!("Scan of {} aborted: {}", root.display(), e);
                    return Err(e);
                }
            }
        }

        self.flush(&mut batch, &mut report).await?;
        report.ignored_dirs = pruned;

        tracing::info!(
            "Scan of {} complete: {} added, {} refreshed, {} unchanged, {} skipped",
            root.display(),
            report.added,
            report.refreshed,
            report.unchanged,
            report.skipped
        );

        Ok(report)
    }

    /// Decide what to do with one walk entry
    fn plan(&self, entry: &DirEntry, report: &mut ScanReport) -> Result<Option<Job>, ScanError> {
        if !entry.file_type().is_file() {
            return Ok(None);
        }

        let Some(format) = BookFormat::from_path(entry.path()) else {
            return Ok(None);
        };

        if entry.path().to_str().is_none() {
            tracing::warn!(
                "Skipping file with non-UTF-8 path: {}",
                entry.path().display()
            );
            report.skipped += 1;
            return Ok(None);
        }

        let path = entry.path().to_path_buf();
        let mtime = modified_secs(entry)?;

        if !self.store.exists(&path)? {
            return Ok(Some(Job {
                path,
                format,
                mtime,
                kind: JobKind::Add,
            }));
        }

        if self.options.refresh_stale && self.is_stale(&path, mtime)? {
            return Ok(Some(Job {
                path,
                format,
                mtime,
                kind: JobKind::Refresh,
            }));
        }

        tracing::debug!("Already cataloged: {}", path.display());
        report.unchanged += 1;
        Ok(None)
    }

    /// A row is stale only when both mtimes are known and differ
    fn is_stale(&self, path: &Path, mtime: Option<i64>) -> Result<bool, ScanError> {
        let stored = self.store.get(path)?.and_then(|entry| entry.mtime);
        Ok(matches!((stored, mtime), (Some(old), Some(new)) if old != new))
    }

    /// Extract every queued file concurrently, then write results in walk order
    async fn flush(&self, batch: &mut Vec<Job>, report: &mut ScanReport) -> Result<(), ScanError> {
        let jobs = std::mem::take(batch);

        let handles: Vec<_> = jobs
            .iter()
            .map(|job| {
                let extractor = self.extractor.clone();
                let path = job.path.clone();
                tokio::spawn(async move { extractor.extract(&path).await })
            })
            .collect();

        for (job, handle) in jobs.into_iter().zip(handles) {
            let metadata = match handle.await {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!("Extraction task for {} failed: {}", job.path.display(), e);
                    BookMetadata {
                        title: title_from_filename(&job.path),
                        author: String::new(),
                    }
                }
            };
            self.commit(job, metadata, report)?;
        }

        Ok(())
    }

    fn commit(&self, job: Job, metadata: BookMetadata, report: &mut ScanReport) -> Result<(), ScanError> {
        let author_info = if metadata.author.is_empty() {
            String::new()
        } else {
            format!(" by {}", metadata.author)
        };

        match job.kind {
            JobKind::Add => {
                let mut entry =
                    CatalogEntry::new(job.path, metadata.title, metadata.author, job.format);
                entry.mtime = job.mtime;

                match self.store.insert(&entry) {
                    Ok(()) => {
                        tracing::info!(
                            "Adding book({}): {}{} ({})",
                            entry.path.display(),
                            entry.title,
                            author_info,
                            entry.format
                        );
                        report.added += 1;
                    }
                    Err(StoreError::ConstraintViolation(path)) => {
                        tracing::debug!("Already cataloged, skipping: {}", path.display());
                        report.unchanged += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            JobKind::Refresh => {
                self.store
                    .update_metadata(&job.path, &metadata.title, &metadata.author, job.mtime)?;
                tracing::info!(
                    "Refreshing book({}): {}{} ({})",
                    job.path.display(),
                    metadata.title,
                    author_info,
                    job.format
                );
                report.refreshed += 1;
            }
        }

        Ok(())
    }
}

/// Read the root's ignore list. A missing file means nothing is ignored.
pub fn read_ignore_list(root: &Path) -> Result<HashSet<String>, ScanError> {
    let path = root.join(IGNORE_FILE);

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(ScanError::IgnoreFile { path, source: e }),
    };

    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Absolute, normalized root. A missing root fails here.
fn canonical_root(root: &Path) -> Result<PathBuf, ScanError> {
    std::fs::canonicalize(root).map_err(|source| ScanError::Root {
        path: root.to_path_buf(),
        source,
    })
}

/// Only immediate children of the root can be ignored
fn is_ignored(entry: &DirEntry, ignored: &HashSet<String>) -> bool {
    entry.depth() == 1
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| ignored.contains(name))
}

fn modified_secs(entry: &DirEntry) -> Result<Option<i64>, ScanError> {
    let metadata = entry.metadata()?;
    Ok(metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_list_parsing() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(IGNORE_FILE),
            b"skipme\n\n   spaced  \n\xff\xfe\nlast",
        )
        .unwrap();

        let ignored = read_ignore_list(temp.path()).unwrap();

        assert!(ignored.contains("skipme"));
        assert!(ignored.contains("spaced"));
        assert!(ignored.contains("last"));
        assert!(!ignored.contains(""));
    }

    #[test]
    fn test_missing_ignore_file_is_empty() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(read_ignore_list(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_report_totals() {
        let report = ScanReport {
            added: 2,
            refreshed: 1,
            unchanged: 4,
            ignored_dirs: 1,
            skipped: 3,
        };
        assert_eq!(report.total_books(), 7);
    }
}
