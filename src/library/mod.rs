//! Book library: catalog, scanning, and the merged reader view.
//!
//! The catalog (SQLite) is the only source of which books exist. At query
//! time every configured reader adapter is snapshotted and folded onto the
//! catalog rows.
//!
//! # Merge precedence
//!
//! Per catalog entry, lowest to highest:
//!
//! 1. catalog title / author / format
//! 2. reader adapters, in registration order (Zathura, then Foliate):
//!    each record overwrites `page` and `title` when it has them, and
//!    `author` only when non-empty
//!
//! Reader records with no catalog entry are never observable. A failing
//! adapter is logged and treated as an empty snapshot.
//!
//! # Storage Layout
//!
//! ```text
//! <data dir>/booklib/
//! └── library.sqlite    # books(filepath, title, author, format, mtime, added_at)
//! ```

pub mod catalog;
pub mod metadata;
pub mod scanner;
pub mod search;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use catalog::{CatalogStore, StoreError};
pub use metadata::{BookMetadata, FieldExtractor, MetadataExtractor};
pub use scanner::{ScanError, ScanOptions, ScanReport, Scanner};

use crate::adapters::{ExifTool, FoliateAdapter, ReaderAdapter, ReaderSnapshot, ZathuraAdapter};
use crate::config::ResolvedConfig;
use crate::domain::{BookFormat, CatalogEntry, MergedBook};

/// Fold reader snapshots onto catalog entries.
///
/// `snapshots` are in ascending precedence order; later ones win.
pub fn merge(entries: Vec<CatalogEntry>, snapshots: &[ReaderSnapshot]) -> Vec<MergedBook> {
    entries
        .into_iter()
        .map(|entry| {
            let mut book = MergedBook::from(entry);

            for snapshot in snapshots {
                let Some(record) = snapshot.get(&book.path) else {
                    continue;
                };
                if let Some(page) = record.page {
                    book.page = Some(page);
                }
                if let Some(title) = &record.title {
                    book.title = title.clone();
                }
                if let Some(author) = record.author.as_ref().filter(|a| !a.is_empty()) {
                    book.author = author.clone();
                }
            }

            book
        })
        .collect()
}

/// Catalog plus reader adapters
pub struct Library {
    store: CatalogStore,
    extractor: MetadataExtractor,
    readers: Vec<Box<dyn ReaderAdapter>>,
    scan_options: ScanOptions,
}

impl Library {
    /// Create a library with no reader adapters
    pub fn new(store: CatalogStore, extractor: MetadataExtractor) -> Self {
        Self {
            store,
            extractor,
            readers: Vec::new(),
            scan_options: ScanOptions::default(),
        }
    }

    /// Open the library described by `config`: catalog database, exiftool
    /// extractor, and every enabled reader adapter.
    pub fn open(config: &ResolvedConfig) -> Result<Self> {
        let db_path = config.database_path();
        let store = CatalogStore::open(&db_path)
            .with_context(|| format!("Failed to open catalog: {}", db_path.display()))?;

        let exiftool = ExifTool::with_binary_path(&config.extraction.exiftool)
            .with_timeout(config.extraction.timeout());

        let mut library = Self::new(store, MetadataExtractor::new(exiftool)).with_scan_options(
            ScanOptions {
                concurrency: config.extraction.concurrency,
                refresh_stale: config.refresh_stale,
            },
        );

        if let Some(ref db) = config.zathura_db {
            library = library.with_reader(ZathuraAdapter::new(db));
        }
        if let Some(ref dir) = config.foliate_dir {
            library = library.with_reader(FoliateAdapter::new(dir));
        }

        Ok(library)
    }

    /// Register a reader adapter; later adapters take precedence
    pub fn with_reader(mut self, reader: impl ReaderAdapter + 'static) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    pub fn with_scan_options(mut self, options: ScanOptions) -> Self {
        self.scan_options = options;
        self
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn extractor(&self) -> &MetadataExtractor {
        &self.extractor
    }

    /// Names of registered readers, in precedence order
    pub fn reader_names(&self) -> Vec<&str> {
        self.readers.iter().map(|r| r.name()).collect()
    }

    /// Scan a directory tree into the catalog
    pub async fn scan(&self, root: &Path) -> Result<ScanReport, ScanError> {
        Scanner::new(&self.store, &self.extractor)
            .with_options(self.scan_options.clone())
            .scan(root)
            .await
    }

    /// Snapshot every reader; failures degrade to empty snapshots
    async fn snapshots(&self) -> Vec<ReaderSnapshot> {
        let mut snapshots = Vec::with_capacity(self.readers.len());

        for reader in &self.readers {
            match reader.snapshot().await {
                Ok(snapshot) => {
                    tracing::debug!("{} knows {} book(s)", reader.name(), snapshot.len());
                    snapshots.push(snapshot);
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not get {} books, continuing without them: {}",
                        reader.name(),
                        e
                    );
                    snapshots.push(ReaderSnapshot::new());
                }
            }
        }

        snapshots
    }

    /// Every cataloged book with reader state merged in, ordered by title
    pub async fn get_all(&self) -> Result<Vec<MergedBook>, StoreError> {
        let snapshots = self.snapshots().await;
        let entries = self.store.list_all()?;
        Ok(merge(entries, &snapshots))
    }

    /// Fuzzy search over merged titles; an empty term returns everything
    pub async fn search(&self, term: &str) -> Result<Vec<MergedBook>, StoreError> {
        let all = self.get_all().await?;

        let term = term.trim();
        if term.is_empty() {
            return Ok(all);
        }

        let titles: Vec<&str> = all.iter().map(|b| b.title.as_str()).collect();
        let ranks = search::rank_fold(term, &titles);

        Ok(ranks.into_iter().map(|rank| all[rank.index].clone()).collect())
    }

    /// Catalog entries of one format (no reader enrichment)
    pub fn list_by_format(&self, format: BookFormat) -> Result<Vec<CatalogEntry>, StoreError> {
        self.store.list_by_format(format)
    }

    /// Remove a single book from the catalog
    pub fn remove(&self, path: &Path) -> Result<bool, StoreError> {
        self.store.remove(path)
    }

    /// Delete catalog entries whose file no longer exists.
    ///
    /// Returns the removed paths.
    pub fn remove_missing_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut removed = Vec::new();

        for entry in self.store.list_all()? {
            match entry.path.try_exists() {
                Ok(true) => {}
                Ok(false) => {
                    self.store.remove(&entry.path)?;
                    tracing::info!("Removed missing book: {}", entry.path.display());
                    removed.push(entry.path);
                }
                Err(e) => {
                    tracing::warn!("Could not stat {}, keeping it: {}", entry.path.display(), e);
                }
            }
        }

        Ok(removed)
    }

    /// Drop and recreate the catalog schema
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.reset_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ReaderRecord;

    fn entry(path: &str, title: &str, author: &str) -> CatalogEntry {
        CatalogEntry::new(path, title, author, BookFormat::Epub)
    }

    fn snapshot(records: Vec<ReaderRecord>) -> ReaderSnapshot {
        records.into_iter().map(|r| (r.path.clone(), r)).collect()
    }

    #[test]
    fn test_library_record_overrides_title() {
        let entries = vec![entry("/b/a.epub", "A", "Catalog Author")];
        let library = snapshot(vec![ReaderRecord {
            path: "/b/a.epub".into(),
            title: Some("B".to_string()),
            author: Some(String::new()),
            page: Some(9),
        }]);

        let merged = merge(entries, &[library]);

        assert_eq!(merged[0].title, "B");
        // Empty reader author never clears the catalog author
        assert_eq!(merged[0].author, "Catalog Author");
        assert_eq!(merged[0].page, Some(9));
    }

    #[test]
    fn test_later_snapshot_wins_page() {
        let entries = vec![entry("/b/a.epub", "A", "")];
        let bookmarks = snapshot(vec![ReaderRecord::with_page("/b/a.epub", 5)]);
        let library = snapshot(vec![ReaderRecord {
            path: "/b/a.epub".into(),
            title: Some("Reader Title".to_string()),
            author: Some("Reader Author".to_string()),
            page: Some(120),
        }]);

        let merged = merge(entries, &[bookmarks, library]);

        assert_eq!(merged[0].page, Some(120));
        assert_eq!(merged[0].title, "Reader Title");
        assert_eq!(merged[0].author, "Reader Author");
    }

    #[test]
    fn test_bookmark_only_sets_page() {
        let entries = vec![entry("/b/a.epub", "A", "X"), entry("/b/c.epub", "C", "")];
        let bookmarks = snapshot(vec![
            ReaderRecord::with_page("/b/a.epub", 5),
            ReaderRecord::with_page("/b/unknown.pdf", 1),
        ]);

        let merged = merge(entries, &[bookmarks]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "A");
        assert_eq!(merged[0].author, "X");
        assert_eq!(merged[0].page, Some(5));
        assert_eq!(merged[1].page, None);
    }
}
