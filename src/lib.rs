//! booklib - Local catalog of PDF/EPUB/FB2 books
//!
//! Keeps a queryable catalog of document files scattered across the
//! filesystem, enriched with reading progress from external readers.
//!
//! # Architecture
//!
//! - The catalog (SQLite) is populated by explicit directory scans
//! - Titles and authors come from exiftool, with filename fallbacks
//! - At query time, reader adapters (Zathura bookmarks, Foliate library)
//!   are snapshotted and merged onto the catalog rows
//!
//! # Modules
//!
//! - `adapters`: External systems (exiftool, Zathura, Foliate)
//! - `library`: Catalog store, scanner, metadata extraction, merge & search
//! - `domain`: Data structures (CatalogEntry, MergedBook, BookFormat)
//! - `config`: Path and extraction settings
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Catalog every book under ~/Books
//! booklib scan ~/Books
//!
//! # Fuzzy search merged titles
//! booklib search "dune"
//!
//! # Drop entries whose files are gone
//! booklib cleanup
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod library;

// Re-export main types at crate root for convenience
pub use adapters::{ExifTool, FoliateAdapter, ReaderAdapter, ReaderRecord, ZathuraAdapter};
pub use domain::{BookFormat, CatalogEntry, MergedBook};
pub use library::{CatalogStore, FieldExtractor, Library, MetadataExtractor, ScanReport};
