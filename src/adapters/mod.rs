//! Adapter interfaces for external systems.
//!
//! Reader adapters expose what an external reader application knows about
//! books (progress, reader-asserted title/author) as a snapshot keyed by
//! absolute path. Adapters only ever read the reader's own files.
//!
//! The exiftool adapter backs metadata extraction.

pub mod exiftool;
pub mod foliate;
pub mod zathura;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use exiftool::ExifTool;
pub use foliate::FoliateAdapter;
pub use zathura::ZathuraAdapter;

/// Reader state for one file, as reported by one reader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderRecord {
    /// Absolute path; same identity space as the catalog
    pub path: PathBuf,

    /// Reader-asserted title
    pub title: Option<String>,

    /// Reader-asserted author
    pub author: Option<String>,

    /// Progress indicator (page number or opaque location index)
    pub page: Option<i64>,
}

impl ReaderRecord {
    /// Create a record carrying only a page
    pub fn with_page(path: impl Into<PathBuf>, page: i64) -> Self {
        Self {
            path: path.into(),
            page: Some(page),
            ..Default::default()
        }
    }
}

/// Records keyed by absolute path
pub type ReaderSnapshot = HashMap<PathBuf, ReaderRecord>;

/// Errors that fail a whole snapshot
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Reader store not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Trait for external reader adapters
#[async_trait]
pub trait ReaderAdapter: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Read the reader's current state. Computed fresh on every call.
    async fn snapshot(&self) -> Result<ReaderSnapshot, AdapterError>;
}
