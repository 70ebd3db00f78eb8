//! Book records: the persisted catalog row and the merged view model.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document formats the catalog indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookFormat {
    Pdf,
    Epub,
    Fb2,
}

impl BookFormat {
    /// Every supported format, in display order
    pub const ALL: [BookFormat; 3] = [BookFormat::Pdf, BookFormat::Epub, BookFormat::Fb2];

    /// Lowercase extension without the dot
    pub fn as_str(&self) -> &'static str {
        match self {
            BookFormat::Pdf => "pdf",
            BookFormat::Epub => "epub",
            BookFormat::Fb2 => "fb2",
        }
    }

    /// Detect the format from a path's extension (case-insensitive).
    ///
    /// Returns `None` for anything outside the supported set, including
    /// paths without an extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl std::fmt::Display for BookFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Ok(BookFormat::Pdf),
            "epub" => Ok(BookFormat::Epub),
            "fb2" => Ok(BookFormat::Fb2),
            _ => anyhow::bail!("Unsupported book format: {}", s),
        }
    }
}

/// A persisted catalog row, one per distinct path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Absolute path; identity key across the whole system
    pub path: PathBuf,

    /// Display title at scan time (never empty)
    pub title: String,

    /// Author at scan time (may be empty)
    pub author: String,

    pub format: BookFormat,

    /// File modification time (unix seconds) when metadata was extracted
    pub mtime: Option<i64>,

    /// When the row was first inserted
    pub added_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Create an entry for a freshly scanned file
    pub fn new(
        path: impl Into<PathBuf>,
        title: impl Into<String>,
        author: impl Into<String>,
        format: BookFormat,
    ) -> Self {
        Self {
            path: path.into(),
            title: title.into(),
            author: author.into(),
            format,
            mtime: None,
            added_at: Some(Utc::now()),
        }
    }

    /// Set the modification time the metadata was extracted at
    pub fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = Some(mtime);
        self
    }
}

/// A catalog entry with reader state folded in. Never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedBook {
    #[serde(rename = "filepath")]
    pub path: PathBuf,

    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,

    pub format: BookFormat,

    /// Reader progress (page number or opaque location index)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
}

impl From<CatalogEntry> for MergedBook {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            path: entry.path,
            title: entry.title,
            author: entry.author,
            format: entry.format,
            page: None,
        }
    }
}
