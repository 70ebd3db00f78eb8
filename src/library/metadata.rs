//! Title/author extraction with a layered fallback chain.
//!
//! The field lookups themselves go through a [`FieldExtractor`], normally
//! the exiftool subprocess adapter. Extraction never fails: a backend
//! error is "no data" and the chain moves on to the next source.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

/// Direct field requested for the title
const TITLE_FIELD: &str = "Title";

/// Direct fields tried for the author, in order
const AUTHOR_FIELDS: [&str; 4] = ["Author", "Creator", "Writer", "dc:Creator"];

/// Dump keys searched for the title
const TITLE_KEYS: [&str; 1] = ["book-title"];

/// Dump keys searched for the author, in precedence order
const AUTHOR_KEYS: [&str; 4] = ["book-author", "author", "creator", "writer"];

/// Narrow capability for reading metadata fields of a file
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Value of a single named field, empty if absent or on any failure
    async fn extract_field(&self, path: &Path, field: &str) -> String;

    /// Every field as `Key : Value` lines, empty on any failure
    async fn dump_fields(&self, path: &Path) -> String;
}

/// Best-known title and author for a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    /// Never empty
    pub title: String,

    /// May be empty
    pub author: String,
}

/// Runs the title/author fallback chain over a [`FieldExtractor`]
#[derive(Clone)]
pub struct MetadataExtractor {
    backend: Arc<dyn FieldExtractor>,
}

impl MetadataExtractor {
    pub fn new(backend: impl FieldExtractor + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_arc(backend: Arc<dyn FieldExtractor>) -> Self {
        Self { backend }
    }

    /// Name of the underlying backend
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Extract title and author. The full dump is fetched at most once.
    pub async fn extract(&self, path: &Path) -> BookMetadata {
        let mut dump = None;
        let title = self.title_with(path, &mut dump).await;
        let author = self.author_with(path, &mut dump).await;
        BookMetadata { title, author }
    }

    /// Extract just the display title
    pub async fn title(&self, path: &Path) -> String {
        self.title_with(path, &mut None).await
    }

    /// Extract just the author
    pub async fn author(&self, path: &Path) -> String {
        self.author_with(path, &mut None).await
    }

    async fn title_with(&self, path: &Path, dump: &mut Option<String>) -> String {
        let title = self.backend.extract_field(path, TITLE_FIELD).await;
        let title = title.trim();
        if !title.is_empty() {
            return title.to_string();
        }

        let dump = self.dump(path, dump).await;
        if let Some(title) = find_in_dump(dump, &TITLE_KEYS) {
            return title;
        }

        title_from_filename(path)
    }

    async fn author_with(&self, path: &Path, dump: &mut Option<String>) -> String {
        for field in AUTHOR_FIELDS {
            let author = self.backend.extract_field(path, field).await;
            let author = author.trim();
            if !author.is_empty() {
                return author.to_string();
            }
        }

        let dump = self.dump(path, dump).await;
        find_in_dump(dump, &AUTHOR_KEYS).unwrap_or_default()
    }

    async fn dump<'a>(&self, path: &Path, cache: &'a mut Option<String>) -> &'a str {
        if cache.is_none() {
            *cache = Some(self.backend.dump_fields(path).await);
        }
        cache.as_deref().unwrap_or("")
    }
}

/// Scan `Key : Value` lines for the first key containing one of `keys`.
///
/// Keys are tried in order; for each key the first matching line wins.
/// Line keys are lowercased with whitespace runs collapsed to `-`.
pub fn find_in_dump(dump: &str, keys: &[&str]) -> Option<String> {
    let fields: Vec<(String, &str)> = dump
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (normalize_key(key), value.trim()))
        .filter(|(_, value)| !value.is_empty())
        .collect();

    keys.iter().find_map(|wanted| {
        fields
            .iter()
            .find(|(key, _)| key.contains(wanted))
            .map(|(_, value)| value.to_string())
    })
}

fn normalize_key(key: &str) -> String {
    key.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// File stem, or the whole file name when the stem is empty
pub fn title_from_filename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .unwrap_or_default();

    if !stem.is_empty() {
        return stem;
    }

    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
