//! Zathura bookmark adapter.
//!
//! Reads the `fileinfo(file, page)` table of Zathura's `bookmarks.sqlite`
//! in read-only mode. Rows pointing at files that no longer exist are
//! dropped silently.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};

use super::{AdapterError, ReaderAdapter, ReaderRecord, ReaderSnapshot};
use crate::library::metadata::MetadataExtractor;

/// A bookmark with a display title, for standalone listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub path: PathBuf,
    pub page: i64,
    pub title: String,
}

/// Adapter over Zathura's bookmark database
#[derive(Debug, Clone)]
pub struct ZathuraAdapter {
    db_path: PathBuf,
}

impl ZathuraAdapter {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Default location (`<data dir>/zathura/bookmarks.sqlite`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("zathura").join("bookmarks.sqlite"))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Bookmarks of existing files, each with a title from `extractor`.
    ///
    /// Titles cost one extraction per bookmark, so this is only for
    /// standalone listings; merged views take titles from the catalog.
    pub async fn bookmarks(
        &self,
        extractor: &MetadataExtractor,
    ) -> Result<Vec<Bookmark>, AdapterError> {
        let mut bookmarks = Vec::new();

        for (path, page) in self.existing_rows().await? {
            let title = extractor.title(&path).await;
            bookmarks.push(Bookmark { path, page, title });
        }

        Ok(bookmarks)
    }

    /// Rows whose file still exists, in table order
    async fn existing_rows(&self) -> Result<Vec<(PathBuf, i64)>, AdapterError> {
        let rows = read_fileinfo(&self.db_path)?;

        let mut existing = Vec::with_capacity(rows.len());
        for (file, page) in rows {
            let path = PathBuf::from(file);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                existing.push((path, page));
            } else {
                tracing::debug!("Skipping bookmark for missing file: {}", path.display());
            }
        }

        Ok(existing)
    }
}

/// Read every decodable `fileinfo` row
fn read_fileinfo(db_path: &Path) -> Result<Vec<(String, i64)>, AdapterError> {
    if !db_path.exists() {
        return Err(AdapterError::NotFound(db_path.to_path_buf()));
    }

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut stmt = conn.prepare("SELECT file, page FROM fileinfo")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut result = Vec::new();
    for row in rows {
        match row {
            Ok(row) => result.push(row),
            Err(e) => tracing::warn!("Skipping unreadable bookmark row: {}", e),
        }
    }

    Ok(result)
}

#[async_trait]
impl ReaderAdapter for ZathuraAdapter {
    fn name(&self) -> &str {
        "zathura"
    }

    async fn snapshot(&self) -> Result<ReaderSnapshot, AdapterError> {
        let rows = self.existing_rows().await?;

        Ok(rows
            .into_iter()
            .map(|(path, page)| (path.clone(), ReaderRecord::with_page(path, page)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::library::metadata::FieldExtractor;

    fn create_bookmark_db(path: &Path, rows: &[(&str, i64)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("CREATE TABLE fileinfo (file TEXT PRIMARY KEY, page INTEGER)")
            .unwrap();
        for (file, page) in rows {
            conn.execute(
                "INSERT INTO fileinfo (file, page) VALUES (?1, ?2)",
                rusqlite::params![file, page],
            )
            .unwrap();
        }
    }

    struct TitleOnly;

    #[async_trait]
    impl FieldExtractor for TitleOnly {
        fn name(&self) -> &str {
            "title-only"
        }

        async fn extract_field(&self, _path: &Path, field: &str) -> String {
            if field == "Title" {
                "Bookmarked Title".to_string()
            } else {
                String::new()
            }
        }

        async fn dump_fields(&self, _path: &Path) -> String {
            String::new()
        }
    }

    #[tokio::test]
    async fn test_snapshot_excludes_missing_files() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("present.pdf");
        std::fs::write(&present, b"%PDF").unwrap();
        let missing = temp.path().join("gone.pdf");

        let db = temp.path().join("bookmarks.sqlite");
        create_bookmark_db(
            &db,
            &[
                (present.to_str().unwrap(), 42),
                (missing.to_str().unwrap(), 7),
            ],
        );

        let snapshot = ZathuraAdapter::new(&db).snapshot().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&present].page, Some(42));
        assert!(snapshot[&present].title.is_none());
        assert!(!snapshot.contains_key(&missing));
    }

    #[tokio::test]
    async fn test_missing_store_is_error() {
        let temp = TempDir::new().unwrap();
        let adapter = ZathuraAdapter::new(temp.path().join("nope.sqlite"));

        let result = adapter.snapshot().await;
        assert!(matches!(result, Err(AdapterError::NotFound(_))));
        // Read-only open must not have created the file
        assert!(!adapter.db_path().exists());
    }

    #[tokio::test]
    async fn test_standalone_bookmarks_have_titles() {
        let temp = TempDir::new().unwrap();
        let book = temp.path().join("book.pdf");
        std::fs::write(&book, b"%PDF").unwrap();
        let db = temp.path().join("bookmarks.sqlite");
        create_bookmark_db(&db, &[(book.to_str().unwrap(), 3)]);

        let extractor = MetadataExtractor::new(TitleOnly);
        let bookmarks = ZathuraAdapter::new(&db).bookmarks(&extractor).await.unwrap();

        assert_eq!(
            bookmarks,
            vec![Bookmark {
                path: book,
                page: 3,
                title: "Bookmarked Title".to_string(),
            }]
        );
    }
}
