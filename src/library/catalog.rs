//! Catalog store for all known book files.
//!
//! SQLite-backed (one row per path). The store owns schema creation and
//! in-place migration of older layouts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Params, Row};
use thiserror::Error;

use crate::domain::{BookFormat, CatalogEntry};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS books (
    filepath TEXT UNIQUE NOT NULL,
    title TEXT NOT NULL,
    author TEXT DEFAULT '',
    format TEXT NOT NULL,
    mtime INTEGER,
    added_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_books_filepath ON books(filepath);
";

/// Columns added after the first release, with their declarations
const MIGRATED_COLUMNS: [(&str, &str); 3] = [
    ("author", "TEXT DEFAULT ''"),
    ("mtime", "INTEGER"),
    ("added_at", "TEXT"),
];

const SELECT_COLUMNS: &str = "SELECT filepath, title, author, format, mtime, added_at FROM books";

/// Errors that can occur in the catalog store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Book already cataloged: {0}")]
    ConstraintViolation(PathBuf),

    #[error("Unsupported format '{format}' stored for {path}")]
    InvalidFormat { path: PathBuf, format: String },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite-backed catalog of book files
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    /// Open (or create) the catalog at `path` and bring its schema up to date
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a throwaway in-memory catalog
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        self.migrate()
    }

    /// Add columns missing from stores created by older versions
    fn migrate(&self) -> Result<(), StoreError> {
        let existing = self.columns()?;

        for (name, decl) in MIGRATED_COLUMNS {
            if existing.iter().any(|c| c == name) {
                continue;
            }
            tracing::info!("Migrating catalog: adding column '{}'", name);
            self.conn
                .execute(&format!("ALTER TABLE books ADD COLUMN {} {}", name, decl), [])?;
        }

        Ok(())
    }

    fn columns(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(books)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Check whether a path is already cataloged
    pub fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM books WHERE filepath = ?1",
            params![path_key(path)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Fetch a single entry by path
    pub fn get(&self, path: &Path) -> Result<Option<CatalogEntry>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("{} WHERE filepath = ?1", SELECT_COLUMNS),
                params![path_key(path)],
                RawRow::from_row,
            )
            .optional()?;

        raw.map(RawRow::into_entry).transpose()
    }

    /// Insert a new entry.
    ///
    /// Fails with [`StoreError::ConstraintViolation`] if the path is
    /// already present.
    pub fn insert(&self, entry: &CatalogEntry) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT INTO books (filepath, title, author, format, mtime, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                path_key(&entry.path),
                entry.title,
                entry.author,
                entry.format.as_str(),
                entry.mtime,
                entry.added_at.map(|t| t.to_rfc3339()),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::ConstraintViolation(entry.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite title, author and mtime of an existing entry.
    ///
    /// Returns false if the path is not cataloged.
    pub fn update_metadata(
        &self,
        path: &Path,
        title: &str,
        author: &str,
        mtime: Option<i64>,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE books SET title = ?1, author = ?2, mtime = ?3 WHERE filepath = ?4",
            params![title, author, mtime, path_key(path)],
        )?;
        Ok(changed > 0)
    }

    /// All entries ordered by title (SQLite binary collation)
    pub fn list_all(&self) -> Result<Vec<CatalogEntry>, StoreError> {
        self.query_entries(&format!("{} ORDER BY title ASC", SELECT_COLUMNS), [])
    }

    /// Entries of one format, ordered by title
    pub fn list_by_format(&self, format: BookFormat) -> Result<Vec<CatalogEntry>, StoreError> {
        self.query_entries(
            &format!("{} WHERE format = ?1 ORDER BY title ASC", SELECT_COLUMNS),
            params![format.as_str()],
        )
    }

    /// Remove an entry. Returns whether a row was deleted.
    pub fn remove(&self, path: &Path) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM books WHERE filepath = ?1", params![path_key(path)])?;
        Ok(deleted > 0)
    }

    /// Number of cataloged books
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Drop and recreate the schema. Destroys every row.
    pub fn reset_all(&self) -> Result<(), StoreError> {
        tracing::warn!("Resetting catalog: dropping all books");
        self.conn.execute("DROP TABLE IF EXISTS books", [])?;
        self.init_schema()
    }

    fn query_entries<P: Params>(&self, sql: &str, args: P) -> Result<Vec<CatalogEntry>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, RawRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }
}

/// Row as stored, before format and timestamp parsing
struct RawRow {
    path: String,
    title: String,
    author: Option<String>,
    format: String,
    mtime: Option<i64>,
    added_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            format: row.get(3)?,
            mtime: row.get(4)?,
            added_at: row.get(5)?,
        })
    }

    fn into_entry(self) -> Result<CatalogEntry, StoreError> {
        let path = PathBuf::from(self.path);
        let format = self.format.parse().map_err(|_| StoreError::InvalidFormat {
            path: path.clone(),
            format: self.format.clone(),
        })?;

        Ok(CatalogEntry {
            path,
            title: self.title,
            author: self.author.unwrap_or_default(),
            format,
            mtime: self.mtime,
            added_at: self
                .added_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc)),
        })
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
