//! Foliate library adapter.
//!
//! Foliate keeps an index at `<data>/library/uri-store.json`:
//!
//! ```json
//! { "uris": [["<identifier>", "~/Books/dune.epub"], ...] }
//! ```
//!
//! and one sidecar per book at `<data>/<identifier>.json` holding
//! `metadata.title`, `metadata.author` and `progress`.
//!
//! A missing or unparseable index fails the snapshot. A bad entry (missing
//! target file, unreadable or malformed sidecar) is logged and skipped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;

use super::{AdapterError, ReaderAdapter, ReaderRecord, ReaderSnapshot};
use crate::config::expand_tilde;

/// `uri-store.json` schema
#[derive(Debug, Deserialize)]
struct UriStore {
    #[serde(default)]
    uris: Vec<Vec<String>>,
}

/// Per-book sidecar schema (only the fields we read)
#[derive(Debug, Deserialize)]
struct BookSidecar {
    #[serde(default)]
    metadata: SidecarMetadata,

    #[serde(default)]
    progress: Vec<Option<i64>>,
}

#[derive(Debug, Default, Deserialize)]
struct SidecarMetadata {
    #[serde(default)]
    title: Option<String>,

    #[serde(default)]
    author: Option<Authors>,
}

/// Foliate writes authors as contributor objects, but older exports use
/// plain strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Authors {
    Contributors(Vec<Contributor>),
    Names(Vec<String>),
    Single(String),
}

#[derive(Debug, Deserialize)]
struct Contributor {
    #[serde(default)]
    name: String,
}

impl Authors {
    fn first(&self) -> Option<&str> {
        let name = match self {
            Authors::Contributors(list) => list.first().map(|c| c.name.as_str()),
            Authors::Names(list) => list.first().map(String::as_str),
            Authors::Single(name) => Some(name.as_str()),
        }?;
        let name = name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Adapter over Foliate's on-disk library
#[derive(Debug, Clone)]
pub struct FoliateAdapter {
    data_dir: PathBuf,
    home: Option<PathBuf>,
}

impl FoliateAdapter {
    /// Create an adapter; `~/` paths resolve against the user's home
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            home: dirs::home_dir(),
        }
    }

    /// Resolve `~/` paths against a different home directory
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Default location (`<data dir>/com.github.johnfactotum.Foliate`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("com.github.johnfactotum.Foliate"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn index_path(&self) -> PathBuf {
        self.data_dir.join("library").join("uri-store.json")
    }

    fn sidecar_path(&self, identifier: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", identifier))
    }

    async fn load_index(&self) -> Result<UriStore, AdapterError> {
        let path = self.index_path();
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(AdapterError::NotFound(path));
        }

        let content = fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Build a record for one index entry, or `None` to skip it
    async fn load_entry(&self, identifier: &str, raw_path: &str) -> Option<ReaderRecord> {
        let path = expand_tilde(raw_path, self.home.as_deref());

        if !fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!("Skipping Foliate entry for missing file: {}", path.display());
            return None;
        }

        let sidecar_path = self.sidecar_path(identifier);
        let content = match fs::read_to_string(&sidecar_path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to read Foliate metadata {}: {}", sidecar_path.display(), e);
                return None;
            }
        };

        let sidecar: BookSidecar = match serde_json::from_str(&content) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                tracing::warn!("Failed to parse Foliate metadata {}: {}", sidecar_path.display(), e);
                return None;
            }
        };

        let title = sidecar
            .metadata
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        let author = sidecar
            .metadata
            .author
            .as_ref()
            .and_then(Authors::first)
            .map(str::to_string);

        Some(ReaderRecord {
            title: Some(title),
            author,
            page: Some(sidecar.progress.first().copied().flatten().unwrap_or(0)),
            path,
        })
    }
}

#[async_trait]
impl ReaderAdapter for FoliateAdapter {
    fn name(&self) -> &str {
        "foliate"
    }

    async fn snapshot(&self) -> Result<ReaderSnapshot, AdapterError> {
        let index = self.load_index().await?;
        let mut snapshot = ReaderSnapshot::new();

        for uri in &index.uris {
            let [identifier, raw_path] = uri.as_slice() else {
                tracing::debug!("Skipping malformed Foliate index entry: {:?}", uri);
                continue;
            };

            if let Some(record) = self.load_entry(identifier, raw_path).await {
                snapshot.insert(record.path.clone(), record);
            }
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        data_dir: PathBuf,
        home: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let data_dir = temp.path().join("foliate");
            let home = temp.path().join("home");
            std::fs::create_dir_all(data_dir.join("library")).unwrap();
            std::fs::create_dir_all(&home).unwrap();
            Self {
                temp,
                data_dir,
                home,
            }
        }

        fn adapter(&self) -> FoliateAdapter {
            FoliateAdapter::new(&self.data_dir).with_home(&self.home)
        }

        fn write_index(&self, uris: serde_json::Value) {
            std::fs::write(
                self.data_dir.join("library").join("uri-store.json"),
                serde_json::json!({ "uris": uris }).to_string(),
            )
            .unwrap();
        }

        fn write_sidecar(&self, identifier: &str, body: &str) {
            std::fs::write(self.data_dir.join(format!("{}.json", identifier)), body).unwrap();
        }

        fn book(&self, name: &str) -> PathBuf {
            let path = self.temp.path().join(name);
            std::fs::write(&path, b"book").unwrap();
            path
        }
    }

    #[tokio::test]
    async fn test_snapshot_reads_sidecars() {
        let fx = Fixture::new();
        let book = fx.book("dune.epub");
        fx.write_index(serde_json::json!([["urn:dune", book.to_str().unwrap()]]));
        fx.write_sidecar(
            "urn:dune",
            r#"{
                "metadata": {"title": "Dune", "author": [{"name": "Frank Herbert", "sortAs": ""}]},
                "progress": [12, 400],
                "lastLocation": "epubcfi(/6/4)"
            }"#,
        );

        let snapshot = fx.adapter().snapshot().await.unwrap();
        let record = &snapshot[&book];

        assert_eq!(record.title.as_deref(), Some("Dune"));
        assert_eq!(record.author.as_deref(), Some("Frank Herbert"));
        assert_eq!(record.page, Some(12));
    }

    #[tokio::test]
    async fn test_tilde_paths_resolve_against_home() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.home.join("Books")).unwrap();
        let book = fx.home.join("Books").join("a.epub");
        std::fs::write(&book, b"book").unwrap();

        fx.write_index(serde_json::json!([["id-a", "~/Books/a.epub"]]));
        fx.write_sidecar("id-a", r#"{"metadata": {"title": "A", "author": "Solo"}, "progress": []}"#);

        let snapshot = fx.adapter().snapshot().await.unwrap();
        let record = &snapshot[&book];

        assert_eq!(record.author.as_deref(), Some("Solo"));
        assert_eq!(record.page, Some(0));
    }

    #[tokio::test]
    async fn test_bad_entries_are_skipped() {
        let fx = Fixture::new();
        let good = fx.book("good.epub");
        let broken = fx.book("broken.epub");
        let no_sidecar = fx.book("lonely.epub");

        fx.write_index(serde_json::json!([
            ["good", good.to_str().unwrap()],
            ["broken", broken.to_str().unwrap()],
            ["lonely", no_sidecar.to_str().unwrap()],
            ["missing", fx.temp.path().join("gone.epub").to_str().unwrap()],
            ["not-a-pair"]
        ]));
        fx.write_sidecar("good", r#"{"metadata": {"title": ""}, "progress": [3]}"#);
        fx.write_sidecar("broken", "{ not json");

        let snapshot = fx.adapter().snapshot().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        // Empty title falls back to the file name
        assert_eq!(snapshot[&good].title.as_deref(), Some("good.epub"));
        assert_eq!(snapshot[&good].author, None);
    }

    #[tokio::test]
    async fn test_missing_index_is_error() {
        let fx = Fixture::new();
        let result = fx.adapter().snapshot().await;
        assert!(matches!(result, Err(AdapterError::NotFound(_))));
    }
}
