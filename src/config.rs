//! Configuration for booklib paths and extraction settings.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (BOOKLIB_HOME, BOOKLIB_SCAN_PATH, BOOKLIB_EXIFTOOL)
//! 2. Config file (.booklib/config.yaml, else <config dir>/booklib/config.yaml)
//! 3. Defaults (<data dir>/booklib)
//!
//! Config file discovery:
//! - Searches current directory and parents for .booklib/config.yaml
//! - Falls back to the per-user config directory
//! - Relative paths in the config file resolve against the file's directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::{FoliateAdapter, ZathuraAdapter};

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// File name of the catalog database inside the home directory
pub const DATABASE_FILE: &str = "library.sqlite";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub readers: ReadersConfig,
    #[serde(default)]
    pub extraction: Option<ExtractionConfig>,
    #[serde(default)]
    pub scan: Option<ScanConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory holding the catalog database
    pub home: Option<String>,
    /// Book scan path
    pub scan_root: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadersConfig {
    pub zathura_db: Option<String>,
    pub foliate_dir: Option<String>,
    pub zathura_enabled: Option<bool>,
    pub foliate_enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub exiftool: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    pub refresh_stale: Option<bool>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory holding the catalog database
    pub home: PathBuf,
    /// Default root for `scan` (None if never configured)
    pub scan_root: Option<PathBuf>,
    /// Zathura bookmark database (None disables the adapter)
    pub zathura_db: Option<PathBuf>,
    /// Foliate data directory (None disables the adapter)
    pub foliate_dir: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Metadata extraction settings
    pub extraction: ExtractionSettings,
    /// Re-extract cataloged files whose mtime changed
    pub refresh_stale: bool,
}

#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub exiftool: String,
    pub timeout_seconds: u64,
    pub concurrency: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            exiftool: "exiftool".to_string(),
            timeout_seconds: 10,
            concurrency: 1,
        }
    }
}

impl ExtractionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl ResolvedConfig {
    /// Path to the catalog database
    pub fn database_path(&self) -> PathBuf {
        self.home.join(DATABASE_FILE)
    }
}

/// Expand a leading `~/` against `home`; other paths are returned as-is
pub fn expand_tilde(raw: &str, home: Option<&Path>) -> PathBuf {
    match (raw.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if raw == "~" => home.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(raw)),
        _ => PathBuf::from(raw),
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".booklib").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    let user_config = dirs::config_dir()?.join("booklib").join("config.yaml");
    user_config.exists().then_some(user_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = expand_tilde(path_str, dirs::home_dir().as_deref());
    if path.is_absolute() {
        path
    } else {
        base.join(&path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Fold a parsed config file (found at `config_path`) over the defaults
fn resolve(config: Option<(&Path, ConfigFile)>) -> Result<ResolvedConfig> {
    let data_dir = dirs::data_dir().context("Failed to determine user data directory")?;

    let mut resolved = ResolvedConfig {
        home: data_dir.join("booklib"),
        scan_root: None,
        zathura_db: ZathuraAdapter::default_path(),
        foliate_dir: FoliateAdapter::default_path(),
        config_file: None,
        extraction: ExtractionSettings::default(),
        refresh_stale: true,
    };

    if let Some((config_path, file)) = config {
        let base_dir = config_path.parent().unwrap_or(Path::new("."));
        resolved.config_file = Some(config_path.to_path_buf());

        if let Some(ref home) = file.paths.home {
            resolved.home = resolve_path(base_dir, home);
        }
        if let Some(ref root) = file.paths.scan_root {
            resolved.scan_root = Some(resolve_path(base_dir, root));
        }
        if let Some(ref db) = file.readers.zathura_db {
            resolved.zathura_db = Some(resolve_path(base_dir, db));
        }
        if let Some(ref dir) = file.readers.foliate_dir {
            resolved.foliate_dir = Some(resolve_path(base_dir, dir));
        }
        if file.readers.zathura_enabled == Some(false) {
            resolved.zathura_db = None;
        }
        if file.readers.foliate_enabled == Some(false) {
            resolved.foliate_dir = None;
        }

        if let Some(extraction) = file.extraction {
            let defaults = ExtractionSettings::default();
            resolved.extraction = ExtractionSettings {
                exiftool: extraction.exiftool.unwrap_or(defaults.exiftool),
                timeout_seconds: extraction
                    .timeout_seconds
                    .unwrap_or(defaults.timeout_seconds)
                    .max(1),
                concurrency: extraction.concurrency.unwrap_or(defaults.concurrency).max(1),
            };
        }

        if let Some(refresh) = file.scan.and_then(|s| s.refresh_stale) {
            resolved.refresh_stale = refresh;
        }
    }

    Ok(resolved)
}

/// Apply environment overrides
fn apply_env(mut resolved: ResolvedConfig) -> ResolvedConfig {
    let home = dirs::home_dir();

    if let Ok(env_home) = std::env::var("BOOKLIB_HOME") {
        resolved.home = expand_tilde(&env_home, home.as_deref());
    }
    if let Ok(scan_root) = std::env::var("BOOKLIB_SCAN_PATH") {
        resolved.scan_root = Some(expand_tilde(&scan_root, home.as_deref()));
    }
    if let Ok(exiftool) = std::env::var("BOOKLIB_EXIFTOOL") {
        resolved.extraction.exiftool = exiftool;
    }

    resolved
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let resolved = match find_config_file() {
        Some(path) => {
            let file = load_config_file(&path)?;
            resolve(Some((&path, file)))?
        }
        None => resolve(None)?,
    };

    Ok(apply_env(resolved))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None).unwrap();
        let data_dir = dirs::data_dir().unwrap();

        assert_eq!(config.home, data_dir.join("booklib"));
        assert_eq!(config.database_path(), data_dir.join("booklib").join(DATABASE_FILE));
        assert!(config.scan_root.is_none());
        assert!(config.zathura_db.is_some());
        assert!(config.foliate_dir.is_some());
        assert!(config.refresh_stale);
        assert_eq!(config.extraction.concurrency, 1);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let booklib_dir = temp.path().join(".booklib");
        std::fs::create_dir_all(&booklib_dir).unwrap();

        let config_path = booklib_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1"
paths:
  home: /var/lib/booklib
  scan_root: /srv/books
readers:
  zathura_db: /tmp/bookmarks.sqlite
  foliate_enabled: false
extraction:
  timeout_seconds: 3
  concurrency: 0
scan:
  refresh_stale: false
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1");
        assert_eq!(parsed.paths.scan_root, Some("/srv/books".to_string()));

        let config = resolve(Some((&config_path, parsed))).unwrap();
        assert_eq!(config.home, PathBuf::from("/var/lib/booklib"));
        assert_eq!(config.scan_root, Some(PathBuf::from("/srv/books")));
        assert_eq!(config.zathura_db, Some(PathBuf::from("/tmp/bookmarks.sqlite")));
        assert!(config.foliate_dir.is_none());
        assert_eq!(config.extraction.timeout(), Duration::from_secs(3));
        assert_eq!(config.extraction.exiftool, "exiftool");
        // Concurrency is clamped to at least one worker
        assert_eq!(config.extraction.concurrency, 1);
        assert!(!config.refresh_stale);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yaml");
        std::fs::write(
            &config_path,
            "version: \"1\"\nextraction:\n  timeout_seconds: 0\n",
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        let config = resolve(Some((&config_path, parsed))).unwrap();

        assert_eq!(config.extraction.timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_expand_tilde() {
        let home = Path::new("/home/reader");

        assert_eq!(
            expand_tilde("~/Books/a.epub", Some(home)),
            PathBuf::from("/home/reader/Books/a.epub")
        );
        assert_eq!(expand_tilde("~", Some(home)), PathBuf::from("/home/reader"));
        assert_eq!(
            expand_tilde("/abs/b.pdf", Some(home)),
            PathBuf::from("/abs/b.pdf")
        );
        assert_eq!(expand_tilde("~/x.pdf", None), PathBuf::from("~/x.pdf"));
        assert_eq!(expand_tilde("~other/x", Some(home)), PathBuf::from("~other/x"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.booklib");

        assert_eq!(
            resolve_path(&base, "../books"),
            PathBuf::from("/home/user/project/.booklib/../books")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
