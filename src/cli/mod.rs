//! Command-line interface for booklib.
//!
//! Provides commands for scanning directories into the catalog, listing
//! and searching the merged library, and catalog maintenance.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::adapters::ZathuraAdapter;
use crate::config::{self, ResolvedConfig};
use crate::domain::{BookFormat, MergedBook};
use crate::library::Library;

/// booklib - Local catalog of PDF/EPUB/FB2 books
#[derive(Parser, Debug)]
#[command(name = "booklib")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a directory tree and catalog new books
    Scan {
        /// Root directory (defaults to the configured scan path)
        path: Option<PathBuf>,
    },

    /// List cataloged books with reader progress
    List {
        /// Only show one format (catalog data only, no reader progress)
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,

        /// Maximum number of books to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Fuzzy search book titles
    Search {
        /// Search term (empty lists everything)
        term: String,

        /// Maximum number of results to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Remove catalog entries whose files no longer exist
    Cleanup,

    /// Remove one book from the catalog
    Remove {
        /// Path of the book file
        path: PathBuf,
    },

    /// Drop and recreate the catalog (destroys every entry)
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// List Zathura bookmarks with titles
    Bookmarks,

    /// Show resolved configuration (debug)
    Config,
}

/// Book format for CLI (maps to BookFormat)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Pdf,
    Epub,
    Fb2,
}

impl From<FormatArg> for BookFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Pdf => BookFormat::Pdf,
            FormatArg::Epub => BookFormat::Epub,
            FormatArg::Fb2 => BookFormat::Fb2,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Scan { path } => scan(cfg, path).await,
            Commands::List {
                format,
                limit,
                json,
            } => list(cfg, format, limit, json).await,
            Commands::Search { term, limit, json } => search(cfg, &term, limit, json).await,
            Commands::Cleanup => cleanup(cfg),
            Commands::Remove { path } => remove(cfg, &path),
            Commands::Reset { yes } => reset(cfg, yes),
            Commands::Bookmarks => bookmarks(cfg).await,
            Commands::Config => show_config(cfg),
        }
    }
}

/// Scan a directory into the catalog
async fn scan(cfg: &ResolvedConfig, path: Option<PathBuf>) -> Result<()> {
    let root = path
        .or_else(|| cfg.scan_root.clone())
        .context("No scan path given. Pass one or set BOOKLIB_SCAN_PATH / paths.scan_root")?;

    let library = Library::open(cfg)?;
    let report = library
        .scan(&root)
        .await
        .with_context(|| format!("Scan of {} failed", root.display()))?;

    eprintln!(
        "\nScanned {}: {} added, {} refreshed, {} unchanged, {} ignored dir(s)",
        root.display(),
        report.added,
        report.refreshed,
        report.unchanged,
        report.ignored_dirs
    );
    if report.skipped > 0 {
        eprintln!(
            "Skipped {} file(s) with non-UTF-8 paths (see warnings above)",
            report.skipped
        );
    }
    eprintln!("Catalog now holds {} book(s)", library.store().count()?);

    Ok(())
}

/// List the library
async fn list(
    cfg: &ResolvedConfig,
    format: Option<FormatArg>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let library = Library::open(cfg)?;

    let books: Vec<MergedBook> = match format {
        Some(format) => library
            .list_by_format(format.into())?
            .into_iter()
            .map(MergedBook::from)
            .collect(),
        None => library.get_all().await?,
    };

    if books.is_empty() && !json {
        println!("Library is empty. Use 'booklib scan <dir>' to add books.");
        return Ok(());
    }

    print_books(&books, limit, json)
}

/// Search the library
async fn search(cfg: &ResolvedConfig, term: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let library = Library::open(cfg)?;
    let results = library.search(term).await?;

    if results.is_empty() && !json {
        println!("No results found for: {}", term);
        return Ok(());
    }

    if !json {
        println!("Found {} result(s) for \"{}\":\n", results.len(), term);
    }
    print_books(&results, limit, json)
}

fn print_books(books: &[MergedBook], limit: Option<usize>, json: bool) -> Result<()> {
    let shown = &books[..limit.unwrap_or(books.len()).min(books.len())];

    if json {
        println!("{}", serde_json::to_string_pretty(shown)?);
        return Ok(());
    }

    println!("{:<50} {:<25} {:<6} {:>6}", "TITLE", "AUTHOR", "FORMAT", "PAGE");
    println!("{}", "-".repeat(90));

    for book in shown {
        println!(
            "{:<50} {:<25} {:<6} {:>6}",
            truncate(&book.title, 50),
            truncate(&book.author, 25),
            book.format.to_string(),
            book.page.map(|p| p.to_string()).unwrap_or_default()
        );
    }

    println!("\nTotal: {} book(s)", books.len());
    Ok(())
}

/// Truncate to `width` characters, marking cut text with "..."
fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}

/// Remove entries whose files are gone
fn cleanup(cfg: &ResolvedConfig) -> Result<()> {
    let library = Library::open(cfg)?;
    let removed = library.remove_missing_files()?;

    if removed.is_empty() {
        println!("No missing files.");
    } else {
        for path in &removed {
            println!("Removed: {}", path.display());
        }
        println!("\nRemoved {} missing book(s)", removed.len());
    }

    Ok(())
}

/// Remove a single book
fn remove(cfg: &ResolvedConfig, path: &Path) -> Result<()> {
    let path = resolve_book_path(path)?;

    let library = Library::open(cfg)?;
    if library.remove(&path)? {
        println!("Removed: {}", path.display());
    } else {
        anyhow::bail!("Not in catalog: {}", path.display());
    }

    Ok(())
}

/// Resolve a user-supplied book path to its catalog key.
///
/// Scans store paths under a canonicalized root, so the parent directory is
/// canonicalized the same way. The file itself may already be gone.
fn resolve_book_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to determine current directory")?
            .join(path)
    };

    let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        anyhow::bail!("Not a file path: {}", path.display());
    };

    let parent = std::fs::canonicalize(parent)
        .with_context(|| format!("Failed to resolve directory: {}", parent.display()))?;
    Ok(parent.join(name))
}

/// Reset the catalog
fn reset(cfg: &ResolvedConfig, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to reset the catalog without --yes");
    }

    let library = Library::open(cfg)?;
    library.reset()?;
    println!("Catalog reset: {}", cfg.database_path().display());

    Ok(())
}

/// List Zathura bookmarks standalone
async fn bookmarks(cfg: &ResolvedConfig) -> Result<()> {
    let db = cfg
        .zathura_db
        .as_ref()
        .context("Zathura adapter is disabled in the configuration")?;

    let library = Library::open(cfg)?;
    let bookmarks = ZathuraAdapter::new(db)
        .bookmarks(library.extractor())
        .await
        .with_context(|| format!("Failed to read Zathura bookmarks: {}", db.display()))?;

    if bookmarks.is_empty() {
        println!("No bookmarks found.");
        return Ok(());
    }

    println!("{:<50} {:>6}  {}", "TITLE", "PAGE", "FILE");
    println!("{}", "-".repeat(90));
    for bookmark in &bookmarks {
        println!(
            "{:<50} {:>6}  {}",
            truncate(&bookmark.title, 50),
            bookmark.page,
            bookmark.path.display()
        );
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let display = |p: &Option<PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(disabled)".to_string())
    };

    println!("booklib configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Catalog:   {}", cfg.database_path().display());
    println!(
        "  Scan root: {}",
        cfg.scan_root
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!();
    println!("Readers:");
    println!("  Zathura:   {}", display(&cfg.zathura_db));
    println!("  Foliate:   {}", display(&cfg.foliate_dir));
    println!();
    println!("Extraction:");
    println!("  exiftool:     {}", cfg.extraction.exiftool);
    println!("  Timeout:      {}s", cfg.extraction.timeout_seconds);
    println!("  Concurrency:  {}", cfg.extraction.concurrency);
    println!("  Refresh stale: {}", cfg.refresh_stale);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Война и мир и ещё", 8), "Война...");
    }

    #[test]
    fn test_resolve_book_path_normalizes_parent() {
        let temp = tempfile::TempDir::new().unwrap();
        let books = temp.path().join("Books");
        std::fs::create_dir_all(&books).unwrap();

        let messy = temp.path().join(".").join("Books").join("..").join("Books").join("gone.pdf");
        let resolved = resolve_book_path(&messy).unwrap();

        assert_eq!(resolved, books.canonicalize().unwrap().join("gone.pdf"));
    }

    #[test]
    fn test_cli_parses_search() {
        let cli = Cli::try_parse_from(["booklib", "search", "dune", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Search { ref term, json: true, limit: None } if term == "dune"
        ));
    }

    #[test]
    fn test_cli_parses_list_format() {
        let cli = Cli::try_parse_from(["booklib", "list", "--format", "epub"]).unwrap();
        match cli.command {
            Commands::List { format: Some(f), .. } => {
                assert_eq!(BookFormat::from(f), BookFormat::Epub)
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
