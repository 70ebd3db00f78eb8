//! Domain types for the book catalog.
//!
//! - `BookFormat`: the fixed set of indexed document formats
//! - `CatalogEntry`: one persisted row per known file
//! - `MergedBook`: a catalog entry enriched with reader state

pub mod book;

pub use book::{BookFormat, CatalogEntry, MergedBook};
