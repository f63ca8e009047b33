//! xlsearch core - full-text search over directories of spreadsheets
//!
//! This library keeps a SQLite FTS5 index of every row of every sheet under
//! a watched directory, refreshes it incrementally by modification time,
//! and answers multi-term searches against it.

pub mod auth;
pub mod cell;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod query;
pub mod reader;

pub use auth::{Authorizer, SharedSecret};
pub use cell::CellValue;
pub use config::Config;
pub use engine::{Engine, EngineStatus, ResetOutcome};
pub use error::XlsearchError;
pub use index::{IndexStatus, IndexStore, ScanStats};
pub use query::{SearchHit, SearchRequest, SearchResponse};
pub use reader::{CalamineReader, RowIter, SheetRows, SpreadsheetReader, Workbook};

/// Result type alias for xlsearch operations
pub type Result<T> = std::result::Result<T, XlsearchError>;
