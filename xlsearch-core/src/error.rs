//! Error types for xlsearch operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum XlsearchError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to extract {}: {message}", .path.display())]
    Extraction { path: PathBuf, message: String },

    #[error("Watched directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),

    #[error("Schema version mismatch: database is v{found}, expected v{expected}. Reset the index to rebuild it.")]
    SchemaVersionMismatch { found: i32, expected: i32 },
}

impl XlsearchError {
    pub fn extraction(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
