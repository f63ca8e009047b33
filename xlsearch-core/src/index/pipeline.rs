//! Change detection and the extract → commit pipeline.

use super::{walk_spreadsheets, IndexStore};
use crate::config::Config;
use crate::error::XlsearchError;
use crate::reader::{extract_workbook, SheetRows, SpreadsheetReader};
use serde::Serialize;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::{Instant, UNIX_EPOCH};

/// Statistics from one reindex cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub files_seen: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub entries_written: usize,
}

/// Modification time of `path` in nanoseconds since the Unix epoch.
pub fn file_mtime_ns(path: &Path) -> Option<i64> {
    fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
}

impl IndexStore {
    /// Walk `config.core.watch_dir` and reindex every new or modified spreadsheet.
    ///
    /// Only a failure to list the directory or read stored metadata aborts
    /// the cycle; a file that cannot be extracted or committed is logged,
    /// keeps its previous entries and mtime, and is retried next cycle.
    pub fn scan(
        &mut self,
        reader: &dyn SpreadsheetReader,
        config: &Config,
    ) -> crate::Result<ScanStats> {
        let started = Instant::now();
        let files = walk_spreadsheets(&config.core.watch_dir, config)?;
        let stored = self.stored_mtimes()?;

        let mut stats = ScanStats {
            files_seen: files.len(),
            ..ScanStats::default()
        };

        for file_path in &files {
            let path_key = file_path.to_string_lossy().to_string();

            let Some(mtime) = file_mtime_ns(file_path) else {
                tracing::warn!(path = %path_key, "cannot read modification time, skipping");
                stats.files_failed += 1;
                continue;
            };

            if let Some(&stored_mtime) = stored.get(&path_key) {
                if stored_mtime >= mtime {
                    stats.files_skipped += 1;
                    continue;
                }
            }

            // Extraction runs outside any transaction; readers keep the old revision meanwhile.
            let sheets = match extract_guarded(reader, file_path, config.indexing.skip_header) {
                Ok(sheets) => sheets,
                Err(err) => {
                    tracing::warn!(path = %path_key, error = %err, "extraction failed");
                    stats.files_failed += 1;
                    continue;
                }
            };

            match self.commit_file(&path_key, mtime, &sheets) {
                Ok(written) => {
                    tracing::info!(
                        path = %path_key,
                        sheets = sheets.len(),
                        entries = written,
                        "indexed spreadsheet"
                    );
                    stats.files_indexed += 1;
                    stats.entries_written += written;
                }
                Err(err) => {
                    tracing::error!(path = %path_key, error = %err, "index commit failed");
                    stats.files_failed += 1;
                }
            }
        }

        tracing::info!(
            seen = stats.files_seen,
            indexed = stats.files_indexed,
            skipped = stats.files_skipped,
            failed = stats.files_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "reindex cycle finished"
        );

        Ok(stats)
    }
}

/// Extract `path`, reporting a panicking reader as a failure of this file only
fn extract_guarded(
    reader: &dyn SpreadsheetReader,
    path: &Path,
    skip_header: bool,
) -> crate::Result<Vec<SheetRows>> {
    catch_unwind(AssertUnwindSafe(|| extract_workbook(reader, path, skip_header))).unwrap_or_else(
        |payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "(non-string panic)".to_string());
            Err(XlsearchError::extraction(
                path,
                format!("reader panicked: {message}"),
            ))
        },
    )
}
