//! Spreadsheet discovery under the watched directory.

use crate::config::Config;
use crate::error::XlsearchError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Prefix office suites use for lock files next to an open workbook.
const LOCK_FILE_PREFIX: &str = "~$";

/// Recursively list spreadsheets under `root` matching the configured glob.
///
/// Paths are returned sorted so every scan visits files in the same order.
pub fn walk_spreadsheets(root: &Path, config: &Config) -> crate::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(XlsearchError::RootNotFound(root.to_path_buf()));
    }

    let include = build_include_set(&config.indexing.glob)?;
    let ignore_set = build_ignore_set(&config.ignore.patterns)?;

    // A data directory is not a git checkout; look at everything.
    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false);
    builder.follow_links(true);

    let mut files = Vec::new();

    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::debug!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let is_lock_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOCK_FILE_PREFIX));
        if is_lock_file {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);

        if ignore_set.is_match(relative) {
            continue;
        }

        if include.is_match(relative) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn build_include_set(glob: &str) -> crate::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    builder.add(Glob::new(glob).map_err(|e| XlsearchError::GlobPattern(e.to_string()))?);
    builder
        .build()
        .map_err(|e| XlsearchError::GlobPattern(e.to_string()))
}

fn build_ignore_set(patterns: &[String]) -> crate::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob_pattern = if pattern.contains('*') || pattern.contains('?') {
            pattern.clone()
        } else {
            format!("**/{}", pattern)
        };
        if let Ok(g) = Glob::new(&glob_pattern) {
            builder.add(g);
        }
        if let Ok(g) = Glob::new(&format!("**/{}/**", pattern)) {
            builder.add(g);
        }
    }
    builder
        .build()
        .map_err(|e| XlsearchError::GlobPattern(e.to_string()))
}
