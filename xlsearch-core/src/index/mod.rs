//! Spreadsheet index with SQLite FTS5

mod file_discovery;
mod pipeline;

pub use file_discovery::walk_spreadsheets;
pub use pipeline::{file_mtime_ns, ScanStats};

use crate::config::FtsConfig;
use crate::error::XlsearchError;
use crate::reader::SheetRows;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

// v2: trigram tokenizer for substring matching
const SCHEMA_VERSION: i32 = 2;

/// Index status information
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub files_indexed: usize,
    pub entries: usize,
    pub schema_version: i32,
    pub index_size_bytes: u64,
    pub last_indexed: Option<String>,
}

/// The single writer over the index database.
///
/// Queries go through their own read-only connections from
/// [`IndexStore::open_reader`]; WAL mode lets them read the last committed
/// state while this connection writes.
pub struct IndexStore {
    pub(crate) db_path: PathBuf,
    pub(crate) conn: Connection,
}

impl IndexStore {
    /// Open or create the index at `db_path`
    pub fn open(db_path: &Path, fts: &FtsConfig) -> crate::Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn, &fts.tokenizer)?;

        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn,
        })
    }

    /// Open a read-only connection for the query path
    pub fn open_reader(db_path: &Path) -> crate::Result<Connection> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Initialize database schema
    fn init_schema(conn: &Connection, tokenizer: &str) -> crate::Result<()> {
        // WAL keeps readers off the writer's back
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version != 0 && version != SCHEMA_VERSION {
            return Err(XlsearchError::SchemaVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }

        if version == 0 {
            let tokenizer = tokenizer.replace('\'', "''");
            conn.execute_batch(&format!(
                "
                -- One row per tracked spreadsheet
                CREATE TABLE IF NOT EXISTS files (
                    id INTEGER PRIMARY KEY,
                    path TEXT UNIQUE NOT NULL,
                    mtime_ns INTEGER NOT NULL,
                    indexed_at INTEGER NOT NULL
                );

                -- One row per non-empty spreadsheet row
                CREATE TABLE IF NOT EXISTS entries (
                    id INTEGER PRIMARY KEY,
                    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                    sheet_name TEXT NOT NULL,
                    row_index INTEGER NOT NULL,
                    content TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_entries_file ON entries(file_id);

                -- Full-text index; rowid = entries.id
                CREATE VIRTUAL TABLE IF NOT EXISTS entries_fts USING fts5(
                    content,
                    tokenize='{tokenizer}'
                );

                PRAGMA user_version = {SCHEMA_VERSION};
                "
            ))?;
        }

        Ok(())
    }

    /// Insert or refresh the metadata row for `path`, keeping its id stable
    pub fn upsert_file(&mut self, path: &str, mtime_ns: i64) -> crate::Result<i64> {
        let tx = self.conn.transaction()?;
        let file_id = upsert_file_in(&tx, path, mtime_ns)?;
        tx.commit()?;
        Ok(file_id)
    }

    /// Swap every entry of `file_id` for `sheets` in one transaction
    pub fn replace_entries(&mut self, file_id: i64, sheets: &[SheetRows]) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        let written = replace_entries_in(&tx, file_id, sheets)?;
        tx.commit()?;
        Ok(written)
    }

    /// Record a freshly extracted revision of `path`.
    ///
    /// Metadata upsert and entry replacement share one transaction, so on
    /// failure neither the entries nor the stored mtime change.
    pub fn commit_file(
        &mut self,
        path: &str,
        mtime_ns: i64,
        sheets: &[SheetRows],
    ) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        let file_id = upsert_file_in(&tx, path, mtime_ns)?;
        let written = replace_entries_in(&tx, file_id, sheets)?;
        tx.commit()?;
        Ok(written)
    }

    /// Stored mtime of every tracked file, keyed by path
    pub fn stored_mtimes(&self) -> crate::Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare("SELECT path, mtime_ns FROM files")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut map = HashMap::new();
        for row in rows {
            let (path, mtime): (String, i64) = row?;
            map.insert(path, mtime);
        }
        Ok(map)
    }

    /// Stored mtime for a single path
    pub fn stored_mtime(&self, path: &str) -> crate::Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT mtime_ns FROM files WHERE path = ?",
                params![path],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Drop every file and entry. Returns the number of files removed.
    pub fn reset_all(&mut self) -> crate::Result<usize> {
        let tx = self.conn.transaction()?;
        let count: i64 = tx.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        tx.execute("DELETE FROM entries_fts", [])?;
        tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM files", [])?;
        tx.commit()?;
        Ok(count as usize)
    }

    /// Get index status
    pub fn status(&self) -> crate::Result<IndexStatus> {
        status_from(&self.conn, &self.db_path)
    }
}

/// Index status read through any connection to the database at `db_path`
pub fn status_from(conn: &Connection, db_path: &Path) -> crate::Result<IndexStatus> {
    let files_indexed: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
    let entries: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;

    let last_indexed: Option<i64> = conn
        .query_row("SELECT MAX(indexed_at) FROM files", [], |row| row.get(0))
        .optional()?
        .flatten();

    let index_size_bytes = fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    let last_indexed = last_indexed.map(|ts| {
        let elapsed = unix_now() - ts;
        if elapsed < 60 {
            format!("{} seconds ago", elapsed)
        } else if elapsed < 3600 {
            format!("{} minutes ago", elapsed / 60)
        } else if elapsed < 86400 {
            format!("{} hours ago", elapsed / 3600)
        } else {
            format!("{} days ago", elapsed / 86400)
        }
    });

    Ok(IndexStatus {
        files_indexed: files_indexed as usize,
        entries: entries as usize,
        schema_version: SCHEMA_VERSION,
        index_size_bytes,
        last_indexed,
    })
}

fn upsert_file_in(conn: &Connection, path: &str, mtime_ns: i64) -> crate::Result<i64> {
    let file_id = conn.query_row(
        "INSERT INTO files (path, mtime_ns, indexed_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(path) DO UPDATE SET
             mtime_ns = excluded.mtime_ns,
             indexed_at = excluded.indexed_at
         RETURNING id",
        params![path, mtime_ns, unix_now()],
        |row| row.get(0),
    )?;
    Ok(file_id)
}

/// Delete all entries of the file (every sheet), then insert the new set.
fn replace_entries_in(conn: &Connection, file_id: i64, sheets: &[SheetRows]) -> crate::Result<usize> {
    conn.execute(
        "DELETE FROM entries_fts WHERE rowid IN (SELECT id FROM entries WHERE file_id = ?)",
        params![file_id],
    )?;
    conn.execute("DELETE FROM entries WHERE file_id = ?", params![file_id])?;

    let mut insert_entry = conn.prepare_cached(
        "INSERT INTO entries (file_id, sheet_name, row_index, content) VALUES (?, ?, ?, ?)",
    )?;
    let mut insert_fts =
        conn.prepare_cached("INSERT INTO entries_fts (rowid, content) VALUES (?, ?)")?;

    let mut written = 0usize;
    for sheet in sheets {
        for row in &sheet.rows {
            let entry_id = insert_entry.insert(params![
                file_id,
                sheet.sheet_name,
                row.row_index as i64,
                row.content
            ])?;
            insert_fts.execute(params![entry_id, row.content])?;
            written += 1;
        }
    }

    Ok(written)
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::RowEntry;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> IndexStore {
        IndexStore::open(&dir.path().join("index.db"), &FtsConfig::default()).unwrap()
    }

    fn sheet(name: &str, rows: &[&str]) -> SheetRows {
        SheetRows {
            sheet_name: name.to_string(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(row_index, content)| RowEntry {
                    row_index,
                    content: content.to_string(),
                })
                .collect(),
        }
    }

    fn entry_rows(store: &IndexStore) -> Vec<(i64, String, i64, String)> {
        let mut stmt = store
            .conn
            .prepare("SELECT file_id, sheet_name, row_index, content FROM entries ORDER BY id")
            .unwrap();
        stmt.query_map([], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
    }

    #[test]
    fn test_upsert_keeps_file_id() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let first = store.upsert_file("/data/a.xlsx", 10).unwrap();
        let second = store.upsert_file("/data/a.xlsx", 20).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.stored_mtime("/data/a.xlsx").unwrap(), Some(20));

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_replace_entries_drops_removed_sheets() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let file_id = store.upsert_file("/data/a.xlsx", 1).unwrap();
        store
            .replace_entries(
                file_id,
                &[sheet("Jan", &["apple", "pear"]), sheet("Feb", &["plum"])],
            )
            .unwrap();
        assert_eq!(entry_rows(&store).len(), 3);

        store
            .replace_entries(file_id, &[sheet("Jan", &["cherry"])])
            .unwrap();
        let rows = entry_rows(&store);
        assert_eq!(rows, vec![(file_id, "Jan".to_string(), 0, "cherry".to_string())]);

        let fts_rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM entries_fts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fts_rows, 1);
    }

    #[test]
    fn test_replace_entries_leaves_other_files_alone() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        store
            .commit_file("/data/a.xlsx", 1, &[sheet("S", &["alpha"])])
            .unwrap();
        store
            .commit_file("/data/b.xlsx", 1, &[sheet("S", &["beta"])])
            .unwrap();
        store
            .commit_file("/data/a.xlsx", 2, &[sheet("S", &["gamma"])])
            .unwrap();

        let contents: Vec<String> = entry_rows(&store).into_iter().map(|r| r.3).collect();
        assert_eq!(contents, vec!["beta".to_string(), "gamma".to_string()]);
    }

    #[test]
    fn test_reset_all_clears_everything() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .commit_file("/data/a.xlsx", 1, &[sheet("S", &["alpha", "beta"])])
            .unwrap();

        assert_eq!(store.reset_all().unwrap(), 1);
        assert!(store.stored_mtimes().unwrap().is_empty());
        let status = store.status().unwrap();
        assert_eq!(status.files_indexed, 0);
        assert_eq!(status.entries, 0);
        assert!(status.last_indexed.is_none());
    }

    #[test]
    fn test_status_counts() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        store
            .commit_file(
                "/data/a.xlsx",
                1,
                &[sheet("Jan", &["a", "b", "c"]), sheet("Feb", &["d", "e"])],
            )
            .unwrap();

        let status = store.status().unwrap();
        assert_eq!(status.files_indexed, 1);
        assert_eq!(status.entries, 5);
        assert_eq!(status.schema_version, SCHEMA_VERSION);
        assert!(status.last_indexed.is_some());
    }

    #[test]
    fn test_schema_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("index.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        }

        let err = IndexStore::open(&db_path, &FtsConfig::default()).err().unwrap();
        assert!(matches!(
            err,
            XlsearchError::SchemaVersionMismatch { found: 99, .. }
        ));
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = open_store(&dir);
            store
                .commit_file("/data/a.xlsx", 7, &[sheet("S", &["alpha"])])
                .unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.stored_mtime("/data/a.xlsx").unwrap(), Some(7));
    }
}
