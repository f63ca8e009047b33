//! Single-writer engine shared by the background loop and request handlers

use crate::auth::{Authorizer, SharedSecret};
use crate::config::Config;
use crate::index::{status_from, walk_spreadsheets, IndexStatus, IndexStore, ScanStats};
use crate::query::{execute_search, SearchRequest, SearchResponse};
use crate::reader::{CalamineReader, SpreadsheetReader};
use serde::Serialize;
use std::sync::{
    Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};

/// Result of a reset request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    /// Index was cleared and rebuilt
    Completed(ScanStats),
    /// Secret did not match; nothing was touched
    Unauthorized,
    Failed(String),
}

/// Engine status for operators
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    #[serde(flatten)]
    pub index: IndexStatus,
    /// A reindex cycle or reset currently holds the writer
    pub indexing: bool,
}

/// Owns the index writer and answers searches.
///
/// Reindex cycles and resets serialize on the writer mutex. Searches open
/// their own read-only connection and only wait on `fence`, which is held
/// exclusively for the duration of a reset so no query sees a half-rebuilt
/// index.
///
/// A panic while either lock is held does not disable the engine: every
/// file commit is its own transaction, so the store is consistent and the
/// poisoned guard is recovered.
pub struct Engine {
    config: Config,
    reader: Box<dyn SpreadsheetReader>,
    authorizer: Box<dyn Authorizer>,
    writer: Mutex<IndexStore>,
    fence: RwLock<()>,
}

impl Engine {
    /// Open the store described by `config`. Failing here is fatal for the process.
    pub fn open(
        config: Config,
        reader: Box<dyn SpreadsheetReader>,
        authorizer: Box<dyn Authorizer>,
    ) -> crate::Result<Self> {
        let store = IndexStore::open(&config.core.db_path, &config.fts)?;
        tracing::info!(
            db = %config.core.db_path.display(),
            root = %config.core.watch_dir.display(),
            "index store opened"
        );

        Ok(Self {
            config,
            reader,
            authorizer,
            writer: Mutex::new(store),
            fence: RwLock::new(()),
        })
    }

    /// Calamine reader plus the configured shared secret
    pub fn with_defaults(config: Config) -> crate::Result<Self> {
        let authorizer = SharedSecret::new(&config.auth.secret);
        Self::open(config, Box::new(CalamineReader), Box::new(authorizer))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Search the index. Failures come back as an empty response with `error` set.
    pub fn search(&self, request: &SearchRequest) -> SearchResponse {
        match self.try_search(request) {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, query = %request.query, "search failed");
                SearchResponse::failed("internal error")
            }
        }
    }

    /// Search the index, surfacing store errors
    pub fn try_search(&self, request: &SearchRequest) -> crate::Result<SearchResponse> {
        let _fence = self.read_fence();
        let conn = IndexStore::open_reader(&self.config.core.db_path)?;
        execute_search(&conn, request, &self.config)
    }

    /// Run one reindex cycle unless another is already running.
    ///
    /// Returns `Ok(None)` when the cycle was coalesced into the running one.
    pub fn try_reindex(&self) -> crate::Result<Option<ScanStats>> {
        let mut store = match self.writer.try_lock() {
            Ok(store) => store,
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("reindex already in progress, skipping");
                return Ok(None);
            }
            Err(TryLockError::Poisoned(e)) => recover("writer", e),
        };
        store.scan(self.reader.as_ref(), &self.config).map(Some)
    }

    /// Run one reindex cycle, waiting for a running one to finish first
    pub fn reindex_now(&self) -> crate::Result<ScanStats> {
        let mut store = self.lock_writer();
        store.scan(self.reader.as_ref(), &self.config)
    }

    /// Clear the index and rebuild it from scratch.
    ///
    /// The secret is checked before anything else. The watched directory is
    /// listed before the store is cleared, so an unreachable root leaves the
    /// index as it was.
    pub fn reset_and_reindex(&self, secret: &str) -> ResetOutcome {
        if !self.authorizer.is_authorized(secret) {
            tracing::warn!("reset rejected: bad credentials");
            return ResetOutcome::Unauthorized;
        }

        let mut store = self.lock_writer();

        if let Err(err) = walk_spreadsheets(&self.config.core.watch_dir, &self.config) {
            tracing::error!(error = %err, "reset aborted before clearing the index");
            return ResetOutcome::Failed(err.to_string());
        }

        let _fence = self.write_fence();

        let removed = match store.reset_all() {
            Ok(removed) => removed,
            Err(err) => {
                tracing::error!(error = %err, "reset failed");
                return ResetOutcome::Failed(err.to_string());
            }
        };
        tracing::info!(files_removed = removed, "index cleared, rebuilding");

        match store.scan(self.reader.as_ref(), &self.config) {
            Ok(stats) => ResetOutcome::Completed(stats),
            Err(err) => {
                tracing::error!(error = %err, "rebuild after reset failed");
                ResetOutcome::Failed(err.to_string())
            }
        }
    }

    /// Current index status
    pub fn status(&self) -> crate::Result<EngineStatus> {
        let conn = IndexStore::open_reader(&self.config.core.db_path)?;
        let index = status_from(&conn, &self.config.core.db_path)?;
        let indexing = matches!(self.writer.try_lock(), Err(TryLockError::WouldBlock));
        Ok(EngineStatus { index, indexing })
    }

    fn lock_writer(&self) -> MutexGuard<'_, IndexStore> {
        self.writer.lock().unwrap_or_else(|e| recover("writer", e))
    }

    fn read_fence(&self) -> RwLockReadGuard<'_, ()> {
        self.fence.read().unwrap_or_else(|e| recover("fence", e))
    }

    fn write_fence(&self) -> RwLockWriteGuard<'_, ()> {
        self.fence.write().unwrap_or_else(|e| recover("fence", e))
    }
}

fn recover<G>(lock: &str, err: PoisonError<G>) -> G {
    tracing::warn!(lock = lock, "recovering lock poisoned by an earlier panic");
    err.into_inner()
}
