use crate::error::AppError;
use crate::state::SharedState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use xlsearch_core::{EngineStatus, ResetOutcome, ScanStats, SearchRequest, SearchResponse};

/// Split a comma-separated query parameter into its non-empty parts
fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// GET /search
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    /// Extra required terms, comma separated
    #[serde(default)]
    pub terms: Option<String>,
    /// Path fragments to exclude, comma separated
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl From<SearchParams> for SearchRequest {
    fn from(params: SearchParams) -> Self {
        SearchRequest {
            query: params.q.unwrap_or_default(),
            terms: split_list(params.terms),
            exclude: split_list(params.exclude),
            limit: params.limit,
            offset: params.offset.unwrap_or(0),
        }
    }
}

pub async fn search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<SearchResponse>) {
    let start = Instant::now();
    let request = SearchRequest::from(params);
    let query_label = request.query.clone();

    let engine = state.engine.clone();
    let response = match tokio::task::spawn_blocking(move || engine.search(&request)).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "search task aborted");
            SearchResponse::failed("internal error")
        }
    };

    tracing::info!(
        q = %query_label,
        count = response.count,
        duration_ms = start.elapsed().as_millis() as u64,
        "GET /search"
    );

    let status = if response.is_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

// POST /reset
#[derive(Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct ReindexResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ScanStats>,
}

pub async fn reset(
    State(state): State<SharedState>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<ReindexResponse>, AppError> {
    let start = Instant::now();
    let engine = state.engine.clone();
    let outcome =
        tokio::task::spawn_blocking(move || engine.reset_and_reindex(&req.password)).await?;

    tracing::info!(
        outcome = ?outcome,
        duration_ms = start.elapsed().as_millis() as u64,
        "POST /reset"
    );

    match outcome {
        ResetOutcome::Completed(stats) => Ok(Json(ReindexResponse {
            status: "reindexed".to_string(),
            stats: Some(stats),
        })),
        ResetOutcome::Unauthorized => Err(AppError::unauthorized()),
        ResetOutcome::Failed(reason) => Err(AppError::internal(reason)),
    }
}

// POST /reindex
pub async fn reindex(State(state): State<SharedState>) -> Result<Json<ReindexResponse>, AppError> {
    let engine = state.engine.clone();
    let result = tokio::task::spawn_blocking(move || engine.try_reindex()).await??;

    // Coalesce: a cycle is already running
    let response = match result {
        Some(stats) => ReindexResponse {
            status: "indexed".to_string(),
            stats: Some(stats),
        },
        None => ReindexResponse {
            status: "already_indexing".to_string(),
            stats: None,
        },
    };
    tracing::info!(status = %response.status, "POST /reindex");
    Ok(Json(response))
}

// GET /status
#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub engine: EngineStatus,
    pub watch_dir: String,
    pub reindex_interval_secs: u64,
}

pub async fn status(State(state): State<SharedState>) -> Result<Json<StatusResponse>, AppError> {
    let engine = state.engine.clone();
    let engine_status = tokio::task::spawn_blocking(move || engine.status()).await??;

    Ok(Json(StatusResponse {
        engine: engine_status,
        watch_dir: state.engine.config().core.watch_dir.display().to_string(),
        reindex_interval_secs: state.reindex_interval.as_secs(),
    }))
}
