mod error;
mod routes;
mod scheduler;
mod state;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use state::{AppState, SharedState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use xlsearch_core::{Config, Engine};

#[derive(Parser, Debug)]
#[command(name = "xlsearch-service", version, about = "Search service for spreadsheet directories")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "XLSEARCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory to index (overrides core.watch_dir)
    #[arg(long, env = "XLSEARCH_ROOT")]
    root: Option<PathBuf>,

    /// Index database path (overrides core.db_path)
    #[arg(long, env = "XLSEARCH_DB")]
    db: Option<PathBuf>,

    /// Background reindex period, e.g. "30s" or "5m" (overrides core.reindex_interval)
    #[arg(long)]
    interval: Option<String>,

    /// Secret required by POST /reset (overrides auth.secret)
    #[arg(long, env = "XLSEARCH_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, default_value_t = 5000)]
    port: u16,
}

impl Args {
    fn load_config(&self) -> xlsearch_core::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(root) = &self.root {
            config.core.watch_dir = root.clone();
        }
        if let Some(db) = &self.db {
            config.core.db_path = db.clone();
        }
        if let Some(interval) = &self.interval {
            config.core.reindex_interval = interval.clone();
        }
        if let Some(secret) = &self.secret {
            config.auth.secret = secret.clone();
        }
        Ok(config)
    }
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/search", get(routes::search))
        .route("/reset", post(routes::reset))
        .route("/reindex", post(routes::reindex))
        .route("/status", get(routes::status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    if config.auth.secret.is_empty() {
        tracing::warn!("no secret configured; POST /reset is disabled");
    }

    let engine = Arc::new(Engine::with_defaults(config)?);
    let state: SharedState = Arc::new(AppState::new(Arc::clone(&engine)));

    let cancel = CancellationToken::new();
    let reindex_loop =
        scheduler::spawn_reindex_loop(engine, state.reindex_interval, cancel.clone());

    let addr = format!("{}:{}", args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "xlsearch-service listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    reindex_loop.await?;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels the background loop.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("shutting down");
    cancel.cancel();
}
