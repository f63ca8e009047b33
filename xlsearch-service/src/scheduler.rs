//! Background reindex loop

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use xlsearch_core::{Engine, ScanStats};

/// Run a reindex cycle every `period`, starting immediately.
///
/// Ticks that arrive while a cycle (or a reset) holds the writer are
/// coalesced. Cancelling `cancel` stops the loop after any in-flight cycle.
pub fn spawn_reindex_loop(
    engine: Arc<Engine>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_secs = period.as_secs(), "reindex loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            run_cycle(&engine).await;
        }

        tracing::info!("reindex loop stopped");
    })
}

/// Run one cycle off the async runtime. `None` if it was coalesced or failed.
pub async fn run_cycle(engine: &Arc<Engine>) -> Option<ScanStats> {
    let engine = Arc::clone(engine);
    match tokio::task::spawn_blocking(move || engine.try_reindex()).await {
        Ok(Ok(Some(stats))) => Some(stats),
        Ok(Ok(None)) => {
            tracing::debug!("writer busy, tick coalesced");
            None
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "reindex cycle failed; retrying next tick");
            None
        }
        Err(err) => {
            tracing::error!(error = %err, "reindex task aborted");
            None
        }
    }
}
