use std::sync::Arc;
use std::time::Duration;
use xlsearch_core::Engine;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub engine: Arc<Engine>,
    pub reindex_interval: Duration,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        let reindex_interval = engine.config().reindex_interval();
        Self {
            engine,
            reindex_interval,
        }
    }
}
