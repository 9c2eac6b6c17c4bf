use crate::config::ServerConfig;
use crate::persistence::Persistence;
use std::sync::Arc;
use tally_storage::MetricStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetricStore>,
    pub persistence: Arc<Persistence>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, persistence: Persistence) -> Self {
        Self {
            store: Arc::new(MetricStore::new()),
            persistence: Arc::new(persistence),
            config: Arc::new(config),
        }
    }

    pub fn signing_key(&self) -> Option<&[u8]> {
        self.config.signing_key().map(str::as_bytes)
    }
}
