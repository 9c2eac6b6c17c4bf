use crate::config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tally_common::Metric;
use tally_storage::{FileBackend, MetricStore, PersistenceBackend, SqlBackend, StorageError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How accepted updates reach durable storage.
pub enum Durability {
    /// Memory only.
    Disabled,
    /// Written after every accepted update, before the client gets a response.
    Sync(Arc<dyn PersistenceBackend>),
    /// Written by a background task every `interval`.
    Periodic {
        backend: Arc<dyn PersistenceBackend>,
        interval: Duration,
    },
}

/// The durability mode switch shared by all handlers.
pub struct Persistence {
    durability: Durability,
}

impl Persistence {
    pub fn new(durability: Durability) -> Self {
        Self { durability }
    }

    pub fn disabled() -> Self {
        Self::new(Durability::Disabled)
    }

    /// Selects the mode: a database DSN wins over the snapshot file; a zero
    /// store interval makes file writes synchronous.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, StorageError> {
        if let Some(dsn) = config.database_dsn() {
            let backend = SqlBackend::connect(dsn, config.db_op_timeout()).await?;
            return Ok(Self::new(Durability::Sync(Arc::new(backend))));
        }

        let path = config.file_storage_path.trim();
        if path.is_empty() {
            return Ok(Self::disabled());
        }

        let backend: Arc<dyn PersistenceBackend> = Arc::new(FileBackend::new(path));
        if config.store_interval_secs == 0 {
            Ok(Self::new(Durability::Sync(backend)))
        } else {
            Ok(Self::new(Durability::Periodic {
                backend,
                interval: config.store_interval(),
            }))
        }
    }

    fn backend(&self) -> Option<&Arc<dyn PersistenceBackend>> {
        match &self.durability {
            Durability::Disabled => None,
            Durability::Sync(backend) | Durability::Periodic { backend, .. } => Some(backend),
        }
    }

    /// Human-readable mode for startup logs, e.g. `"sync:file"`.
    pub fn describe(&self) -> String {
        match &self.durability {
            Durability::Disabled => "memory".to_string(),
            Durability::Sync(backend) => format!("sync:{}", backend.name()),
            Durability::Periodic { backend, interval } => {
                format!("periodic:{}:{}s", backend.name(), interval.as_secs())
            }
        }
    }

    pub async fn restore(&self, store: &MetricStore) -> Result<(), StorageError> {
        match self.backend() {
            Some(backend) => backend.restore(store).await,
            None => Ok(()),
        }
    }

    /// Persists an accepted update when the mode is synchronous.
    pub async fn after_update(
        &self,
        store: &MetricStore,
        applied: &[Metric],
    ) -> Result<(), StorageError> {
        match &self.durability {
            Durability::Sync(backend) => backend.write(store, applied).await,
            Durability::Disabled | Durability::Periodic { .. } => Ok(()),
        }
    }

    /// Writes the whole store now when the mode is periodic.
    pub async fn flush(&self, store: &MetricStore) -> Result<(), StorageError> {
        match &self.durability {
            Durability::Periodic { backend, .. } => backend.write(store, &[]).await,
            Durability::Disabled | Durability::Sync(_) => Ok(()),
        }
    }

    pub async fn ping(&self) -> Result<(), StorageError> {
        match self.backend() {
            Some(backend) => backend.ping().await,
            None => Err(StorageError::NotConfigured),
        }
    }

    /// Starts the periodic writer. It writes once more when `shutdown` fires.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        store: Arc<MetricStore>,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let Durability::Periodic { interval: every, .. } = &self.durability else {
            return None;
        };
        let every = *every;
        let persistence = self.clone();

        Some(tokio::spawn(async move {
            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        if let Err(e) = persistence.flush(&store).await {
                            tracing::error!(error = %e, "Periodic snapshot failed");
                        }
                    }
                }
            }

            match persistence.flush(&store).await {
                Ok(()) => tracing::info!("Final snapshot written"),
                Err(e) => tracing::error!(error = %e, "Final snapshot failed"),
            }
        }))
    }
}
