use crate::error::Result;
use crate::memory::{MetricStore, Snapshot};
use crate::PersistenceBackend;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tally_common::Metric;
use tokio::sync::Mutex;

/// Snapshot file backend.
///
/// Each write serializes the whole store as one JSON line and overwrites the
/// file; the file is opened, written and closed within the call.
pub struct FileBackend {
    path: PathBuf,
    // Serializes writers so the last snapshot taken is the last one written.
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_unlocked(snapshot).await
    }

    async fn write_unlocked(&self, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    /// Reads the snapshot back. A missing or blank file yields `None`.
    pub async fn read_snapshot(&self) -> Result<Option<Snapshot>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(content.trim())?))
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn write(&self, store: &MetricStore, _applied: &[Metric]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = store.snapshot_all();
        self.write_unlocked(&snapshot).await
    }

    async fn restore(&self, store: &MetricStore) -> Result<()> {
        match self.read_snapshot().await? {
            Some(snapshot) => {
                tracing::info!(
                    path = %self.path.display(),
                    gauges = snapshot.gauges.len(),
                    counters = snapshot.counters.len(),
                    "Restored metrics from snapshot file"
                );
                store.replace(snapshot);
            }
            None => {
                tracing::info!(path = %self.path.display(), "No snapshot file, starting empty");
            }
        }
        Ok(())
    }
}
