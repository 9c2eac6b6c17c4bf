//! Server-side metric state and its durability backends.
//!
//! [`MetricStore`] holds the live gauges and counters. A
//! [`PersistenceBackend`] mirrors that state to durable storage: either a JSON
//! snapshot file ([`file::FileBackend`]) or a SQL database with per-kind
//! upserts ([`sql::SqlBackend`]).

pub mod error;
pub mod file;
pub mod memory;
pub mod retry;
pub mod sql;


use async_trait::async_trait;
use tally_common::Metric;

pub use error::{Result, StorageError};
pub use file::FileBackend;
pub use memory::{MetricStore, Snapshot};
pub use retry::RetryPolicy;
pub use sql::SqlBackend;

/// Durable mirror of a [`MetricStore`].
///
/// Implementations are shared by every request handler, so they must be
/// `Send + Sync` and serialize their own writes.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Short backend name for logs (e.g. `"file"`, `"sqlite"`).
    fn name(&self) -> &str;

    /// Persists state after `applied` has been merged into `store`.
    ///
    /// Snapshot backends write the whole store and ignore `applied`; delta
    /// backends write only `applied`, letting the database accumulate counters.
    async fn write(&self, store: &MetricStore, applied: &[Metric]) -> Result<()>;

    /// Loads durable state into `store`. Absent state is not an error.
    async fn restore(&self, store: &MetricStore) -> Result<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Err(StorageError::NotConfigured)
    }
}
