use sea_orm::{DbErr, RuntimeErr};
use std::time::Duration;
use tally_common::MetricKind;

/// Errors that can occur within the storage layer.
///
/// [`StorageError::is_transient`] separates failures worth retrying
/// (connection loss, serialization conflicts, lock contention, timeouts) from
/// failures that will repeat (constraint violations, bad SQL, full disks).
///
/// # Examples
///
/// ```rust
/// use tally_common::MetricKind;
/// use tally_storage::StorageError;
///
/// let err = StorageError::KindConflict {
///     id: "PollCount".to_string(),
///     existing: MetricKind::Counter,
/// };
/// assert!(err.to_string().contains("PollCount"));
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The id is already stored under the other metric kind.
    #[error("Storage: metric {id} is already stored as a {existing}")]
    KindConflict { id: String, existing: MetricKind },

    /// Snapshot file I/O failure.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] DbErr),

    /// A database statement exceeded its deadline before the commit.
    #[error("Storage: {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// A commit outlived its deadline. It may still have been applied, so
    /// retrying could apply counter deltas twice.
    #[error("Storage: commit timed out after {timeout:?}, outcome unknown")]
    CommitTimeout { timeout: Duration },

    /// The DSN names a database without `ON CONFLICT` upsert support.
    #[error("Storage: unsupported database backend: {0}")]
    UnsupportedBackend(String),

    /// The operation needs a database but none is configured.
    #[error("Storage: no database configured")]
    NotConfigured,
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(err) => is_transient_db_err(err),
            StorageError::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// SQLSTATE codes for serialization failures, deadlocks, admin shutdowns and
/// connection exhaustion, plus SQLite busy/locked result codes.
const TRANSIENT_CODES: &[&str] = &[
    "40001", "40P01", "53300", "57P01", "57P02", "57P03", "5", "6", "261", "262", "517",
];

fn is_transient_db_err(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            is_transient_sqlx(e)
        }
        _ => false,
    }
}

fn is_transient_sqlx(err: &sea_orm::sqlx::Error) -> bool {
    use sea_orm::sqlx::Error;

    match err {
        Error::Io(_) | Error::PoolTimedOut | Error::PoolClosed | Error::WorkerCrashed => true,
        Error::Database(db_err) => db_err.code().is_some_and(|code| {
            let code: &str = &code;
            // SQLSTATE class 08: connection exception
            code.starts_with("08") || TRANSIENT_CODES.contains(&code)
        }),
        _ => false,
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_transient() {
        let err = StorageError::Database(DbErr::Conn(RuntimeErr::Internal(
            "connection reset by peer".to_string(),
        )));
        assert!(err.is_transient());
    }

    #[test]
    fn timeouts_are_transient() {
        let err = StorageError::Timeout {
            operation: "write_batch",
            timeout: Duration::from_secs(1),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn commit_timeouts_are_not_retried() {
        let err = StorageError::CommitTimeout {
            timeout: Duration::from_secs(1),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn sql_and_io_errors_are_persistent() {
        assert!(!StorageError::Database(DbErr::Custom("syntax error".to_string())).is_transient());
        assert!(!StorageError::Io(std::io::Error::other("no space left on device")).is_transient());
        assert!(!StorageError::NotConfigured.is_transient());
    }
}
