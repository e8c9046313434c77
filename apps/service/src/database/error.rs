use deadpool::managed::{BuildError, PoolError};
use thiserror::Error;

/// Failures of the probe log.
///
/// Writers treat `Unavailable` as retryable: the monitor loop logs it and
/// moves on to the next cycle. Readers surface it to their caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log store unavailable: {0}")]
    Unavailable(String),

    #[error("log record {id} is corrupt: {reason}")]
    Corrupt { id: i64, reason: String },
}

impl From<libsql::Error> for StoreError {
    fn from(error: libsql::Error) -> Self {
        StoreError::Unavailable(error.to_string())
    }
}

impl From<PoolError<libsql::Error>> for StoreError {
    fn from(error: PoolError<libsql::Error>) -> Self {
        StoreError::Unavailable(format!("connection pool: {error}"))
    }
}

impl From<BuildError> for StoreError {
    fn from(error: BuildError) -> Self {
        StoreError::Unavailable(format!("connection pool: {error}"))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        StoreError::Unavailable(error.to_string())
    }
}
