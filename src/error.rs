use std::time::Duration;

use thiserror::Error;

/// Failure reported by a blocking driver adapter.
///
/// The pipeline wraps these into [`SqlBridgeError::Driver`]. [`DriverError::is_fatal`] decides
/// whether the physical connection is discarded from the pool afterwards.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to open connection: {0}")]
    Connect(String),

    #[error("connection is no longer usable: {0}")]
    Broken(String),

    #[error("statement rejected by driver: {0}")]
    Statement(String),

    #[error("unsupported by driver: {0}")]
    Unsupported(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl DriverError {
    /// Whether the error means the physical connection must not be reused.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::Connect(_) | DriverError::Broken(_) => true,
            DriverError::Statement(_) | DriverError::Unsupported(_) => false,
            #[cfg(feature = "sqlite")]
            DriverError::Sqlite(err) => sqlite_error_is_fatal(err),
        }
    }
}

#[cfg(feature = "sqlite")]
fn sqlite_error_is_fatal(err: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    match err {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::SystemIoFailure
                | ErrorCode::OutOfMemory
        ),
        rusqlite::Error::InvalidPath(_) => true,
        _ => false,
    }
}

#[derive(Debug, Error)]
pub enum SqlBridgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pool closed")]
    PoolClosed,

    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    #[error("Pool wait queue is full ({0} requests waiting)")]
    PoolExhausted(usize),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Statement error: {0}")]
    StatementError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Worker pool rejected the task: {0}")]
    WorkerRejected(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Lease already released")]
    LeaseReleased,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl SqlBridgeError {
    /// True for failures that concern the health of a physical connection (opening it, or losing
    /// it mid-use). Retry policy is left to the caller.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            SqlBridgeError::ConnectionError(_) => true,
            SqlBridgeError::Driver(err) => err.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqlBridgeError {
    fn from(err: rusqlite::Error) -> Self {
        SqlBridgeError::Driver(DriverError::Sqlite(err))
    }
}
