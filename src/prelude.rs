//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::client::{Pool, PreparedQuery, Query, SqlConnection, Transaction};
pub use crate::config::{ConnectOptions, PoolOptions};
pub use crate::driver::{Driver, DriverRegistry};
pub use crate::error::{DriverError, SqlBridgeError};
pub use crate::params;
pub use crate::pool::PoolStatus;
pub use crate::results::{ColumnMeta, Row, RowSet};
pub use crate::statement::{Param, Params};
pub use crate::types::{RowValues, SqlType};

#[cfg(feature = "sqlite")]
pub use crate::driver::sqlite::{Procedure, SqliteDriver};
