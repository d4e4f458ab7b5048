//! Async bridge over blocking SQL drivers.
//!
//! A [`Pool`](client::Pool) bounds and reuses physical connections opened by a blocking
//! [`Driver`](driver::Driver). Every driver call (connect, execute, close) runs on a bounded pool
//! of blocking workers, so async callers never block their runtime. Statements carry positional
//! parameters, including OUT/INOUT parameters for `{call ...}` escapes, and results come back as
//! typed [`RowSet`](results::RowSet)s.
//!
//! ```rust,no_run
//! use sql_bridge::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlBridgeError> {
//! let pool = Pool::new(
//!     &DriverRegistry::with_defaults(),
//!     ConnectOptions::new("sqlite::memory:"),
//!     PoolOptions::new(1),
//! )?;
//! let rows = pool
//!     .prepared_query("SELECT ? + 1 AS answer")
//!     .execute(params![41])
//!     .await?;
//! assert_eq!(rows.first().and_then(|r| r.get_int("answer")), Some(42));
//! # Ok(()) }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod sql;
pub mod statement;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{Pool, PreparedQuery, Query, SqlConnection, Transaction};
pub use config::{ConnectOptions, PoolOptions};
pub use driver::DriverRegistry;
pub use error::{DriverError, SqlBridgeError};
pub use results::{Row, RowSet};
pub use statement::{Param, Params, StatementSpec};
pub use types::{RowValues, SqlType};
