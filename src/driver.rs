//! Blocking driver boundary.
//!
//! A [`Driver`] opens physical connections; a [`BlockingConnection`] executes one statement at a
//! time and blocks the calling thread while doing so. Nothing in this module is async: the pool
//! and executor are responsible for keeping these calls off the runtime's core threads.

mod registry;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::config::ConnectOptions;
use crate::error::DriverError;
use crate::sql::CallTarget;
use crate::types::SqlType;

pub use registry::DriverRegistry;

/// Values as a driver produces and accepts them, before client-side typing.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    /// Exact numeric in the driver's own textual or structured form.
    Decimal(BigDecimal),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Timestamp without zone information.
    Timestamp(NaiveDateTime),
    /// Timestamp carrying an offset.
    TimestampTz(DateTime<FixedOffset>),
}

/// One positional bind, as registered with the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    In(NativeValue),
    Out(SqlType),
    InOut(SqlType, NativeValue),
}

/// Everything a driver needs to run one statement.
#[derive(Debug, Clone, Copy)]
pub struct DriverStatement<'a> {
    pub sql: &'a str,
    /// Present when the text is a `{call ...}` escape.
    pub call: Option<&'a CallTarget>,
    /// Binds in placeholder order (position `i + 1`).
    pub binds: &'a [Bind],
}

/// Column description reported by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    /// Declared/native type; `None` for untyped expression columns.
    pub type_tag: Option<SqlType>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    Rows {
        columns: Vec<RawColumn>,
        rows: Vec<Vec<NativeValue>>,
    },
    UpdateCount {
        count: u64,
        last_insert_id: Option<i64>,
    },
}

/// Value of an OUT/INOUT parameter read back after a callable statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutValue {
    /// 1-based parameter position.
    pub position: usize,
    pub name: Option<String>,
    pub value: NativeValue,
}

/// Driver-native outcome of one execute call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub outcome: RawOutcome,
    pub out_values: Vec<RawOutValue>,
}

impl RawResult {
    #[must_use]
    pub fn rows(columns: Vec<RawColumn>, rows: Vec<Vec<NativeValue>>) -> Self {
        Self {
            outcome: RawOutcome::Rows { columns, rows },
            out_values: Vec::new(),
        }
    }

    #[must_use]
    pub fn update_count(count: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            outcome: RawOutcome::UpdateCount {
                count,
                last_insert_id,
            },
            out_values: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_out_values(mut self, out_values: Vec<RawOutValue>) -> Self {
        self.out_values = out_values;
        self
    }
}

/// One physical connection. All methods block.
pub trait BlockingConnection: Send {
    /// Run a single statement with positional binds.
    ///
    /// # Errors
    /// Driver-native failures; [`DriverError::is_fatal`] marks the connection unusable.
    fn execute(&mut self, statement: &DriverStatement<'_>) -> Result<RawResult, DriverError>;

    /// Run a script of statements without parameters or results.
    ///
    /// # Errors
    /// Driver-native failures.
    fn execute_batch(&mut self, sql: &str) -> Result<(), DriverError>;

    /// # Errors
    /// Driver-native failures.
    fn begin(&mut self) -> Result<(), DriverError> {
        self.execute_batch("BEGIN")
    }

    /// # Errors
    /// Driver-native failures.
    fn commit(&mut self) -> Result<(), DriverError> {
        self.execute_batch("COMMIT")
    }

    /// # Errors
    /// Driver-native failures.
    fn rollback(&mut self) -> Result<(), DriverError> {
        self.execute_batch("ROLLBACK")
    }

    /// Close the physical connection.
    ///
    /// # Errors
    /// Failures while closing; the connection is gone either way.
    fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// Factory for physical connections, registered in a [`DriverRegistry`] under a URL scheme.
pub trait Driver: Send + Sync + fmt::Debug {
    /// Scheme this driver answers to, e.g. `"sqlite"`.
    fn scheme(&self) -> &str;

    /// Open a new physical connection. Blocks.
    ///
    /// # Errors
    /// [`DriverError::Connect`] (or a driver-specific fatal error) when the connection cannot be
    /// established.
    fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn BlockingConnection>, DriverError>;
}
