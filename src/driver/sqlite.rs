//! rusqlite-backed blocking driver.
//!
//! URLs look like `sqlite::memory:`, `sqlite:/path/to/db.sqlite` or
//! `sqlite:file:name?mode=memory&cache=shared` (URI filenames are enabled, so several pooled
//! connections can share one in-memory database).

mod procedures;

use std::sync::Arc;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{OpenFlags, ToSql};

use crate::config::ConnectOptions;
use crate::error::DriverError;
use crate::sql::{CallArg, CallTarget};
use crate::types::SqlType;

use super::{
    BlockingConnection, Bind, Driver, DriverStatement, NativeValue, RawColumn, RawOutValue,
    RawResult,
};

pub use procedures::{ParamMode, Procedure, ProcedureCatalog, ProcedureParam};

/// Name given to the return value of `{? = call f(...)}`.
pub const RETURN_VALUE_NAME: &str = "return_value";

/// Driver for the `sqlite:` scheme.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    procedures: Arc<ProcedureCatalog>,
}

impl SqliteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_procedures(catalog: ProcedureCatalog) -> Self {
        Self {
            procedures: Arc::new(catalog),
        }
    }

    /// Add a routine callable through `{call ...}` on every connection this driver opens.
    #[must_use]
    pub fn with_procedure(mut self, procedure: Procedure) -> Self {
        Arc::make_mut(&mut self.procedures).register(procedure);
        self
    }

    #[must_use]
    pub fn procedures(&self) -> &ProcedureCatalog {
        &self.procedures
    }
}

impl Driver for SqliteDriver {
    fn scheme(&self) -> &str {
        "sqlite"
    }

    fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn BlockingConnection>, DriverError> {
        let target = options.target();
        let conn = if target.is_empty() || target == ":memory:" {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open_with_flags(target, OpenFlags::default())
        }
        .map_err(|err| DriverError::Connect(format!("sqlite `{target}`: {err}")))?;

        apply_properties(&conn, options)?;
        tracing::debug!(target, "opened sqlite connection");

        Ok(Box::new(SqliteConnection {
            conn,
            procedures: Arc::clone(&self.procedures),
        }))
    }
}

fn apply_properties(conn: &rusqlite::Connection, options: &ConnectOptions) -> Result<(), DriverError> {
    for (key, value) in &options.properties {
        match key.as_str() {
            "busy_timeout_ms" => {
                let millis = value.parse::<u64>().map_err(|_| {
                    DriverError::Connect(format!("busy_timeout_ms must be an integer, got `{value}`"))
                })?;
                conn.busy_timeout(Duration::from_millis(millis))?;
            }
            "statement_cache_capacity" => {
                let capacity = value.parse::<usize>().map_err(|_| {
                    DriverError::Connect(format!(
                        "statement_cache_capacity must be an integer, got `{value}`"
                    ))
                })?;
                conn.set_prepared_statement_cache_capacity(capacity);
            }
            "foreign_keys" => {
                let on = matches!(value.as_str(), "1" | "true" | "on");
                conn.pragma_update(None, "foreign_keys", on)?;
            }
            "journal_mode" => {
                let mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    value.as_str(),
                    |row| row.get(0),
                )?;
                tracing::debug!(journal_mode = %mode, "sqlite journal mode set");
            }
            other => {
                tracing::debug!(property = other, "ignoring unknown sqlite property");
            }
        }
    }
    Ok(())
}

/// One rusqlite connection plus the routines it can call.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    procedures: Arc<ProcedureCatalog>,
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.conn.path())
            .field("procedures", &self.procedures.len())
            .finish()
    }
}

impl BlockingConnection for SqliteConnection {
    fn execute(&mut self, statement: &DriverStatement<'_>) -> Result<RawResult, DriverError> {
        match statement.call {
            Some(call) => self.execute_call(call, statement.binds),
            None => self.execute_plain(statement.sql, statement.binds),
        }
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DriverError> {
        Ok(self.conn.execute_batch(sql)?)
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.conn.close().map_err(|(_, err)| DriverError::Sqlite(err))
    }
}

impl SqliteConnection {
    fn execute_plain(&mut self, sql: &str, binds: &[Bind]) -> Result<RawResult, DriverError> {
        let mut values = Vec::with_capacity(binds.len());
        for (idx, bind) in binds.iter().enumerate() {
            match bind {
                Bind::In(value) => values.push(
                    native_to_sqlite(value)
                        .map_err(|err| with_context(err, &format!("parameter {}", idx + 1)))?,
                ),
                Bind::Out(_) | Bind::InOut(..) => {
                    return Err(DriverError::Unsupported(format!(
                        "parameter {} is OUT/INOUT outside a call",
                        idx + 1
                    )));
                }
            }
        }
        let param_refs = values_as_tosql(&values);

        let mut stmt = self.conn.prepare_cached(sql)?;
        if stmt.column_count() > 0 {
            let columns = describe_columns(&stmt);
            let mut rows = stmt.query(&param_refs[..])?;
            let collected = collect_rows(&mut rows, columns.len())?;
            Ok(RawResult::rows(columns, collected))
        } else {
            let changed = stmt.execute(&param_refs[..])?;
            drop(stmt);
            Ok(self.update_count(changed))
        }
    }

    fn execute_call(&mut self, call: &CallTarget, binds: &[Bind]) -> Result<RawResult, DriverError> {
        let procedures = Arc::clone(&self.procedures);
        let procedure = procedures.get(&call.name).ok_or_else(|| {
            DriverError::Statement(format!("no procedure or function named `{}`", call.name))
        })?;

        if call.args.len() != procedure.params().len() {
            return Err(DriverError::Statement(format!(
                "`{}` expects {} argument(s), got {}",
                procedure.name(),
                procedure.params().len(),
                call.args.len()
            )));
        }
        if call.has_return && procedure.return_type().is_none() {
            return Err(DriverError::Statement(format!(
                "`{}` is a procedure and does not return a value",
                procedure.name()
            )));
        }

        let mut inputs = Vec::with_capacity(call.args.len());
        for (arg, param) in call.args.iter().zip(procedure.params()) {
            inputs.push(self.argument_value(procedure.name(), arg, param, binds)?);
        }

        let mut stmt = self.conn.prepare(procedure.body())?;
        for (param, value) in procedure.params().iter().zip(&inputs) {
            if let Some(idx) = stmt.parameter_index(&format!(":{}", param.name))? {
                stmt.raw_bind_parameter(idx, value)?;
            }
        }

        if !procedure.has_outputs() {
            if stmt.column_count() > 0 {
                let columns = describe_columns(&stmt);
                let mut rows = stmt.raw_query();
                let collected = collect_rows(&mut rows, columns.len())?;
                return Ok(RawResult::rows(columns, collected));
            }
            let changed = stmt.raw_execute()?;
            drop(stmt);
            return Ok(self.update_count(changed));
        }

        // Only a writing body can have changed rows; `changes()` would otherwise report the
        // previous statement's count.
        let readonly = stmt.readonly();
        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect();
        let first_row = {
            let mut rows = stmt.raw_query();
            match rows.next()? {
                Some(row) => Some(
                    (0..column_names.len())
                        .map(|i| row.get::<_, Value>(i))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                None => None,
            }
        };
        drop(stmt);

        let mut out_values = Vec::new();
        if call.has_return {
            let value = first_row
                .as_ref()
                .and_then(|row| row.first().cloned())
                .unwrap_or(Value::Null);
            out_values.push(RawOutValue {
                position: 1,
                name: Some(RETURN_VALUE_NAME.to_owned()),
                value: sqlite_to_native(value),
            });
        }
        for ((arg, param), input) in call.args.iter().zip(procedure.params()).zip(inputs) {
            let CallArg::Placeholder(position) = arg else {
                continue;
            };
            if param.mode == ParamMode::In {
                continue;
            }
            let produced = column_names
                .iter()
                .position(|name| name.eq_ignore_ascii_case(&param.name))
                .and_then(|idx| first_row.as_ref().and_then(|row| row.get(idx).cloned()));
            let value = match (produced, param.mode) {
                (Some(value), _) => value,
                (None, ParamMode::InOut) => input,
                (None, _) => Value::Null,
            };
            out_values.push(RawOutValue {
                position: *position,
                name: Some(param.name.clone()),
                value: sqlite_to_native(value),
            });
        }

        let changes = if readonly { 0 } else { self.conn.changes() };
        Ok(RawResult::update_count(u64::try_from(changes).unwrap_or(u64::MAX), None)
            .with_out_values(out_values))
    }

    fn argument_value(
        &self,
        routine: &str,
        arg: &CallArg,
        param: &ProcedureParam,
        binds: &[Bind],
    ) -> Result<Value, DriverError> {
        let mismatch = |expected: &str| {
            DriverError::Statement(format!(
                "parameter `{}` of `{routine}` is {expected}",
                param.name
            ))
        };

        match arg {
            CallArg::Literal(text) => {
                if param.mode != ParamMode::In {
                    return Err(mismatch("OUT/INOUT and needs a `?` placeholder"));
                }
                Ok(self
                    .conn
                    .query_row(&format!("SELECT {text}"), [], |row| row.get::<_, Value>(0))?)
            }
            CallArg::Placeholder(position) => {
                let bind = binds.get(position - 1).ok_or_else(|| {
                    DriverError::Statement(format!("no bind for placeholder {position}"))
                })?;
                match (param.mode, bind) {
                    (ParamMode::In, Bind::In(value)) | (ParamMode::InOut, Bind::InOut(_, value)) => {
                        native_to_sqlite(value).map_err(|err| {
                            with_context(err, &format!("parameter `{}` of `{routine}`", param.name))
                        })
                    }
                    (ParamMode::Out, Bind::Out(_)) => Ok(Value::Null),
                    (ParamMode::In, _) => Err(mismatch("IN")),
                    (ParamMode::Out, _) => Err(mismatch("OUT")),
                    (ParamMode::InOut, _) => Err(mismatch("INOUT")),
                }
            }
        }
    }

    fn update_count(&self, changed: usize) -> RawResult {
        let last_insert_id = (changed > 0).then(|| self.conn.last_insert_rowid());
        RawResult::update_count(u64::try_from(changed).unwrap_or(u64::MAX), last_insert_id)
    }
}

fn describe_columns(stmt: &rusqlite::Statement<'_>) -> Vec<RawColumn> {
    stmt.columns()
        .iter()
        .map(|col| RawColumn {
            name: col.name().to_owned(),
            type_tag: col.decl_type().map(SqlType::from_declared),
        })
        .collect()
}

fn collect_rows(
    rows: &mut rusqlite::Rows<'_>,
    col_count: usize,
) -> Result<Vec<Vec<NativeValue>>, DriverError> {
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            let value: Value = row.get(i)?;
            values.push(sqlite_to_native(value));
        }
        collected.push(values);
    }
    Ok(collected)
}

/// Most significant digits a decimal may carry; NUMERIC affinity stores anything wider as a
/// lossy REAL.
pub const MAX_DECIMAL_DIGITS: u64 = 15;

/// Convert a native bind value to a rusqlite `Value`.
///
/// SQLite has no temporal or decimal storage class: those travel as text in formats its date
/// functions understand (zoned timestamps normalized to UTC), decimals in plain notation.
///
/// # Errors
/// [`DriverError::Unsupported`] for a decimal with more than [`MAX_DECIMAL_DIGITS`]
/// significant digits.
pub fn native_to_sqlite(value: &NativeValue) -> Result<Value, DriverError> {
    if let NativeValue::Decimal(d) = value {
        let digits = d.normalized().digits();
        if digits > MAX_DECIMAL_DIGITS {
            return Err(DriverError::Unsupported(format!(
                "decimal {d} has {digits} significant digits, SQLite keeps at most {MAX_DECIMAL_DIGITS}"
            )));
        }
    }
    Ok(match value {
        NativeValue::Null => Value::Null,
        NativeValue::Bool(b) => Value::Integer(i64::from(*b)),
        NativeValue::Integer(i) => Value::Integer(*i),
        NativeValue::Real(f) => Value::Real(*f),
        NativeValue::Decimal(d) => Value::Text(d.to_string()),
        NativeValue::Text(s) => Value::Text(s.clone()),
        NativeValue::Blob(bytes) => Value::Blob(bytes.clone()),
        NativeValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        NativeValue::Time(t) => Value::Text(t.format("%H:%M:%S%.f").to_string()),
        NativeValue::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        NativeValue::TimestampTz(dt) => Value::Text(dt.naive_utc().format("%F %T%.f").to_string()),
    })
}

#[must_use]
pub fn sqlite_to_native(value: Value) -> NativeValue {
    match value {
        Value::Null => NativeValue::Null,
        Value::Integer(i) => NativeValue::Integer(i),
        Value::Real(f) => NativeValue::Real(f),
        Value::Text(s) => NativeValue::Text(s),
        Value::Blob(b) => NativeValue::Blob(b),
    }
}

fn with_context(err: DriverError, context: &str) -> DriverError {
    match err {
        DriverError::Unsupported(msg) => DriverError::Unsupported(format!("{context}: {msg}")),
        other => other,
    }
}

fn values_as_tosql(values: &[Value]) -> Vec<&dyn ToSql> {
    values.iter().map(|v| v as &dyn ToSql).collect()
}
