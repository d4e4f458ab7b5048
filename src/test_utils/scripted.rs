use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::ConnectOptions;
use crate::driver::{
    Bind, BlockingConnection, Driver, DriverStatement, NativeValue, RawColumn, RawOutValue,
    RawResult,
};
use crate::error::DriverError;
use crate::types::SqlType;

#[derive(Debug, Default)]
struct ProbeInner {
    open: AtomicUsize,
    max_open: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    failing_connects: AtomicUsize,
    execute_delay_ms: AtomicU64,
    connect_delay_ms: AtomicU64,
    executions: Mutex<Vec<String>>,
}

/// Shared counters and knobs of a [`ScriptedDriver`]; clones observe the same driver.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    inner: Arc<ProbeInner>,
}

impl Probe {
    /// Physical connections currently open.
    #[must_use]
    pub fn open(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Highest number of connections that were open at the same time.
    #[must_use]
    pub fn max_open(&self) -> usize {
        self.inner.max_open.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// SQL text of every statement and batch executed, in execution order.
    #[must_use]
    pub fn executions(&self) -> Vec<String> {
        self.executions_guard().clone()
    }

    /// Make every execute sleep for `delay` on its blocking thread.
    pub fn set_execute_delay(&self, delay: Duration) {
        self.inner
            .execute_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.inner
            .connect_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.inner.failing_connects.store(count, Ordering::SeqCst);
    }

    fn executions_guard(&self) -> MutexGuard<'_, Vec<String>> {
        match self.inner.executions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, sql: &str) {
        self.executions_guard().push(sql.to_owned());
    }

    fn pause(millis: &AtomicU64) {
        let delay = millis.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
    }
}

/// Driver for the `mock:` scheme whose behavior is driven by the SQL text.
///
/// - SQL starting with `fatal` fails with a connection-fatal error
/// - SQL starting with `error` fails with a statement error
/// - SQL starting with `panic` panics on the worker thread
/// - `insert`/`update`/`delete` report one affected row
/// - `{call ...}` answers OUT parameters with `"out<position>"` (or the position for numeric
///   types) and echoes INOUT values
/// - anything else with binds returns one row echoing them as `p1..pn`; without binds, one row
///   with the SQL text in column `sql`
#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    probe: Probe,
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_probe(probe: Probe) -> Self {
        Self { probe }
    }

    #[must_use]
    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

impl Driver for ScriptedDriver {
    fn scheme(&self) -> &str {
        "mock"
    }

    fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn BlockingConnection>, DriverError> {
        let inner = &self.probe.inner;
        Probe::pause(&inner.connect_delay_ms);
        let failing = inner
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(DriverError::Connect("scripted connect failure".into()));
        }

        inner.connects.fetch_add(1, Ordering::SeqCst);
        let open = inner.open.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(ScriptedConnection {
            probe: self.probe.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct ScriptedConnection {
    probe: Probe,
}

impl ScriptedConnection {
    fn check_script(sql: &str) -> Result<(), DriverError> {
        let lowered = sql.trim_start().to_ascii_lowercase();
        if lowered.starts_with("fatal") {
            return Err(DriverError::Broken(format!("scripted fatal error: {sql}")));
        }
        if lowered.starts_with("error") {
            return Err(DriverError::Statement(format!("scripted statement error: {sql}")));
        }
        if lowered.starts_with("panic") {
            panic!("scripted panic: {sql}");
        }
        Ok(())
    }
}

fn bind_value(bind: &Bind) -> NativeValue {
    match bind {
        Bind::In(value) | Bind::InOut(_, value) => value.clone(),
        Bind::Out(_) => NativeValue::Null,
    }
}

impl BlockingConnection for ScriptedConnection {
    fn execute(&mut self, statement: &DriverStatement<'_>) -> Result<RawResult, DriverError> {
        self.probe.record(statement.sql);
        Probe::pause(&self.probe.inner.execute_delay_ms);
        Self::check_script(statement.sql)?;

        if statement.call.is_some() {
            let out_values = statement
                .binds
                .iter()
                .enumerate()
                .filter_map(|(idx, bind)| {
                    let value = match bind {
                        Bind::In(_) => return None,
                        Bind::InOut(_, value) => value.clone(),
                        Bind::Out(
                            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt,
                        ) => NativeValue::Integer(i64::try_from(idx + 1).unwrap_or(i64::MAX)),
                        Bind::Out(_) => NativeValue::Text(format!("out{}", idx + 1)),
                    };
                    Some(RawOutValue {
                        position: idx + 1,
                        name: None,
                        value,
                    })
                })
                .collect();
            return Ok(RawResult::update_count(0, None).with_out_values(out_values));
        }

        let lowered = statement.sql.trim_start().to_ascii_lowercase();
        if ["insert", "update", "delete"]
            .iter()
            .any(|verb| lowered.starts_with(verb))
        {
            return Ok(RawResult::update_count(1, None));
        }

        if statement.binds.is_empty() {
            return Ok(RawResult::rows(
                vec![RawColumn {
                    name: "sql".into(),
                    type_tag: Some(SqlType::Varchar),
                }],
                vec![vec![NativeValue::Text(statement.sql.to_owned())]],
            ));
        }

        let columns = (1..=statement.binds.len())
            .map(|i| RawColumn {
                name: format!("p{i}"),
                type_tag: None,
            })
            .collect();
        let row = statement.binds.iter().map(bind_value).collect();
        Ok(RawResult::rows(columns, vec![row]))
    }

    fn execute_batch(&mut self, sql: &str) -> Result<(), DriverError> {
        self.probe.record(sql);
        Probe::pause(&self.probe.inner.execute_delay_ms);
        Self::check_script(sql)
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        let inner = &self.probe.inner;
        inner.open.fetch_sub(1, Ordering::SeqCst);
        inner.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
