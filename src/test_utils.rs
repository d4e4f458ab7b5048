//! Helpers for tests: an in-process scripted driver and small constructors.

mod scripted;

use std::sync::Arc;

pub use scripted::{Probe, ScriptedConnection, ScriptedDriver};

use crate::results::{ColumnMeta, ColumnSet, Row};
use crate::types::RowValues;

/// Create a test row with the given column names and values.
#[must_use]
pub fn create_test_row(column_names: &[&str], values: Vec<RowValues>) -> Row {
    let columns = column_names
        .iter()
        .enumerate()
        .map(|(position, name)| ColumnMeta {
            name: (*name).to_owned(),
            position,
            sql_type: None,
        })
        .collect();
    Row::new(Arc::new(ColumnSet::new(columns)), values)
}
