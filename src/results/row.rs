use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde_json::Value as JsonValue;

use crate::types::{RowValues, SqlType};

/// Description of one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    /// 0-based position in the row.
    pub position: usize,
    /// Declared type reported by the driver; `None` for untyped expression columns.
    pub sql_type: Option<SqlType>,
}

/// Columns shared by every row of a [`RowSet`](super::RowSet).
///
/// When several columns share a name, the name resolves to the first of them; the later ones
/// stay reachable by position only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    columns: Vec<ColumnMeta>,
    by_name: HashMap<String, usize>,
}

impl ColumnSet {
    #[must_use]
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        let mut by_name = HashMap::with_capacity(columns.len());
        for col in &columns {
            by_name.entry(col.name.clone()).or_insert(col.position);
        }
        Self { columns, by_name }
    }

    /// Position of `name`, trying an exact match before a case-insensitive one.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        if let Some(&idx) = self.by_name.get(name) {
            return Some(idx);
        }
        self.columns
            .iter()
            .find(|col| col.name.eq_ignore_ascii_case(name))
            .map(|col| col.position)
    }

    #[must_use]
    pub fn get(&self, position: usize) -> Option<&ColumnMeta> {
        self.columns.get(position)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnMeta> {
        self.columns.iter()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Anything a column can be looked up by: a 0-based position or a name.
pub trait ColumnIndex {
    fn resolve(&self, columns: &ColumnSet) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn resolve(&self, columns: &ColumnSet) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, columns: &ColumnSet) -> Option<usize> {
        columns.position(self)
    }
}

impl ColumnIndex for String {
    fn resolve(&self, columns: &ColumnSet) -> Option<usize> {
        columns.position(self)
    }
}

/// One immutable result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnSet>,
    values: Vec<RowValues>,
}

impl Row {
    #[must_use]
    pub fn new(columns: Arc<ColumnSet>, values: Vec<RowValues>) -> Self {
        Self { columns, values }
    }

    /// Value at a position or column name; `None` if the column does not exist.
    #[must_use]
    pub fn get<I: ColumnIndex>(&self, index: I) -> Option<&RowValues> {
        index
            .resolve(&self.columns)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_int<I: ColumnIndex>(&self, index: I) -> Option<i64> {
        self.get(index).and_then(RowValues::as_int).copied()
    }

    #[must_use]
    pub fn get_float<I: ColumnIndex>(&self, index: I) -> Option<f64> {
        self.get(index).and_then(RowValues::as_float)
    }

    #[must_use]
    pub fn get_text<I: ColumnIndex>(&self, index: I) -> Option<&str> {
        self.get(index).and_then(RowValues::as_text)
    }

    #[must_use]
    pub fn get_bool<I: ColumnIndex>(&self, index: I) -> Option<bool> {
        self.get(index).and_then(RowValues::as_bool).copied()
    }

    #[must_use]
    pub fn get_decimal<I: ColumnIndex>(&self, index: I) -> Option<BigDecimal> {
        self.get(index).and_then(RowValues::as_decimal)
    }

    #[must_use]
    pub fn get_timestamp<I: ColumnIndex>(&self, index: I) -> Option<DateTime<FixedOffset>> {
        self.get(index).and_then(RowValues::as_timestamp)
    }

    #[must_use]
    pub fn get_date<I: ColumnIndex>(&self, index: I) -> Option<NaiveDate> {
        self.get(index).and_then(RowValues::as_date)
    }

    #[must_use]
    pub fn get_time<I: ColumnIndex>(&self, index: I) -> Option<NaiveTime> {
        self.get(index).and_then(RowValues::as_time)
    }

    #[must_use]
    pub fn get_json<I: ColumnIndex>(&self, index: I) -> Option<&JsonValue> {
        self.get(index).and_then(RowValues::as_json)
    }

    #[must_use]
    pub fn get_blob<I: ColumnIndex>(&self, index: I) -> Option<&[u8]> {
        self.get(index).and_then(RowValues::as_blob)
    }

    /// True when the column exists and holds NULL.
    #[must_use]
    pub fn is_null<I: ColumnIndex>(&self, index: I) -> bool {
        self.get(index).is_some_and(RowValues::is_null)
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_row;

    #[test]
    fn duplicate_names_resolve_to_first_position() {
        let row = create_test_row(
            &["id", "name", "id"],
            vec![RowValues::Int(1), "ann".into(), RowValues::Int(2)],
        );
        assert_eq!(row.get_int("id"), Some(1));
        assert_eq!(row.get_int(2), Some(2));
        assert_eq!(row.get_text("NAME"), Some("ann"));
        assert!(row.get(3).is_none());
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn bool_reads_integer_flags_but_int_does_not_parse_text() {
        let row = create_test_row(&["flag", "n"], vec![RowValues::Int(1), "7".into()]);
        assert_eq!(row.get_bool("flag"), Some(true));
        assert_eq!(row.get_int("n"), None);
        assert!(!row.is_null("n"));
    }
}
