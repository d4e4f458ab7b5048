use std::sync::Arc;

use super::row::{ColumnMeta, ColumnSet, Row};
use crate::types::RowValues;

/// Result of one statement execution.
///
/// A query yields its rows; an update yields an affected-row count. A callable statement with
/// OUT/INOUT parameters additionally yields a one-row *output* set, either as the result itself
/// (when the call produced no rows) or chained behind the rows through [`RowSet::next`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Arc<ColumnSet>,
    rows: Vec<Row>,
    rows_affected: u64,
    last_insert_id: Option<i64>,
    output: bool,
    next: Option<Box<RowSet>>,
}

impl RowSet {
    /// Rows of a query. `rows_affected` equals the number of rows, as for a fetch.
    #[must_use]
    pub fn from_rows(columns: Vec<ColumnMeta>, rows: Vec<Vec<RowValues>>) -> Self {
        let columns = Arc::new(ColumnSet::new(columns));
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        Self {
            rows_affected: u64::try_from(rows.len()).unwrap_or(u64::MAX),
            columns,
            rows,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from_update_count(count: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected: count,
            last_insert_id,
            ..Self::default()
        }
    }

    /// One-row set carrying OUT/INOUT values.
    #[must_use]
    pub fn output(columns: Vec<ColumnMeta>, values: Vec<RowValues>) -> Self {
        let mut set = Self::from_rows(columns, vec![values]);
        set.rows_affected = 0;
        set.output = true;
        set
    }

    /// Attach `next` behind this set (after any set already chained).
    #[must_use]
    pub fn chain(mut self, next: RowSet) -> Self {
        let tail = match self.next.take() {
            Some(existing) => (*existing).chain(next),
            None => next,
        };
        self.next = Some(Box::new(tail));
        self
    }

    #[must_use]
    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    /// Number of rows.
    #[must_use]
    pub fn size(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    #[must_use]
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// The set chained behind this one, if any.
    #[must_use]
    pub fn next(&self) -> Option<&RowSet> {
        self.next.as_deref()
    }

    /// Whether this set holds OUT/INOUT parameter values rather than query rows.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.output
    }

    /// The output set, whether it is this set or chained behind it.
    #[must_use]
    pub fn output_values(&self) -> Option<&RowSet> {
        let mut current = Some(self);
        while let Some(set) = current {
            if set.output {
                return Some(set);
            }
            current = set.next();
        }
        None
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
