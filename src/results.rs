//! Decoded result shapes.

mod row;
mod row_set;

pub use row::{ColumnIndex, ColumnMeta, ColumnSet, Row};
pub use row_set::RowSet;
