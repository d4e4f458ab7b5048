use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used for bound parameters and decoded columns, so helper code never needs to
/// branch on driver types:
/// ```rust
/// use sql_bridge::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Exact decimal value, precision as presented by the driver
    Decimal(BigDecimal),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timezone-aware timestamp
    Timestamp(DateTime<FixedOffset>),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        if let RowValues::Timestamp(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            RowValues::Decimal(value) => Some(value.clone()),
            RowValues::Int(value) => Some(BigDecimal::from(*value)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        if let RowValues::Date(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_time(&self) -> Option<NaiveTime> {
        if let RowValues::Time(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let RowValues::JSON(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// The SQL type a value is bound as when no type is declared for it.
    #[must_use]
    pub fn inferred_type(&self) -> Option<SqlType> {
        match self {
            RowValues::Int(_) => Some(SqlType::BigInt),
            RowValues::Float(_) => Some(SqlType::Double),
            RowValues::Decimal(_) => Some(SqlType::Decimal),
            RowValues::Text(_) => Some(SqlType::Varchar),
            RowValues::Bool(_) => Some(SqlType::Boolean),
            RowValues::Timestamp(_) => Some(SqlType::TimestampWithTimezone),
            RowValues::Date(_) => Some(SqlType::Date),
            RowValues::Time(_) => Some(SqlType::Time),
            RowValues::JSON(_) => Some(SqlType::Json),
            RowValues::Blob(_) => Some(SqlType::Blob),
            RowValues::Null => None,
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<BigDecimal> for RowValues {
    fn from(value: BigDecimal) -> Self {
        RowValues::Decimal(value)
    }
}

impl From<DateTime<FixedOffset>> for RowValues {
    fn from(value: DateTime<FixedOffset>) -> Self {
        RowValues::Timestamp(value)
    }
}

impl From<DateTime<chrono::Utc>> for RowValues {
    fn from(value: DateTime<chrono::Utc>) -> Self {
        RowValues::Timestamp(value.fixed_offset())
    }
}

impl From<NaiveDate> for RowValues {
    fn from(value: NaiveDate) -> Self {
        RowValues::Date(value)
    }
}

impl From<NaiveTime> for RowValues {
    fn from(value: NaiveTime) -> Self {
        RowValues::Time(value)
    }
}

impl From<JsonValue> for RowValues {
    fn from(value: JsonValue) -> Self {
        RowValues::JSON(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// SQL type tag, used to declare OUT/INOUT parameters and to describe result columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal,
    Char,
    Varchar,
    Clob,
    Binary,
    Blob,
    Date,
    Time,
    Timestamp,
    TimestampWithTimezone,
    Json,
    /// A type the codec has no mapping for; values under this tag only decode when NULL.
    Other(String),
}

impl SqlType {
    /// Map a declared column type to a tag.
    ///
    /// Temporal, decimal, boolean and JSON names are matched first, then SQLite's affinity rules
    /// (`INT`, `CHAR`/`CLOB`/`TEXT`, `BLOB`, `REAL`/`FLOA`/`DOUB`) so that `VARCHAR(50)` or
    /// `UNSIGNED BIG INT` land on the expected tag.
    #[must_use]
    pub fn from_declared(decl: &str) -> SqlType {
        let upper = decl.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or_default().trim();

        match base {
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => return SqlType::TimestampWithTimezone,
            "TIMESTAMP" | "DATETIME" | "TIMESTAMP WITHOUT TIME ZONE" => return SqlType::Timestamp,
            "DATE" => return SqlType::Date,
            "TIME" => return SqlType::Time,
            "BOOLEAN" | "BOOL" => return SqlType::Boolean,
            "DECIMAL" | "NUMERIC" => return SqlType::Decimal,
            "JSON" | "JSONB" => return SqlType::Json,
            "SMALLINT" | "TINYINT" => return SqlType::SmallInt,
            "BIGINT" => return SqlType::BigInt,
            "CHAR" | "CHARACTER" | "NCHAR" => return SqlType::Char,
            "CLOB" => return SqlType::Clob,
            "BINARY" | "VARBINARY" => return SqlType::Binary,
            _ => {}
        }

        if base.contains("INT") {
            SqlType::Integer
        } else if base.contains("CHAR") || base.contains("CLOB") || base.contains("TEXT") {
            SqlType::Varchar
        } else if base.contains("BLOB") {
            SqlType::Blob
        } else if base.contains("REAL") || base.contains("FLOA") || base.contains("DOUB") {
            SqlType::Double
        } else {
            SqlType::Other(decl.trim().to_owned())
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::Double => "DOUBLE",
            SqlType::Decimal => "DECIMAL",
            SqlType::Char => "CHAR",
            SqlType::Varchar => "VARCHAR",
            SqlType::Clob => "CLOB",
            SqlType::Binary => "BINARY",
            SqlType::Blob => "BLOB",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampWithTimezone => "TIMESTAMP WITH TIME ZONE",
            SqlType::Json => "JSON",
            SqlType::Other(name) => name.as_str(),
        };
        f.write_str(name)
    }
}
