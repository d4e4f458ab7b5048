use std::str::FromStr;

use bigdecimal::BigDecimal;

use super::temporal;
use crate::driver::{Bind, NativeValue, RawColumn, RawOutValue};
use crate::error::SqlBridgeError;
use crate::results::{ColumnMeta, RowSet};
use crate::types::{RowValues, SqlType};

/// Decode a single native value under its column's type tag.
///
/// NULL decodes to [`RowValues::Null`] under any tag. Untagged values are inferred from their
/// native form. Returns the reason on mismatch.
pub fn decode_value(value: NativeValue, tag: Option<&SqlType>) -> Result<RowValues, String> {
    if matches!(value, NativeValue::Null) {
        return Ok(RowValues::Null);
    }
    let Some(tag) = tag else {
        return Ok(infer(value));
    };

    let decoded = match (tag, value) {
        (SqlType::Boolean, NativeValue::Bool(b)) => RowValues::Bool(b),
        (SqlType::Boolean, NativeValue::Integer(i @ (0 | 1))) => RowValues::Bool(i == 1),

        (SqlType::SmallInt | SqlType::Integer | SqlType::BigInt, NativeValue::Integer(i)) => {
            RowValues::Int(i)
        }

        (SqlType::Real | SqlType::Double, NativeValue::Real(f)) => RowValues::Float(f),
        #[allow(clippy::cast_precision_loss)]
        (SqlType::Real | SqlType::Double, NativeValue::Integer(i)) => RowValues::Float(i as f64),

        (SqlType::Decimal, NativeValue::Decimal(d)) => RowValues::Decimal(d),
        (SqlType::Decimal, NativeValue::Integer(i)) => RowValues::Decimal(BigDecimal::from(i)),
        (SqlType::Decimal, NativeValue::Text(s)) => RowValues::Decimal(
            BigDecimal::from_str(s.trim()).map_err(|e| format!("`{s}` is not a decimal: {e}"))?,
        ),
        (SqlType::Decimal, NativeValue::Real(f)) if f.is_finite() => RowValues::Decimal(
            BigDecimal::from_str(&f.to_string()).map_err(|e| format!("{f} is not a decimal: {e}"))?,
        ),

        (SqlType::Char | SqlType::Varchar | SqlType::Clob, NativeValue::Text(s)) => RowValues::Text(s),
        (SqlType::Binary | SqlType::Blob, NativeValue::Blob(bytes)) => RowValues::Blob(bytes),

        (SqlType::Date, NativeValue::Date(d)) => RowValues::Date(d),
        (SqlType::Date, NativeValue::Text(s)) => {
            RowValues::Date(temporal::parse_date(&s).ok_or_else(|| format!("`{s}` is not a date"))?)
        }
        (SqlType::Time, NativeValue::Time(t)) => RowValues::Time(t),
        (SqlType::Time, NativeValue::Text(s)) => {
            RowValues::Time(temporal::parse_time(&s).ok_or_else(|| format!("`{s}` is not a time"))?)
        }

        (SqlType::Timestamp | SqlType::TimestampWithTimezone, NativeValue::Timestamp(naive)) => {
            RowValues::Timestamp(temporal::naive_as_utc(naive))
        }
        (SqlType::Timestamp | SqlType::TimestampWithTimezone, NativeValue::TimestampTz(dt)) => {
            RowValues::Timestamp(dt)
        }
        (SqlType::Timestamp | SqlType::TimestampWithTimezone, NativeValue::Text(s)) => {
            RowValues::Timestamp(
                temporal::parse_timestamp(&s).ok_or_else(|| format!("`{s}` is not a timestamp"))?,
            )
        }
        (SqlType::Timestamp | SqlType::TimestampWithTimezone, NativeValue::Integer(secs)) => {
            RowValues::Timestamp(
                temporal::from_epoch_seconds(secs)
                    .ok_or_else(|| format!("{secs} is out of range for an epoch timestamp"))?,
            )
        }

        (SqlType::Json, NativeValue::Text(s)) => RowValues::JSON(
            serde_json::from_str(&s).map_err(|e| format!("invalid json: {e}"))?,
        ),

        (SqlType::Other(name), _) => return Err(format!("unsupported column type `{name}`")),
        (tag, value) => {
            return Err(format!("{} value does not match declared type {tag}", native_kind(&value)));
        }
    };
    Ok(decoded)
}

fn infer(value: NativeValue) -> RowValues {
    match value {
        NativeValue::Null => RowValues::Null,
        NativeValue::Bool(b) => RowValues::Bool(b),
        NativeValue::Integer(i) => RowValues::Int(i),
        NativeValue::Real(f) => RowValues::Float(f),
        NativeValue::Decimal(d) => RowValues::Decimal(d),
        NativeValue::Text(s) => RowValues::Text(s),
        NativeValue::Blob(b) => RowValues::Blob(b),
        NativeValue::Date(d) => RowValues::Date(d),
        NativeValue::Time(t) => RowValues::Time(t),
        NativeValue::Timestamp(naive) => RowValues::Timestamp(temporal::naive_as_utc(naive)),
        NativeValue::TimestampTz(dt) => RowValues::Timestamp(dt),
    }
}

fn native_kind(value: &NativeValue) -> &'static str {
    match value {
        NativeValue::Null => "null",
        NativeValue::Bool(_) => "boolean",
        NativeValue::Integer(_) => "integer",
        NativeValue::Real(_) => "real",
        NativeValue::Decimal(_) => "decimal",
        NativeValue::Text(_) => "text",
        NativeValue::Blob(_) => "blob",
        NativeValue::Date(_) => "date",
        NativeValue::Time(_) => "time",
        NativeValue::Timestamp(_) => "timestamp",
        NativeValue::TimestampTz(_) => "timestamptz",
    }
}

/// Decode every row of a result. The first mismatch fails the whole set.
pub(super) fn decode_rows(
    columns: Vec<RawColumn>,
    rows: Vec<Vec<NativeValue>>,
) -> Result<RowSet, SqlBridgeError> {
    let mut decoded = Vec::with_capacity(rows.len());
    for (row_idx, row) in rows.into_iter().enumerate() {
        if row.len() != columns.len() {
            return Err(SqlBridgeError::DecodeError(format!(
                "row {}: driver returned {} value(s) for {} column(s)",
                row_idx + 1,
                row.len(),
                columns.len()
            )));
        }
        let mut values = Vec::with_capacity(row.len());
        for (col_idx, (value, column)) in row.into_iter().zip(&columns).enumerate() {
            let value = decode_value(value, column.type_tag.as_ref()).map_err(|reason| {
                SqlBridgeError::DecodeError(format!(
                    "row {}, column {} (`{}`): {reason}",
                    row_idx + 1,
                    col_idx + 1,
                    column.name
                ))
            })?;
            values.push(value);
        }
        decoded.push(values);
    }

    let metas = columns
        .into_iter()
        .enumerate()
        .map(|(position, col)| ColumnMeta {
            name: col.name,
            position,
            sql_type: col.type_tag,
        })
        .collect();
    Ok(RowSet::from_rows(metas, decoded))
}

/// Build the one-row output set from OUT/INOUT values, decoding each by its registered type.
///
/// Returns `None` when the statement registered no OUT/INOUT parameters.
pub(super) fn decode_outputs(
    binds: &[Bind],
    mut out_values: Vec<RawOutValue>,
) -> Result<Option<RowSet>, SqlBridgeError> {
    let mut metas = Vec::new();
    let mut values = Vec::new();

    for (idx, bind) in binds.iter().enumerate() {
        let sql_type = match bind {
            Bind::In(_) => continue,
            Bind::Out(sql_type) | Bind::InOut(sql_type, _) => sql_type,
        };
        let position = idx + 1;
        let raw = out_values
            .iter()
            .position(|out| out.position == position)
            .map(|found| out_values.swap_remove(found))
            .ok_or_else(|| {
                SqlBridgeError::DecodeError(format!(
                    "driver returned no value for OUT parameter {position}"
                ))
            })?;
        let name = raw.name.unwrap_or_else(|| position.to_string());
        let value = decode_value(raw.value, Some(sql_type)).map_err(|reason| {
            SqlBridgeError::DecodeError(format!("OUT parameter {position} (`{name}`): {reason}"))
        })?;
        metas.push(ColumnMeta {
            name,
            position: metas.len(),
            sql_type: Some(sql_type.clone()),
        });
        values.push(value);
    }

    if metas.is_empty() {
        return Ok(None);
    }
    Ok(Some(RowSet::output(metas, values)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn null_decodes_under_any_tag() {
        for tag in [SqlType::Integer, SqlType::Timestamp, SqlType::Other("GEOMETRY".into())] {
            assert_eq!(decode_value(NativeValue::Null, Some(&tag)), Ok(RowValues::Null));
        }
    }

    #[test]
    fn timestamp_tag_accepts_text_and_epoch() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap().fixed_offset();
        let from_text =
            decode_value(NativeValue::Text("2024-01-02 03:04:05".into()), Some(&SqlType::Timestamp));
        assert_eq!(from_text, Ok(RowValues::Timestamp(expected)));

        let from_epoch =
            decode_value(NativeValue::Integer(expected.timestamp()), Some(&SqlType::Timestamp));
        assert_eq!(from_epoch, Ok(RowValues::Timestamp(expected)));
    }

    #[test]
    fn decimal_precision_is_preserved() {
        let decoded = decode_value(
            NativeValue::Text("12345678901234567890.000123".into()),
            Some(&SqlType::Decimal),
        )
        .unwrap();
        assert_eq!(decoded.as_decimal().unwrap().to_string(), "12345678901234567890.000123");
    }

    #[test]
    fn mismatch_names_row_and_column() {
        let columns = vec![
            RawColumn {
                name: "id".into(),
                type_tag: Some(SqlType::Integer),
            },
            RawColumn {
                name: "created".into(),
                type_tag: Some(SqlType::Timestamp),
            },
        ];
        let rows = vec![
            vec![NativeValue::Integer(1), NativeValue::Text("2024-01-01 00:00:00".into())],
            vec![NativeValue::Integer(2), NativeValue::Text("not a time".into())],
        ];
        let err = decode_rows(columns, rows).unwrap_err();
        assert!(
            matches!(&err, SqlBridgeError::DecodeError(msg) if msg.starts_with("row 2, column 2 (`created`)")),
            "{err}"
        );
    }

    #[test]
    fn untagged_columns_infer() {
        assert_eq!(decode_value(NativeValue::Real(1.5), None), Ok(RowValues::Float(1.5)));
        assert_eq!(
            decode_value(NativeValue::Text("x".into()), Some(&SqlType::Integer)).map_err(|_| ()),
            Err(())
        );
    }

    #[test]
    fn outputs_follow_bind_order() {
        let binds = vec![
            Bind::In(NativeValue::Text("John".into())),
            Bind::Out(SqlType::Varchar),
            Bind::InOut(SqlType::Integer, NativeValue::Integer(2)),
        ];
        let out_values = vec![
            RawOutValue {
                position: 3,
                name: None,
                value: NativeValue::Integer(4),
            },
            RawOutValue {
                position: 2,
                name: Some("lastname".into()),
                value: NativeValue::Text("Doe".into()),
            },
        ];
        let set = decode_outputs(&binds, out_values).unwrap().unwrap();
        assert!(set.is_output());
        let row = set.first().unwrap();
        assert_eq!(row.get_text("lastname"), Some("Doe"));
        assert_eq!(row.get_int("3"), Some(4));
        assert_eq!(set.columns().names(), vec!["lastname", "3"]);
    }
}
