use std::str::FromStr;

use bigdecimal::{BigDecimal, ToPrimitive};

use crate::driver::{Bind, NativeValue};
use crate::error::SqlBridgeError;
use crate::statement::Param;
use crate::types::{RowValues, SqlType};

/// Largest integer magnitude an `f64` represents exactly.
const F64_EXACT_INT: u64 = 1 << 53;

/// Turn statement parameters into driver binds, in placeholder order.
///
/// # Errors
/// [`SqlBridgeError::ParameterError`] when an INOUT value cannot be represented losslessly as its
/// declared type.
pub fn encode_params(params: &[Param]) -> Result<Vec<Bind>, SqlBridgeError> {
    params
        .iter()
        .enumerate()
        .map(|(idx, param)| match param {
            Param::In(value) => Ok(Bind::In(to_native(value))),
            Param::Out(sql_type) => Ok(Bind::Out(sql_type.clone())),
            Param::InOut(sql_type, value) => coerce(value, sql_type)
                .map(|native| Bind::InOut(sql_type.clone(), native))
                .map_err(|reason| {
                    SqlBridgeError::ParameterError(format!("parameter {}: {reason}", idx + 1))
                }),
        })
        .collect()
}

/// Native form of a client value, inferred from the value itself.
#[must_use]
pub fn to_native(value: &RowValues) -> NativeValue {
    match value {
        RowValues::Int(i) => NativeValue::Integer(*i),
        RowValues::Float(f) => NativeValue::Real(*f),
        RowValues::Decimal(d) => NativeValue::Decimal(d.clone()),
        RowValues::Text(s) => NativeValue::Text(s.clone()),
        RowValues::Bool(b) => NativeValue::Bool(*b),
        RowValues::Timestamp(dt) => NativeValue::TimestampTz(*dt),
        RowValues::Date(d) => NativeValue::Date(*d),
        RowValues::Time(t) => NativeValue::Time(*t),
        RowValues::Null => NativeValue::Null,
        RowValues::JSON(json) => NativeValue::Text(json.to_string()),
        RowValues::Blob(bytes) => NativeValue::Blob(bytes.clone()),
    }
}

/// Convert `value` to `target` without losing information.
fn coerce(value: &RowValues, target: &SqlType) -> Result<NativeValue, String> {
    let unsupported = || format!("cannot represent {} as {target}", kind(value));

    let native = match (target, value) {
        (_, RowValues::Null) => NativeValue::Null,

        (SqlType::Boolean, RowValues::Bool(b)) => NativeValue::Bool(*b),
        (SqlType::Boolean, RowValues::Int(i @ (0 | 1))) => NativeValue::Bool(*i == 1),

        (SqlType::SmallInt, RowValues::Int(i)) if i16::try_from(*i).is_ok() => NativeValue::Integer(*i),
        (SqlType::Integer, RowValues::Int(i)) if i32::try_from(*i).is_ok() => NativeValue::Integer(*i),
        (SqlType::BigInt, RowValues::Int(i)) => NativeValue::Integer(*i),
        (SqlType::SmallInt | SqlType::Integer | SqlType::BigInt, RowValues::Decimal(d))
            if d.is_integer() =>
        {
            let i = d.to_i64().ok_or_else(unsupported)?;
            return coerce(&RowValues::Int(i), target);
        }

        (SqlType::Real | SqlType::Double, RowValues::Float(f)) => NativeValue::Real(*f),
        #[allow(clippy::cast_precision_loss)]
        (SqlType::Real | SqlType::Double, RowValues::Int(i)) if i.unsigned_abs() <= F64_EXACT_INT => {
            NativeValue::Real(*i as f64)
        }

        (SqlType::Decimal, RowValues::Decimal(d)) => NativeValue::Decimal(d.clone()),
        (SqlType::Decimal, RowValues::Int(i)) => NativeValue::Decimal(BigDecimal::from(*i)),
        (SqlType::Decimal, RowValues::Float(f)) if f.is_finite() => {
            NativeValue::Decimal(BigDecimal::from_str(&f.to_string()).map_err(|e| e.to_string())?)
        }

        (SqlType::Char | SqlType::Varchar | SqlType::Clob, RowValues::Text(s)) => {
            NativeValue::Text(s.clone())
        }
        (SqlType::Binary | SqlType::Blob, RowValues::Blob(bytes)) => NativeValue::Blob(bytes.clone()),

        (SqlType::Date, RowValues::Date(d)) => NativeValue::Date(*d),
        (SqlType::Time, RowValues::Time(t)) => NativeValue::Time(*t),
        (SqlType::Timestamp, RowValues::Timestamp(dt)) => NativeValue::Timestamp(dt.naive_utc()),
        (SqlType::Timestamp, RowValues::Date(d)) => {
            NativeValue::Timestamp(d.and_hms_opt(0, 0, 0).ok_or_else(unsupported)?)
        }
        (SqlType::TimestampWithTimezone, RowValues::Timestamp(dt)) => NativeValue::TimestampTz(*dt),

        (SqlType::Json, RowValues::JSON(json)) => NativeValue::Text(json.to_string()),
        (SqlType::Json, RowValues::Text(s)) if serde_json::from_str::<serde_json::Value>(s).is_ok() => {
            NativeValue::Text(s.clone())
        }

        _ => return Err(unsupported()),
    };
    Ok(native)
}

fn kind(value: &RowValues) -> &'static str {
    match value {
        RowValues::Int(_) => "integer",
        RowValues::Float(_) => "float",
        RowValues::Decimal(_) => "decimal",
        RowValues::Text(_) => "text",
        RowValues::Bool(_) => "boolean",
        RowValues::Timestamp(_) => "timestamp",
        RowValues::Date(_) => "date",
        RowValues::Time(_) => "time",
        RowValues::Null => "null",
        RowValues::JSON(_) => "json",
        RowValues::Blob(_) => "blob",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_map_to_binds() {
        let binds = encode_params(&[
            Param::In(RowValues::Text("John".into())),
            Param::out(SqlType::Varchar),
            Param::in_out(SqlType::Integer, 21),
        ])
        .unwrap();
        assert_eq!(
            binds,
            vec![
                Bind::In(NativeValue::Text("John".into())),
                Bind::Out(SqlType::Varchar),
                Bind::InOut(SqlType::Integer, NativeValue::Integer(21)),
            ]
        );
    }

    #[test]
    fn lossy_inout_coercion_is_rejected() {
        let err = encode_params(&[Param::in_out(SqlType::SmallInt, 70_000)]).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ParameterError(msg) if msg.starts_with("parameter 1")));

        let err = encode_params(&[Param::in_out(SqlType::Integer, "12")]).unwrap_err();
        assert!(matches!(err, SqlBridgeError::ParameterError(_)));
    }

    #[test]
    fn lossless_inout_coercions_are_accepted() {
        let binds = encode_params(&[
            Param::in_out(SqlType::Decimal, 3),
            Param::in_out(SqlType::Double, 2),
            Param::in_out(SqlType::Boolean, 1),
            Param::in_out(SqlType::BigInt, BigDecimal::from(7)),
            Param::in_out(SqlType::Varchar, RowValues::Null),
        ])
        .unwrap();
        assert_eq!(binds[0], Bind::InOut(SqlType::Decimal, NativeValue::Decimal(BigDecimal::from(3))));
        assert_eq!(binds[1], Bind::InOut(SqlType::Double, NativeValue::Real(2.0)));
        assert_eq!(binds[2], Bind::InOut(SqlType::Boolean, NativeValue::Bool(true)));
        assert_eq!(binds[3], Bind::InOut(SqlType::BigInt, NativeValue::Integer(7)));
        assert_eq!(binds[4], Bind::InOut(SqlType::Varchar, NativeValue::Null));
    }
}
