//! Marshalling between client values and the driver's native values.
//!
//! Encoding runs on the caller's task before dispatch; decoding runs on the blocking worker right
//! after the driver call, so a decode failure never holds up the async core.

mod decode;
mod encode;
pub mod temporal;

pub use decode::decode_value;
pub use encode::{encode_params, to_native};

use crate::driver::{Bind, RawOutcome, RawResult};
use crate::error::SqlBridgeError;
use crate::results::RowSet;

/// Decode a driver result into a [`RowSet`].
///
/// OUT/INOUT values (if `binds` registered any) become a one-row output set: the result itself
/// when the driver returned an update count, otherwise chained behind the rows.
///
/// # Errors
/// [`SqlBridgeError::DecodeError`] naming the row and column of the first value that does not
/// match its declared type.
pub fn decode_result(raw: RawResult, binds: &[Bind]) -> Result<RowSet, SqlBridgeError> {
    let RawResult {
        outcome,
        out_values,
    } = raw;
    let outputs = decode::decode_outputs(binds, out_values)?;

    match (outcome, outputs) {
        (RawOutcome::Rows { columns, rows }, None) => decode::decode_rows(columns, rows),
        (RawOutcome::Rows { columns, rows }, Some(outputs)) => {
            Ok(decode::decode_rows(columns, rows)?.chain(outputs))
        }
        (
            RawOutcome::UpdateCount {
                count,
                last_insert_id,
            },
            None,
        ) => Ok(RowSet::from_update_count(count, last_insert_id)),
        (RawOutcome::UpdateCount { count, .. }, Some(outputs)) => {
            Ok(outputs.with_rows_affected(count))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{NativeValue, RawColumn, RawOutValue};
    use crate::types::SqlType;

    #[test]
    fn call_without_rows_returns_output_set() {
        let binds = [
            Bind::In(NativeValue::Text("John".into())),
            Bind::Out(SqlType::Varchar),
        ];
        let raw = RawResult::update_count(0, None).with_out_values(vec![RawOutValue {
            position: 2,
            name: Some("lastname".into()),
            value: NativeValue::Text("Doe".into()),
        }]);
        let set = decode_result(raw, &binds).unwrap();
        assert!(set.is_output());
        assert_eq!(set.size(), 1);
        assert_eq!(set.first().unwrap().get_text(0), Some("Doe"));
    }

    #[test]
    fn call_with_rows_chains_outputs() {
        let binds = [Bind::Out(SqlType::Integer)];
        let raw = RawResult::rows(
            vec![RawColumn {
                name: "n".into(),
                type_tag: None,
            }],
            vec![vec![NativeValue::Integer(1)], vec![NativeValue::Integer(2)]],
        )
        .with_out_values(vec![RawOutValue {
            position: 1,
            name: None,
            value: NativeValue::Integer(2),
        }]);
        let set = decode_result(raw, &binds).unwrap();
        assert_eq!(set.size(), 2);
        assert!(!set.is_output());
        let outputs = set.next().unwrap();
        assert!(outputs.is_output());
        assert_eq!(outputs.first().unwrap().get_int("1"), Some(2));
    }
}
