//! Conversion of frame cells into JSON primitives.

use crate::frame::{datetime_value, Frame};

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Decimal128Type, Decimal256Type, Float16Type, Float32Type, Float64Type, Int16Type,
    Int32Type, Int64Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::array_value_to_string;
use serde_json::{Map, Number, Value};

/// One output row: column name to value, in column order.
pub type Row = Map<String, Value>;

/// Convert every row of `frame` into a [Row].
///
/// Every row carries all of the frame's columns. Columns missing from a row's batch are null.
pub fn sanitize_frame(frame: &Frame) -> Vec<Row> {
    sanitize_frame_with_columns(frame, &frame.columns())
}

/// Convert every row of `frame` into a [Row] with exactly `columns`, in that order.
///
/// Use this for a slice of a larger frame so that rows keep the larger frame's columns.
pub fn sanitize_frame_with_columns(frame: &Frame, columns: &[String]) -> Vec<Row> {
    let mut rows = Vec::with_capacity(frame.num_rows());
    for batch in frame.batches() {
        let arrays: Vec<Option<ArrayRef>> = columns
            .iter()
            .map(|c| batch.column_by_name(c).map(decode_dictionary))
            .collect();
        for row in 0..batch.num_rows() {
            let values = columns.iter().zip(&arrays).map(|(column, array)| {
                let value = match array {
                    Some(array) => sanitize_value(array.as_ref(), row),
                    None => Value::Null,
                };
                (column.clone(), value)
            });
            rows.push(values.collect());
        }
    }
    rows
}

/// Replace a dictionary array by its decoded values.
fn decode_dictionary(array: &ArrayRef) -> ArrayRef {
    match array.data_type() {
        DataType::Dictionary(_, value_type) => {
            cast(array, value_type).unwrap_or_else(|_| array.clone())
        }
        _ => array.clone(),
    }
}

/// Convert the cell at `row` of `array` into a JSON value.
///
/// * Integers are passed through exactly.
/// * Floating point and decimal numbers become JSON numbers, or null if not finite.
/// * Dates and timestamps become `YYYY-MM-DD` text, or null if they cannot be converted.
/// * Text is trimmed, and null if nothing remains.
/// * Booleans are passed through.
/// * Anything else is rendered as text.
pub fn sanitize_value(array: &dyn Array, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Int8 => array.as_primitive::<Int8Type>().value(row).into(),
        DataType::Int16 => array.as_primitive::<Int16Type>().value(row).into(),
        DataType::Int32 => array.as_primitive::<Int32Type>().value(row).into(),
        DataType::Int64 => array.as_primitive::<Int64Type>().value(row).into(),
        DataType::UInt8 => array.as_primitive::<UInt8Type>().value(row).into(),
        DataType::UInt16 => array.as_primitive::<UInt16Type>().value(row).into(),
        DataType::UInt32 => array.as_primitive::<UInt32Type>().value(row).into(),
        DataType::UInt64 => array.as_primitive::<UInt64Type>().value(row).into(),
        DataType::Float16 => finite(array.as_primitive::<Float16Type>().value(row).into()),
        DataType::Float32 => finite(array.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => finite(array.as_primitive::<Float64Type>().value(row)),
        DataType::Decimal128(_, _) => decimal(
            &array
                .as_primitive::<Decimal128Type>()
                .value_as_string(row),
        ),
        DataType::Decimal256(_, _) => decimal(
            &array
                .as_primitive::<Decimal256Type>()
                .value_as_string(row),
        ),
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {
            match datetime_value(array, row) {
                Some(dt) => Value::String(dt.format("%Y-%m-%d").to_string()),
                None => Value::Null,
            }
        }
        DataType::Utf8 => text(array.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => text(array.as_string::<i64>().value(row)),
        DataType::Utf8View => text(array.as_string_view().value(row)),
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        _ => match array_value_to_string(array, row) {
            Ok(value) => Value::String(value),
            Err(_) => Value::Null,
        },
    }
}

fn finite(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn decimal(value: &str) -> Value {
    value.parse::<f64>().map_or(Value::Null, finite)
}

fn text(value: &str) -> Value {
    let value = value.trim();
    if value.is_empty() {
        Value::Null
    } else {
        Value::String(value.to_string())
    }
}
