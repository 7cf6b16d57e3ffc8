//! In-memory tabular frames.
//!
//! A [Frame] is an ordered list of Arrow record batches. Batches read from different resources
//! may have different schemas: columns are looked up by name per batch, and the frame's column
//! list is the union of all batch columns in order of first appearance.

use crate::filter::parse_day_first;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, TimestampMillisecondArray};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{
    ArrowTemporalType, DataType, Date32Type, Date64Type, Field, Schema, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType,
};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use std::sync::Arc;

/// Ordered collection of record batches.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    batches: Vec<RecordBatch>,
}

impl Frame {
    /// Return a new Frame holding `batches`. Empty batches are dropped.
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            batches: batches.into_iter().filter(|b| b.num_rows() > 0).collect(),
        }
    }

    /// Concatenate frames, keeping their order and the row order within each.
    pub fn concat(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            batches: frames.into_iter().flat_map(|f| f.batches).collect(),
        }
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total number of rows.
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Union of column names across batches, in order of first appearance.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for batch in &self.batches {
            for field in batch.schema().fields() {
                if !columns.iter().any(|c| c == field.name()) {
                    columns.push(field.name().clone());
                }
            }
        }
        columns
    }

    /// Replace `column` with a millisecond timestamp column in every batch that has it.
    ///
    /// Text is parsed day-first. Values that cannot be interpreted as a date become null.
    pub fn normalize_dates(self, column: &str) -> Result<Self, ArrowError> {
        let batches = self
            .batches
            .into_iter()
            .map(|batch| normalize_batch_dates(batch, column))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { batches })
    }

    /// Keep the rows selected by `mask`.
    ///
    /// `mask` returns `None` for batches it does not apply to, which are kept whole.
    pub fn filter<F>(self, mut mask: F) -> Result<Self, ArrowError>
    where
        F: FnMut(&RecordBatch) -> Result<Option<BooleanArray>, ArrowError>,
    {
        let mut batches = Vec::with_capacity(self.batches.len());
        for batch in self.batches {
            match mask(&batch)? {
                Some(mask) => batches.push(filter_record_batch(&batch, &mask)?),
                None => batches.push(batch),
            }
        }
        Ok(Self::new(batches))
    }

    /// Rows `[offset, offset + len)` of the frame.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        let mut skip = offset;
        let mut remaining = len;
        let mut batches = Vec::new();
        for batch in &self.batches {
            if remaining == 0 {
                break;
            }
            let rows = batch.num_rows();
            if skip >= rows {
                skip -= rows;
                continue;
            }
            let take = (rows - skip).min(remaining);
            batches.push(batch.slice(skip, take));
            skip = 0;
            remaining -= take;
        }
        Self { batches }
    }
}

fn normalize_batch_dates(batch: RecordBatch, column: &str) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    let Ok(index) = schema.index_of(column) else {
        return Ok(batch);
    };
    let millis: TimestampMillisecondArray = to_datetimes(batch.column(index))
        .into_iter()
        .map(|v| v.map(|dt| dt.and_utc().timestamp_millis()))
        .collect();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[index] = Field::new(column, DataType::Timestamp(TimeUnit::Millisecond, None), true);
    let mut columns = batch.columns().to_vec();
    columns[index] = Arc::new(millis);
    RecordBatch::try_new(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
    )
}

/// Interpret every value of `array` as a date and time.
///
/// Dates and timestamps convert directly, text is parsed day-first, and other types are cast to
/// text first. Anything that does not convert becomes `None`.
pub fn to_datetimes(array: &ArrayRef) -> Vec<Option<NaiveDateTime>> {
    match array.data_type() {
        DataType::Utf8 => array
            .as_string::<i32>()
            .iter()
            .map(|v| v.and_then(parse_day_first))
            .collect(),
        DataType::LargeUtf8 => array
            .as_string::<i64>()
            .iter()
            .map(|v| v.and_then(parse_day_first))
            .collect(),
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => (0..array.len())
            .map(|row| datetime_value(array.as_ref(), row))
            .collect(),
        _ => match cast(array, &DataType::Utf8) {
            Ok(text) => to_datetimes(&text),
            Err(_) => vec![None; array.len()],
        },
    }
}

/// The date and time at `row` of a date or timestamp array.
///
/// Returns `None` for nulls, out of range values and non-temporal arrays. Time zones are ignored:
/// timestamps are read as UTC.
pub fn datetime_value(array: &dyn Array, row: usize) -> Option<NaiveDateTime> {
    if array.is_null(row) {
        return None;
    }
    match array.data_type() {
        DataType::Date32 => temporal::<Date32Type>(array, row),
        DataType::Date64 => temporal::<Date64Type>(array, row),
        DataType::Timestamp(TimeUnit::Second, _) => temporal::<TimestampSecondType>(array, row),
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            temporal::<TimestampMillisecondType>(array, row)
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            temporal::<TimestampMicrosecondType>(array, row)
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            temporal::<TimestampNanosecondType>(array, row)
        }
        _ => None,
    }
}

fn temporal<T>(array: &dyn Array, row: usize) -> Option<NaiveDateTime>
where
    T: ArrowTemporalType,
    i64: From<T::Native>,
{
    array.as_primitive::<T>().value_as_datetime(row)
}
