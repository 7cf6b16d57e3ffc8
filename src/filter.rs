//! Row filters of an EAR query.

use crate::error::EarError;
use crate::frame::to_datetimes;
use crate::models::QueryParams;

use arrow::array::{AsArray, BooleanArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// Date and time layouts, tried in order. Dates not led by the year are day first.
const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d", "%Y%m%d",
];

/// Parse a date or date and time, day first.
///
/// Accepts ISO 8601 dates (with optional time or offset) and `DD/MM/YYYY` style dates.
pub fn parse_day_first(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// The temporal predicate of a query. Exactly one applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeFilter {
    /// Inclusive range of dates and times
    Range {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// A calendar year
    Year(i32),
    /// A month of a calendar year
    YearMonth { year: i32, month: u32 },
}

impl TimeFilter {
    /// Whether a date satisfies the filter.
    pub fn matches(&self, dt: NaiveDateTime) -> bool {
        match *self {
            TimeFilter::Range { start, end } => start <= dt && dt <= end,
            TimeFilter::Year(year) => dt.year() == year,
            TimeFilter::YearMonth { year, month } => dt.year() == year && dt.month() == month,
        }
    }

    /// Calendar years whose resources are needed, ascending.
    pub fn years(&self) -> Vec<i32> {
        match *self {
            TimeFilter::Range { start, end } => (start.year()..=end.year()).collect(),
            TimeFilter::Year(year) | TimeFilter::YearMonth { year, .. } => vec![year],
        }
    }
}

/// The predicates of one query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterSpec {
    pub time: TimeFilter,
    /// Reservoir name substring, matched ignoring case.
    pub reservoir: Option<String>,
}

impl FilterSpec {
    /// Resolve the filters of a query.
    ///
    /// A date range needs both `start_date` and `end_date` and supersedes `ano`/`mes`. Without a
    /// range, `ano` is required and `mes` narrows it to one month. `mes` alone is not enough.
    pub fn resolve(params: &QueryParams) -> Result<Self, EarError> {
        let start = non_empty(&params.start_date);
        let end = non_empty(&params.end_date);
        let time = match (start, end, params.ano) {
            (Some(start), Some(end), _) => TimeFilter::Range {
                start: parse_param("start_date", start)?,
                end: parse_param("end_date", end)?,
            },
            (_, _, Some(year)) => match params.mes {
                Some(month) => TimeFilter::YearMonth { year, month },
                None => TimeFilter::Year(year),
            },
            _ => {
                return Err(EarError::BadRequest(
                    "provide 'ano' or both 'start_date' and 'end_date'".to_string(),
                ))
            }
        };
        Ok(Self {
            time,
            reservoir: non_empty(&params.nome_reservatorio).map(str::to_string),
        })
    }

    /// Row mask of the time filter over `column`, or `None` if the batch lacks the column.
    ///
    /// Rows whose date is null never pass.
    pub fn time_mask(&self, batch: &RecordBatch, column: &str) -> Option<BooleanArray> {
        let array = batch.column_by_name(column)?;
        let mask: Vec<bool> = to_datetimes(array)
            .into_iter()
            .map(|dt| dt.is_some_and(|dt| self.time.matches(dt)))
            .collect();
        Some(mask.into())
    }

    /// Row mask of the reservoir filter over `column`.
    ///
    /// Returns `None` without a reservoir filter or if the batch lacks the column. Values are
    /// compared as text. Nulls never match.
    pub fn reservoir_mask(
        &self,
        batch: &RecordBatch,
        column: &str,
    ) -> Result<Option<BooleanArray>, ArrowError> {
        let Some(needle) = &self.reservoir else {
            return Ok(None);
        };
        let Some(array) = batch.column_by_name(column) else {
            return Ok(None);
        };
        let needle = needle.to_lowercase();
        let text = cast(array, &DataType::Utf8)?;
        let mask: Vec<bool> = text
            .as_string::<i32>()
            .iter()
            .map(|v| v.is_some_and(|v| v.to_lowercase().contains(&needle)))
            .collect();
        Ok(Some(mask.into()))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_param(name: &str, value: &str) -> Result<NaiveDateTime, EarError> {
    parse_day_first(value)
        .ok_or_else(|| EarError::BadRequest(format!("invalid {name} '{value}'")))
}
