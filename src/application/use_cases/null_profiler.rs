//! Null profiler
//!
//! Counts null-like values per column with rules chosen by the column type:
//! - booleans and numerics report missing entries only
//! - strings report missing, empty, sentinel and whitespace-only entries
//! - dates report entries that are present but do not parse
//!
//! Columns of any other type are left out of the summary.

use std::path::Path;

use tracing::debug;

use crate::domain::error::Result;
use crate::domain::null_summary::{ColumnNulls, NullSummary};
use crate::domain::table::{parse_datetime, Column, DType, Table, Value};
use crate::infrastructure::csv::CsvTableReader;

/// Tokens commonly used in place of a missing value
pub const SENTINEL_VALUES: [&str; 4] = ["N/A", "NA", "None", "-"];

#[derive(Debug, Default, Clone, Copy)]
pub struct NullProfiler;

impl NullProfiler {
    pub fn new() -> Self {
        Self
    }

    /// Summarize every profiled column of `table`
    pub fn profile(&self, table: &Table) -> NullSummary {
        let mut summary = NullSummary::new();

        for column in table.columns() {
            match Self::profile_column(column) {
                Some(nulls) => summary.insert(column.name.clone(), nulls),
                None => debug!(column = %column.name, dtype = %column.dtype, "Skipping column"),
            }
        }

        summary
    }

    /// Read a CSV file with `reader` and profile it
    pub fn profile_csv(&self, reader: &CsvTableReader, path: &Path) -> Result<NullSummary> {
        let table = reader.read_file(path)?;
        Ok(self.profile(&table))
    }

    fn profile_column(column: &Column) -> Option<ColumnNulls> {
        match column.dtype {
            DType::Boolean | DType::Int64 | DType::Float64 => {
                Some(ColumnNulls::Count(column.null_count()))
            }
            DType::Utf8 => Some(Self::profile_text(column)),
            DType::DateTime => Some(ColumnNulls::Date {
                invalid_dates: Self::count_invalid_dates(column),
            }),
            DType::Binary => None,
        }
    }

    fn profile_text(column: &Column) -> ColumnNulls {
        let mut standard_nulls = 0;
        let mut empty_strings = 0;
        let mut specific_values = 0;
        let mut whitespace_only = 0;

        for value in &column.values {
            if value.is_null() {
                standard_nulls += 1;
                continue;
            }
            let Some(text) = value.as_str() else {
                continue;
            };
            if text.is_empty() {
                empty_strings += 1;
            }
            if SENTINEL_VALUES.contains(&text) {
                specific_values += 1;
            }
            if text.trim().is_empty() {
                whitespace_only += 1;
            }
        }

        ColumnNulls::Text {
            standard_nulls,
            empty_strings,
            specific_values,
            whitespace_only,
        }
    }

    fn count_invalid_dates(column: &Column) -> usize {
        column
            .values
            .iter()
            .filter(|value| match value {
                Value::DateTime(_) => false,
                Value::Str(raw) => parse_datetime(raw).is_none(),
                other => !other.is_null(),
            })
            .count()
    }
}
