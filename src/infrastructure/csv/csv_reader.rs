// ============================================================
// CSV TABLE READER
// ============================================================
// Read a CSV file into a typed table with encoding fallback

use std::collections::HashMap;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;
use tracing::{debug, warn};

use crate::domain::csv::CsvOptions;
use crate::domain::error::{AppError, Result};
use crate::domain::table::{Column, DType, Table, Value};

/// Reads CSV files into tables, inferring one type per column
#[derive(Debug, Clone, Default)]
pub struct CsvTableReader {
    options: CsvOptions,
}

impl CsvTableReader {
    pub fn new(options: CsvOptions) -> Self {
        Self { options }
    }

    /// Read and parse a CSV file
    pub fn read_file(&self, path: &Path) -> Result<Table> {
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::LoadError(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        let content = Self::decode(&bytes);

        let table = self.read_content(&content).map_err(|e| match e {
            AppError::LoadError(msg) => {
                AppError::LoadError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        debug!(
            path = %path.display(),
            rows = table.row_count(),
            columns = table.columns().len(),
            "Read source CSV"
        );
        Ok(table)
    }

    /// Parse CSV content that is already in memory
    pub fn read_content(&self, content: &str) -> Result<Table> {
        self.options
            .validate()
            .map_err(|e| AppError::LoadError(format!("Invalid CSV options: {}", e)))?;

        let delimiter = if self.options.auto_detect_delimiter {
            Self::detect_delimiter(content)
        } else {
            self.options.delimiter_byte().unwrap_or(b',')
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(if self.options.trim { Trim::All } else { Trim::None })
            .flexible(false)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| AppError::LoadError(format!("Failed to read CSV headers: {}", e)))?
            .clone();
        if headers.is_empty() {
            return Err(AppError::LoadError("CSV has no header row".to_string()));
        }
        let names = Self::dedupe_headers(headers.iter());

        let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
        for (index, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                AppError::LoadError(format!("Failed to parse CSV row {}: {}", index + 1, e))
            })?;
            for (slot, field) in raw.iter_mut().zip(record.iter()) {
                slot.push(self.null_or_value(field));
            }
        }

        if let Some(missing) = self
            .options
            .parse_dates
            .iter()
            .find(|name| !names.contains(*name))
        {
            return Err(AppError::LoadError(format!(
                "Date column '{}' is not in the CSV header",
                missing
            )));
        }

        let columns = names
            .into_iter()
            .zip(raw)
            .map(|(name, values)| {
                if self.options.parse_dates.contains(&name) {
                    Self::date_column(name, values)
                } else {
                    Self::typed_column(name, values)
                }
            })
            .collect();

        Table::new(columns)
    }

    fn null_or_value(&self, field: &str) -> Option<String> {
        if self.options.null_values.iter().any(|n| n == field) {
            None
        } else {
            Some(field.to_string())
        }
    }

    /// Repeated header names get a `.N` suffix, first one unchanged
    fn dedupe_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        headers
            .map(|header| {
                let seen = counts.entry(header.to_string()).or_insert(0);
                let name = if *seen == 0 {
                    header.to_string()
                } else {
                    warn!(header, "Duplicate CSV header renamed");
                    format!("{}.{}", header, seen)
                };
                *seen += 1;
                name
            })
            .collect()
    }

    fn date_column(name: String, values: Vec<Option<String>>) -> Column {
        Column::datetime_from_strs(name, values.iter().map(|v| v.as_deref()).collect())
    }

    fn typed_column(name: String, values: Vec<Option<String>>) -> Column {
        let dtype = Self::infer_dtype(&values);
        let values = values
            .into_iter()
            .map(|value| match value {
                None => Value::Null,
                Some(raw) => Self::parse_value(dtype, raw),
            })
            .collect();
        Column::new(name, dtype, values)
    }

    fn parse_value(dtype: DType, raw: String) -> Value {
        match dtype {
            DType::Boolean => parse_bool(&raw).map_or(Value::Null, Value::Bool),
            DType::Int64 => raw.trim().parse().map_or(Value::Null, Value::Int),
            DType::Float64 => raw.trim().parse().map_or(Value::Null, Value::Float),
            _ => Value::Str(raw),
        }
    }

    /// Narrowest type every present value parses as; all-missing reads as float
    fn infer_dtype(values: &[Option<String>]) -> DType {
        let present: Vec<&str> = values.iter().flatten().map(String::as_str).collect();

        if present.is_empty() {
            DType::Float64
        } else if present.iter().all(|v| parse_bool(v).is_some()) {
            DType::Boolean
        } else if present.iter().all(|v| v.trim().parse::<i64>().is_ok()) {
            DType::Int64
        } else if present.iter().all(|v| v.trim().parse::<f64>().is_ok()) {
            DType::Float64
        } else {
            DType::Utf8
        }
    }

    /// UTF-8 when valid, otherwise Windows-1252
    fn decode(bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(content) => content.trim_start_matches('\u{feff}').to_string(),
            Err(_) => {
                let (content, _, had_errors) = WINDOWS_1252.decode(bytes);
                if had_errors {
                    warn!("CSV contains bytes that could not be decoded");
                }
                content.into_owned()
            }
        }
    }

    /// Detect delimiter from content (comma, semicolon, tab, pipe)
    pub fn detect_delimiter(content: &str) -> u8 {
        let candidates = [b',', b';', b'\t', b'|'];
        let sample_lines: Vec<&str> = content.lines().take(10).collect();

        let mut best_delimiter = b',';
        let mut best_score = 0.0f32;

        if sample_lines.is_empty() {
            return best_delimiter;
        }

        for &delimiter in &candidates {
            let field_counts: Vec<usize> = sample_lines
                .iter()
                .map(|line| line.bytes().filter(|&b| b == delimiter).count())
                .collect();

            // Score by consistency (low standard deviation) and frequency
            let avg = field_counts.iter().sum::<usize>() as f32 / field_counts.len() as f32;
            let variance = field_counts
                .iter()
                .map(|&x| (x as f32 - avg).powi(2))
                .sum::<f32>()
                / field_counts.len() as f32;

            let score = avg / (1.0 + variance.sqrt());
            if score > best_score {
                best_score = score;
                best_delimiter = delimiter;
            }
        }

        best_delimiter
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_csv() {
        let content = "name,age,city\nAlice,30,NYC\nBob,25,LA";
        let table = CsvTableReader::default().read_content(content).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), vec!["name", "age", "city"]);
        assert_eq!(table.column("age").unwrap().dtype, DType::Int64);
        assert_eq!(table.column("name").unwrap().values[0], Value::Str("Alice".into()));
    }

    #[test]
    fn test_infers_column_types() {
        let content = "flag,score,ratio,label,empty\nTrue,1,0.5,a,\nfalse,2,1,b,\n,3,,c,";
        let table = CsvTableReader::default().read_content(content).unwrap();

        assert_eq!(table.column("flag").unwrap().dtype, DType::Boolean);
        assert_eq!(table.column("score").unwrap().dtype, DType::Int64);
        assert_eq!(table.column("ratio").unwrap().dtype, DType::Float64);
        assert_eq!(table.column("label").unwrap().dtype, DType::Utf8);
        assert_eq!(table.column("empty").unwrap().dtype, DType::Float64);
        assert_eq!(table.column("flag").unwrap().values[2], Value::Null);
        assert_eq!(table.column("ratio").unwrap().values[1], Value::Float(1.0));
    }

    #[test]
    fn test_whitespace_is_kept_without_trim() {
        let content = "note\n  \nx";
        let table = CsvTableReader::default().read_content(content).unwrap();
        assert_eq!(table.column("note").unwrap().values[0], Value::Str("  ".into()));
    }

    #[test]
    fn test_default_na_tokens_are_null() {
        let table = CsvTableReader::default().read_content("v\n1\nNA\n3").unwrap();
        let column = table.column("v").unwrap();
        assert_eq!(column.dtype, DType::Int64);
        assert_eq!(column.values, vec![Value::Int(1), Value::Null, Value::Int(3)]);

        let table = CsvTableReader::default()
            .read_content("label\nN/A\nNULL\nnan\n-\nx")
            .unwrap();
        let column = table.column("label").unwrap();
        assert_eq!(column.dtype, DType::Utf8);
        assert_eq!(column.null_count(), 3);
        assert_eq!(column.values[3], Value::Str("-".into()));
    }

    #[test]
    fn test_empty_only_null_values_keep_sentinels() {
        let options = CsvOptions {
            null_values: vec![String::new()],
            ..CsvOptions::default()
        };
        let table = CsvTableReader::new(options).read_content("v\n1\nNA\n").unwrap();
        let column = table.column("v").unwrap();
        assert_eq!(column.dtype, DType::Utf8);
        assert_eq!(column.values[1], Value::Str("NA".into()));
    }

    #[test]
    fn test_custom_null_values() {
        let options = CsvOptions {
            null_values: vec![String::new(), "NULL".to_string()],
            ..CsvOptions::default()
        };
        let table = CsvTableReader::new(options).read_content("v\nNULL\n7").unwrap();
        let column = table.column("v").unwrap();
        assert_eq!(column.dtype, DType::Int64);
        assert_eq!(column.values, vec![Value::Null, Value::Int(7)]);
    }

    #[test]
    fn test_parse_dates_keeps_invalid_text() {
        let options = CsvOptions::new().with_parse_dates(&["joined"]);
        let table = CsvTableReader::new(options)
            .read_content("joined\n2024-01-31\nsoon\n")
            .unwrap();
        let column = table.column("joined").unwrap();
        assert_eq!(column.dtype, DType::DateTime);
        assert!(matches!(column.values[0], Value::DateTime(_)));
        assert_eq!(column.values[1], Value::Str("soon".into()));
    }

    #[test]
    fn test_parse_dates_unknown_column() {
        let options = CsvOptions::new().with_parse_dates(&["missing"]);
        let result = CsvTableReader::new(options).read_content("a\n1");
        assert!(matches!(result, Err(AppError::LoadError(_))));
    }

    #[test]
    fn test_ragged_row_is_load_error() {
        let result = CsvTableReader::default().read_content("a,b\n1,2\n3");
        assert!(matches!(result, Err(AppError::LoadError(_))));
    }

    #[test]
    fn test_duplicate_headers_are_renamed() {
        let table = CsvTableReader::default().read_content("a,a,b\n1,2,3").unwrap();
        assert_eq!(table.column_names(), vec!["a", "a.1", "b"]);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(CsvTableReader::detect_delimiter("a,b,c\nd,e,f"), b',');
        assert_eq!(CsvTableReader::detect_delimiter("a;b;c\nd;e;f"), b';');
        assert_eq!(CsvTableReader::detect_delimiter("a\tb\nc\td"), b'\t');
    }

    #[test]
    fn test_decode_windows_1252_fallback() {
        let bytes = b"name\nJos\xe9\n";
        assert_eq!(CsvTableReader::decode(bytes), "name\nJos\u{e9}\n");
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let result = CsvTableReader::default().read_file(Path::new("/nonexistent/source.csv"));
        assert!(matches!(result, Err(AppError::LoadError(_))));
    }
}
