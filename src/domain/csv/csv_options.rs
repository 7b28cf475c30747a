// ============================================================
// CSV READ OPTIONS
// ============================================================
// How a source CSV file is split, cleaned and typed

use serde::{Deserialize, Serialize};

/// Tokens read as missing unless `null_values` is set, the same set
/// dataframe readers treat as NA by default
pub const DEFAULT_NULL_VALUES: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Options for reading a CSV file into a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Field delimiter (default: comma)
    pub delimiter: char,

    /// Sniff the delimiter from the first lines instead of using `delimiter`
    pub auto_detect_delimiter: bool,

    /// Trim surrounding whitespace from every field (default: false)
    pub trim: bool,

    /// Field values read as missing (default: `DEFAULT_NULL_VALUES`)
    pub null_values: Vec<String>,

    /// Columns parsed as dates; unparsable entries are kept as raw text
    pub parse_dates: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            auto_detect_delimiter: false,
            trim: false,
            null_values: DEFAULT_NULL_VALUES.iter().map(|v| v.to_string()).collect(),
            parse_dates: Vec::new(),
        }
    }
}

impl CsvOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_parse_dates(mut self, columns: &[&str]) -> Self {
        self.parse_dates = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Delimiter as the single byte the csv reader expects
    pub fn delimiter_byte(&self) -> Option<u8> {
        if self.delimiter.is_ascii() {
            Some(self.delimiter as u8)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.delimiter_byte().is_none() {
            return Err(format!("delimiter '{}' must be a single ASCII character", self.delimiter));
        }
        if matches!(self.delimiter, '"' | '\n' | '\r') {
            return Err(format!("delimiter '{}' is not allowed", self.delimiter.escape_default()));
        }
        Ok(())
    }
}
