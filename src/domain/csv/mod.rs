// ============================================================
// CSV DOMAIN LAYER
// ============================================================
// Options describing how a source CSV file becomes a table
// No I/O, no async

mod csv_options;

pub use csv_options::{CsvOptions, DEFAULT_NULL_VALUES};
