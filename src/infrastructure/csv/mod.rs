// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// CSV parsing, encoding fallback, and column type inference

mod csv_reader;

pub use csv_reader::CsvTableReader;
