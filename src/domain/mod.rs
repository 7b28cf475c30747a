pub mod error;
pub mod null_summary;
pub mod schema;
pub mod table;

// CSV read options
pub mod csv;
