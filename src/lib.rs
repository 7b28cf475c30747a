pub mod app;
pub mod application;
pub mod domain;
pub mod infrastructure;

pub use app::run;
pub use application::{DataDumpUseCase, DumpReport, LoadEvent, NullProfiler, DUMP_SUCCESS};
pub use domain::error::{AppError, Result};
pub use domain::null_summary::{ColumnNulls, NullSummary};
pub use domain::schema::{ModelSchema, PrimaryKey, RawTableEntry, TableSpec};
pub use domain::table::{Column, DType, Table, Value};
