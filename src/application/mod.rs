pub mod use_cases;

pub use use_cases::data_dump::{DataDumpUseCase, DumpReport, LoadEvent, DUMP_SUCCESS};
pub use use_cases::null_profiler::NullProfiler;
