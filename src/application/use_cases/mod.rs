pub mod data_dump;
pub mod null_profiler;
