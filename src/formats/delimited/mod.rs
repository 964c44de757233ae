//! Streaming reader for CSV/TSV and other single-byte delimited formats

pub mod reader;

pub use reader::DelimitedRowSource;
