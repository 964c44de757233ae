//! Delimited file parsing and the row source abstraction

pub mod delimited;
pub mod reader;

pub use reader::{Format, RowSource, open_row_source};
