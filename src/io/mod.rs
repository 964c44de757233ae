//! Dataset location parsing, presence check, and download

pub mod dataset;
pub mod uri;

pub use dataset::{ensure_dataset, file_exists};
pub use uri::SourceUri;
