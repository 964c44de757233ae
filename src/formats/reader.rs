use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;

use super::delimited::DelimitedRowSource;

/// A single record (row) from the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<String>,
}

impl Record {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Pull-based, sequential source of records.
///
/// The first record a source yields is the header; everything after it is data.
#[async_trait]
pub trait RowSource: Send {
    /// Read the next record. `Ok(None)` marks the end of the stream.
    async fn next_record(&mut self) -> Result<Option<Record>>;
}

/// Configuration for delimited file reading (CSV, TSV, etc.)
#[derive(Debug, Clone)]
pub struct DelimitedConfig {
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for DelimitedConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl DelimitedConfig {
    pub fn csv() -> Self {
        Self::default()
    }

    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            quote: b'"',
        }
    }
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Csv,
    Tsv,
}

impl Format {
    /// Parse format from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "tsv" => Ok(Format::Tsv),
            _ => Err(anyhow::anyhow!(
                "Unsupported format: {}. Supported formats: csv, tsv",
                s
            )),
        }
    }

    /// Auto-detect file format from path, if the extension is recognized
    pub fn detect(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => Some(Format::Csv),
            Some("tsv") => Some(Format::Tsv),
            _ => None,
        }
    }

    fn delimited_config(self) -> DelimitedConfig {
        match self {
            Format::Csv => DelimitedConfig::csv(),
            Format::Tsv => DelimitedConfig::tsv(),
        }
    }
}

/// Open a local file as a streaming row source
pub async fn open_row_source(path: &Path, format: Format) -> Result<Box<dyn RowSource>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open dataset file '{}'", path.display()))?;

    Ok(Box::new(DelimitedRowSource::new(
        file,
        format.delimited_config(),
    )))
}

/// In-memory row source for tests, optionally failing after its records run out
#[cfg(test)]
pub(crate) struct VecRowSource {
    records: std::collections::VecDeque<Record>,
    error_at_end: Option<String>,
}

#[cfg(test)]
impl VecRowSource {
    pub(crate) fn new(rows: &[&[&str]]) -> Self {
        Self {
            records: rows.iter().map(|row| Record::new(row.iter().copied())).collect(),
            error_at_end: None,
        }
    }

    pub(crate) fn failing_with(mut self, message: &str) -> Self {
        self.error_at_end = Some(message.to_string());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl RowSource for VecRowSource {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        match self.records.pop_front() {
            Some(record) => Ok(Some(record)),
            None => match self.error_at_end.take() {
                Some(message) => Err(anyhow::anyhow!(message)),
                None => Ok(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            Format::detect(Path::new("./majestic_million.csv")),
            Some(Format::Csv)
        );
        assert_eq!(Format::detect(Path::new("data.TSV")), Some(Format::Tsv));
        assert_eq!(Format::detect(Path::new("data.parquet")), None);
        assert_eq!(Format::detect(Path::new("data")), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("CSV").unwrap(), Format::Csv);
        assert!(Format::parse("xlsx").is_err());
    }

    #[tokio::test]
    async fn test_open_row_source_streams_records() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "id\tname").unwrap();
        writeln!(temp_file, "1\tAlice").unwrap();
        temp_file.flush().unwrap();

        let mut source = open_row_source(temp_file.path(), Format::Tsv)
            .await
            .unwrap();

        assert_eq!(
            source.next_record().await.unwrap(),
            Some(Record::new(["id", "name"]))
        );
        assert_eq!(
            source.next_record().await.unwrap(),
            Some(Record::new(["1", "Alice"]))
        );
        assert_eq!(source.next_record().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let result = open_row_source(Path::new("/nonexistent/data.csv"), Format::Csv).await;
        assert!(result.is_err());
    }
}
