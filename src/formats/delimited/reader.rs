use anyhow::{Context, Result};
use async_trait::async_trait;
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use tokio::io::AsyncRead;

use crate::config::PARSER_BUFFER_SIZE;
use crate::formats::reader::{DelimitedConfig, Record, RowSource};

/// Streaming delimited reader over any async byte stream.
///
/// Headers are not interpreted here: the first record is yielded like any
/// other and the dispatcher decides what it means. Records are parsed in
/// flexible mode so a short or long row surfaces as a per-row failure instead
/// of a read error that ends the whole stream.
pub struct DelimitedRowSource<R> {
    reader: AsyncReader<R>,
    record: StringRecord,
}

impl<R> DelimitedRowSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, config: DelimitedConfig) -> Self {
        let reader = AsyncReaderBuilder::new()
            .delimiter(config.delimiter)
            .quote(config.quote)
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(PARSER_BUFFER_SIZE)
            .create_reader(reader);

        Self {
            reader,
            record: StringRecord::new(),
        }
    }
}

#[async_trait]
impl<R> RowSource for DelimitedRowSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_record(&mut self) -> Result<Option<Record>> {
        let has_record = self
            .reader
            .read_record(&mut self.record)
            .await
            .context("Failed to parse delimited record")?;

        if !has_record {
            return Ok(None);
        }

        Ok(Some(Record::new(self.record.iter())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(data: &'static [u8], config: DelimitedConfig) -> DelimitedRowSource<&'static [u8]> {
        DelimitedRowSource::new(data, config)
    }

    async fn collect(mut source: impl RowSource) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        while let Some(record) = source.next_record().await.unwrap() {
            rows.push(record.fields);
        }
        rows
    }

    #[tokio::test]
    async fn test_header_is_yielded_as_first_record() {
        let rows = collect(source(b"a,b\n1,2\n3,4\n", DelimitedConfig::csv())).await;

        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"], vec!["3", "4"]]);
    }

    #[tokio::test]
    async fn test_quoted_fields() {
        let rows = collect(source(
            b"id,name\n1,\"Smith, John\"\n2,\"say \"\"hi\"\"\"\n",
            DelimitedConfig::csv(),
        ))
        .await;

        assert_eq!(rows[1], vec!["1", "Smith, John"]);
        assert_eq!(rows[2], vec!["2", "say \"hi\""]);
    }

    #[tokio::test]
    async fn test_tab_delimited() {
        let rows = collect(source(b"x\ty\nfoo\tbar\n", DelimitedConfig::tsv())).await;

        assert_eq!(rows, vec![vec!["x", "y"], vec!["foo", "bar"]]);
    }

    #[tokio::test]
    async fn test_ragged_rows_are_not_read_errors() {
        let rows = collect(source(b"a,b,c\n1,2\n4,5,6,7\n", DelimitedConfig::csv())).await;

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].len(), 2);
        assert_eq!(rows[2].len(), 4);
    }

    #[tokio::test]
    async fn test_empty_input_ends_immediately() {
        let mut source = source(b"", DelimitedConfig::csv());
        assert!(source.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_a_read_error() {
        let mut source = source(b"a,b\n\xff\xfe,2\n", DelimitedConfig::csv());

        assert!(source.next_record().await.unwrap().is_some());
        assert!(source.next_record().await.is_err());
    }
}
