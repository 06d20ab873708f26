//! Asynchronous CSV reader with batch interface
//!
//! Provides batched reading of sale or cost records from any async byte
//! source.
//!
//! # Architecture
//!
//! ```text
//! tokio::fs::File → compat → AsyncReader<_, CsvSaleRecord> → Vec<Sale>
//!                                   ↓
//!                           csv_format module
//!                     (CsvSaleRecord, convert_sale_record)
//! ```

use crate::io::csv_format::CsvRow;
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use std::marker::PhantomData;

/// Asynchronous CSV reader
///
/// Invalid rows are logged and skipped; [`skipped`](Self::skipped) reports
/// how many.
pub struct AsyncReader<R: AsyncRead + Unpin, T> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    skipped: usize,
    _row: PhantomData<T>,
}

impl<R, T> AsyncReader<R, T>
where
    R: AsyncRead + Unpin + Send + 'static,
    T: CsvRow + Send + 'static,
{
    /// Create a new AsyncReader from an async reader
    ///
    /// # Arguments
    ///
    /// * `reader` - Async reader providing CSV data (header row first)
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            skipped: 0,
            _row: PhantomData,
        }
    }

    /// Read a batch of records
    ///
    /// Reads up to `batch_size` valid records. Rows that fail to parse or
    /// convert are logged with `tracing::warn!` and do not count towards the
    /// batch.
    ///
    /// # Returns
    ///
    /// The converted records; an empty vector at end of input
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<T::Record> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<T>();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(raw)) => match raw.convert() {
                    Ok(record) => batch.push(record),
                    Err(e) => {
                        tracing::warn!("record conversion error: {}", e);
                        self.skipped += 1;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!("CSV parse error: {}", e);
                    self.skipped += 1;
                }
                None => break,
            }
        }

        batch
    }

    /// Read every remaining record, batch by batch
    pub async fn read_all(&mut self, batch_size: usize) -> Vec<T::Record> {
        let mut all = Vec::new();
        loop {
            let batch = self.read_batch(batch_size).await;
            if batch.is_empty() {
                break;
            }
            all.extend(batch);
        }
        all
    }

    /// Number of rows skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
