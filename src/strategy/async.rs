//! Asynchronous concurrent loading strategy
//!
//! Reads the sales and costs files concurrently on a tokio multi-threaded
//! runtime, each through a batched [`AsyncReader`].
//!
//! # Architecture
//!
//! ```text
//! AsyncLoadingStrategy
//!     ├── BatchConfig (batch_size, worker_threads)
//!     └── tokio runtime
//!         ├── AsyncReader<CsvSaleRecord> ─┐
//!         └── AsyncReader<CsvCostRecord> ─┴─ try_join → Ledger
//! ```
//!
//! Rows keep their file order within each file, so the resulting ledger is
//! identical to the one produced by the synchronous strategy.

use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::{CsvCostRecord, CsvRow, CsvSaleRecord};
use crate::strategy::{Ledger, LoadingStrategy};
use crate::types::MarginError;
use futures::future::try_join;
use std::path::Path;
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Configuration for batched async loading
#[derive(Clone, Debug, PartialEq)]
pub struct BatchConfig {
    /// Number of records read per batch
    pub batch_size: usize,
    /// Number of tokio worker threads
    pub worker_threads: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            worker_threads: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig, replacing zero values by their defaults
    pub fn new(batch_size: usize, worker_threads: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                batch_size,
                fallback = default.batch_size,
                "invalid batch_size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let worker_threads = if worker_threads == 0 {
            tracing::warn!(
                worker_threads,
                fallback = default.worker_threads,
                "invalid worker_threads, using default"
            );
            default.worker_threads
        } else {
            worker_threads
        };

        Self {
            batch_size,
            worker_threads,
        }
    }
}

/// Asynchronous loading strategy
#[derive(Debug, Clone)]
pub struct AsyncLoadingStrategy {
    config: BatchConfig,
}

impl AsyncLoadingStrategy {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }
}

impl LoadingStrategy for AsyncLoadingStrategy {
    /// Load both files concurrently
    ///
    /// # Error Handling
    ///
    /// Fatal errors (file not found, I/O errors, runtime errors) are returned
    /// immediately. Individual row errors are logged and the row is skipped.
    fn load(&self, sales_path: &Path, costs_path: &Path) -> Result<Ledger, MarginError> {
        for path in [sales_path, costs_path] {
            if !path.exists() {
                return Err(MarginError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.worker_threads)
            .build()
            .map_err(|e| MarginError::RuntimeError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        let batch_size = self.config.batch_size;
        runtime.block_on(async {
            let ((sales, sales_skipped), (costs, costs_skipped)) = try_join(
                read_file::<CsvSaleRecord>(sales_path, batch_size),
                read_file::<CsvCostRecord>(costs_path, batch_size),
            )
            .await?;

            let skipped_rows = sales_skipped + costs_skipped;
            tracing::debug!(
                sales = sales.len(),
                costs = costs.len(),
                skipped_rows,
                "ledger loaded"
            );

            Ok(Ledger {
                sales,
                costs,
                skipped_rows,
            })
        })
    }
}

async fn read_file<T>(
    path: &Path,
    batch_size: usize,
) -> Result<(Vec<T::Record>, usize), MarginError>
where
    T: CsvRow + Send + 'static,
{
    let file = tokio::fs::File::open(path).await?;
    let mut reader = AsyncReader::<_, T>::new(file.compat());
    let records = reader.read_all(batch_size).await;
    Ok((records, reader.skipped()))
}
