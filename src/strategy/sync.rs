//! Synchronous loading strategy
//!
//! Streams the sales file, then the costs file, through [`SyncReader`]s on
//! the calling thread. Malformed rows are logged and skipped.

use crate::io::csv_format::{CsvCostRecord, CsvRow, CsvSaleRecord};
use crate::io::sync_reader::SyncReader;
use crate::strategy::{Ledger, LoadingStrategy};
use crate::types::MarginError;
use std::path::Path;

/// Synchronous loading strategy
///
/// # Examples
///
/// ```no_run
/// use margin_vat_engine::strategy::{LoadingStrategy, SyncLoadingStrategy};
/// use std::path::Path;
///
/// let ledger = SyncLoadingStrategy
///     .load(Path::new("sales.csv"), Path::new("costs.csv"))
///     .expect("Loading failed");
/// println!("{} sales, {} costs", ledger.sales.len(), ledger.costs.len());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SyncLoadingStrategy;

impl LoadingStrategy for SyncLoadingStrategy {
    fn load(&self, sales_path: &Path, costs_path: &Path) -> Result<Ledger, MarginError> {
        // Open both files up front so a missing costs file fails fast
        let sales_reader = SyncReader::<CsvSaleRecord>::new(sales_path)?;
        let costs_reader = SyncReader::<CsvCostRecord>::new(costs_path)?;

        let mut skipped_rows = 0;
        let sales = collect_valid(sales_reader, "sales", &mut skipped_rows);
        let costs = collect_valid(costs_reader, "costs", &mut skipped_rows);

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
    }
}

fn collect_valid<T: CsvRow>(
    reader: SyncReader<T>,
    file: &str,
    skipped: &mut usize,
) -> Vec<T::Record> {
    let mut records = Vec::new();
    for result in reader {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(file, "{}", e);
                *skipped += 1;
            }
        }
    }
    records
}
