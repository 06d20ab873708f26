//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, output serialization)
//! - `sync_reader` - Synchronous CSV reader with iterator interface
//! - `async_reader` - Asynchronous CSV reader with batch reading interface

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_cost_record, convert_sale_record, write_breakdown_csv, write_issues_csv,
    write_matches_csv, write_period_details_csv, write_periods_csv, write_reconciliation_csv,
    write_results_csv, write_returns_csv, write_summary_csv, CsvCostRecord, CsvRow,
    CsvSaleRecord,
};
pub use sync_reader::SyncReader;
