//! Synchronous CSV reader with iterator interface
//!
//! Provides a streaming iterator over sale or cost records from a CSV file.
//! Delegates CSV format concerns to the csv_format module.
//!
//! # Iterator Interface
//!
//! SyncReader implements the Iterator trait, yielding
//! `Result<Record, MarginError>` for each CSV row:
//!
//! ```no_run
//! use margin_vat_engine::io::csv_format::CsvSaleRecord;
//! use margin_vat_engine::io::sync_reader::SyncReader;
//! use std::path::Path;
//!
//! let reader = SyncReader::<CsvSaleRecord>::new(Path::new("sales.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(sale) => println!("Loaded sale {}", sale.id),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `new()`
//! - Individual record errors are yielded as `ParseError`s carrying the line
//!   number, so the caller can skip the row and continue

use crate::io::csv_format::CsvRow;
use crate::types::MarginError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;

/// Synchronous CSV reader
///
/// Reads records one at a time; memory use does not grow with file size.
#[derive(Debug)]
pub struct SyncReader<T> {
    reader: csv::Reader<File>,
    line_num: u64,
    _row: PhantomData<T>,
}

impl<T: CsvRow> SyncReader<T> {
    /// Open a CSV file for streaming iteration
    ///
    /// The CSV reader is configured to:
    /// - Trim whitespace from all fields
    /// - Allow flexible field counts (trailing link columns may be absent)
    /// - Use an 8KB buffer for efficient I/O
    ///
    /// # Errors
    ///
    /// * `FileNotFound` if the path does not exist
    /// * `IoError` if the file cannot be opened
    pub fn new(path: &Path) -> Result<Self, MarginError> {
        if !path.exists() {
            return Err(MarginError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let file = File::open(path)?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 1,
            _row: PhantomData,
        })
    }
}

impl<T: CsvRow> Iterator for SyncReader<T> {
    type Item = Result<T::Record, MarginError>;

    /// Read and convert the next row
    ///
    /// # Returns
    ///
    /// * `Some(Ok(record))` - Successfully parsed record
    /// * `Some(Err(ParseError))` - Parse or conversion error with line number
    /// * `None` - End of file reached
    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<T>();
        let row = deserializer.next()?;
        self.line_num += 1;
        let line = Some(self.line_num);

        Some(
            row.map_err(|e| MarginError::ParseError {
                line,
                message: e.to_string(),
            })
            .and_then(|raw| {
                raw.convert().map_err(|e| MarginError::ParseError {
                    line,
                    message: e.to_string(),
                })
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv_format::{CsvCostRecord, CsvSaleRecord};
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    const SALES_HEADER: &str = "id,number,date,counterparty,amount,linked_costs\n";

    #[test]
    fn test_sync_reader_fails_on_missing_file() {
        let result = SyncReader::<CsvSaleRecord>::new(Path::new("nonexistent.csv"));
        assert!(matches!(result, Err(MarginError::FileNotFound { .. })));
    }

    #[test]
    fn test_sync_reader_iterates_sales() {
        let file = create_temp_csv(&format!(
            "{}s1,FT 1,2025-01-15,Client,1000.00,c1;c2\ns2,FR 2,2025-01-16,Other,50,\n",
            SALES_HEADER
        ));

        let sales: Vec<_> = SyncReader::<CsvSaleRecord>::new(file.path())
            .unwrap()
            .collect();
        assert_eq!(sales.len(), 2);

        let first = sales[0].as_ref().unwrap();
        assert_eq!(first.amount, Decimal::from(1000));
        assert_eq!(first.linked_cost_ids.len(), 2);
        assert!(sales[1].as_ref().unwrap().is_orphan());
    }

    #[test]
    fn test_sync_reader_iterates_costs_without_link_column() {
        let file = create_temp_csv(
            "id,document_number,date,supplier,description,amount\n\
             c1,H-1,2025-01-12,Hotel,Rooms,600\n",
        );

        let costs: Vec<_> = SyncReader::<CsvCostRecord>::new(file.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(costs.len(), 1);
        assert_eq!(costs[0].document_number.as_deref(), Some("H-1"));
        assert!(costs[0].is_orphan());
    }

    #[test]
    fn test_sync_reader_includes_line_numbers_in_errors() {
        let file = create_temp_csv(&format!(
            "{}s1,FT 1,2025-01-15,Client,100,\ns2,FT 2,2025-01-15,Client,abc,\ns3,FT 3,2025-01-15,Client,50,\n",
            SALES_HEADER
        ));

        let records: Vec<_> = SyncReader::<CsvSaleRecord>::new(file.path())
            .unwrap()
            .collect();
        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(records[2].is_ok());

        // Line 3 because of header
        let error = records[1].as_ref().unwrap_err();
        assert!(matches!(error, MarginError::ParseError { line: Some(3), .. }));
        assert!(error.to_string().contains("Invalid amount"));
    }

    #[test]
    fn test_sync_reader_handles_whitespace() {
        let file = create_temp_csv(&format!(
            "{}  s1  , FT 1 , 2025-01-15 , Client ,  100.0  , c1 \n",
            SALES_HEADER
        ));

        let sales: Vec<_> = SyncReader::<CsvSaleRecord>::new(file.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].id, "s1");
        assert!(sales[0].linked_cost_ids.contains("c1"));
    }

    #[test]
    fn test_sync_reader_handles_empty_file_after_header() {
        let file = create_temp_csv(SALES_HEADER);
        let reader = SyncReader::<CsvSaleRecord>::new(file.path()).unwrap();
        assert_eq!(reader.count(), 0);
    }
}
