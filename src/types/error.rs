//! Error types for the margin-scheme engine
//!
//! Record-level problems found during a calculation pass are not errors: they
//! are accumulated as [`Issue`](super::issue::Issue)s and the batch continues.
//! This module covers everything else: problems that prevent a pass from
//! starting or that violate an operation's contract.
//!
//! # Error Categories
//!
//! - **File I/O Errors**: File not found, permission denied, etc.
//! - **CSV Parsing Errors**: Malformed CSV, invalid dates or amounts
//! - **Contract Errors**: Invalid rate, invalid or out-of-order periods, unknown ids
//! - **Configuration Errors**: Unreadable or invalid TOML configuration

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the margin-scheme engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarginError {
    /// File not found at the specified path
    ///
    /// This is a fatal error that prevents loading from starting.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    ///
    /// Recoverable at record level: the malformed row is skipped.
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },

    /// Amount column could not be parsed as a decimal
    #[error("Invalid amount '{amount}' for record {record}")]
    InvalidAmount {
        /// The invalid amount string
        amount: String,
        /// Record id
        record: String,
    },

    /// Date column could not be parsed as `YYYY-MM-DD`
    #[error("Invalid date '{date}' for record {record}")]
    InvalidDate {
        /// The invalid date string
        date: String,
        /// Record id
        record: String,
    },

    /// Tax rate outside `[0, 100]`
    #[error("Invalid rate {rate}: must be between 0 and 100")]
    InvalidRate {
        /// The rejected percentage rate
        rate: Decimal,
    },

    /// Period whose start is after its end
    #[error("Invalid period: start {start} is after end {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },

    /// Quarter number outside 1-4 (or an unrepresentable year)
    #[error("Invalid quarter Q{quarter} of {year}")]
    InvalidQuarter { year: i32, quarter: u32 },

    /// Period submitted before (or overlapping) the previous one in a chain
    ///
    /// Carry-forward is only meaningful in strict chronological order, so the
    /// chain refuses the period instead of silently corrupting it.
    #[error("Period starting {start} does not follow previous period ending {previous_end}")]
    PeriodOutOfOrder {
        /// End of the last period accepted by the chain
        previous_end: NaiveDate,
        /// Start of the rejected period
        start: NaiveDate,
    },

    /// Sale id not present in the association store
    #[error("Sale {id} not found")]
    UnknownSale { id: String },

    /// Cost id not present in the association store
    #[error("Cost {id} not found")]
    UnknownCost { id: String },

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Async runtime could not be created
    #[error("Runtime error: {message}")]
    RuntimeError { message: String },
}

// Conversion from io::Error to MarginError
impl From<std::io::Error> for MarginError {
    fn from(error: std::io::Error) -> Self {
        MarginError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to MarginError
impl From<csv::Error> for MarginError {
    fn from(error: csv::Error) -> Self {
        // Extract line number if available
        let line = error.position().map(|pos| pos.line());

        MarginError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for MarginError {
    fn from(error: toml::de::Error) -> Self {
        MarginError::ConfigError {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl MarginError {
    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: &str, record: &str) -> Self {
        MarginError::InvalidAmount {
            amount: amount.to_string(),
            record: record.to_string(),
        }
    }

    /// Create an InvalidDate error
    pub fn invalid_date(date: &str, record: &str) -> Self {
        MarginError::InvalidDate {
            date: date.to_string(),
            record: record.to_string(),
        }
    }

    /// Create an InvalidRate error
    pub fn invalid_rate(rate: Decimal) -> Self {
        MarginError::InvalidRate { rate }
    }

    /// Create an InvalidPeriod error
    pub fn invalid_period(start: NaiveDate, end: NaiveDate) -> Self {
        MarginError::InvalidPeriod { start, end }
    }

    /// Create a PeriodOutOfOrder error
    pub fn period_out_of_order(previous_end: NaiveDate, start: NaiveDate) -> Self {
        MarginError::PeriodOutOfOrder {
            previous_end,
            start,
        }
    }

    /// Create an UnknownSale error
    pub fn unknown_sale(id: &str) -> Self {
        MarginError::UnknownSale { id: id.to_string() }
    }

    /// Create an UnknownCost error
    pub fn unknown_cost(id: &str) -> Self {
        MarginError::UnknownCost { id: id.to_string() }
    }

    /// Create a ConfigError
    pub fn config(message: impl Into<String>) -> Self {
        MarginError::ConfigError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case::file_not_found(
        MarginError::FileNotFound { path: "sales.csv".to_string() },
        "File not found: sales.csv"
    )]
    #[case::io_error(
        MarginError::IoError { message: "Permission denied".to_string() },
        "I/O error: Permission denied"
    )]
    #[case::parse_error_with_line(
        MarginError::ParseError { line: Some(42), message: "Invalid field".to_string() },
        "CSV parse error at line 42: Invalid field"
    )]
    #[case::parse_error_without_line(
        MarginError::ParseError { line: None, message: "Invalid field".to_string() },
        "CSV parse error: Invalid field"
    )]
    #[case::invalid_amount(
        MarginError::invalid_amount("12,5x", "s1"),
        "Invalid amount '12,5x' for record s1"
    )]
    #[case::invalid_date(
        MarginError::invalid_date("2025-13-01", "c7"),
        "Invalid date '2025-13-01' for record c7"
    )]
    #[case::invalid_rate(
        MarginError::invalid_rate(Decimal::from(120)),
        "Invalid rate 120: must be between 0 and 100"
    )]
    #[case::invalid_period(
        MarginError::invalid_period(date(2025, 2, 1), date(2025, 1, 1)),
        "Invalid period: start 2025-02-01 is after end 2025-01-01"
    )]
    #[case::invalid_quarter(
        MarginError::InvalidQuarter { year: 2025, quarter: 5 },
        "Invalid quarter Q5 of 2025"
    )]
    #[case::out_of_order(
        MarginError::period_out_of_order(date(2025, 3, 31), date(2025, 1, 1)),
        "Period starting 2025-01-01 does not follow previous period ending 2025-03-31"
    )]
    #[case::unknown_sale(MarginError::unknown_sale("s9"), "Sale s9 not found")]
    #[case::unknown_cost(MarginError::unknown_cost("c9"), "Cost c9 not found")]
    #[case::config(
        MarginError::config("threshold must be numeric"),
        "Configuration error: threshold must be numeric"
    )]
    fn test_error_display(#[case] error: MarginError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: MarginError = io_error.into();
        assert!(matches!(error, MarginError::IoError { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_error = toml::from_str::<toml::Table>("vat_rate = ").unwrap_err();
        let error: MarginError = toml_error.into();
        assert!(matches!(error, MarginError::ConfigError { .. }));
    }
}
