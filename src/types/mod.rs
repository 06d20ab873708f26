//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `record`: Sale and Cost records, identifiers, document categories
//! - `calculation`: Per-sale results, cost breakdown lines and summaries
//! - `period`: Fiscal periods, period results and VAT rate presets
//! - `issue`: Issues accumulated by engine passes
//! - `error`: Error types for the margin-scheme engine

pub mod calculation;
pub mod error;
pub mod issue;
pub mod period;
pub mod record;

pub use calculation::{
    round_money, CalculationResult, CategoryTotals, CostAllocation, Summary, MONEY_DP,
};
pub use error::MarginError;
pub use issue::{Issue, IssueKind, Severity, SubjectRef};
pub use period::{Period, PeriodResult, PeriodSaleDetail, VatRegion};
pub use record::{Cost, CostId, DocumentCategory, Sale, SaleId};
