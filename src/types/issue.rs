//! Issue types accumulated by every engine pass
//!
//! The engine never aborts a batch because of one bad record. Each fallible
//! step yields either a value or an [`Issue`], and the caller decides what to
//! surface to the end user.

use super::record::{CostId, SaleId};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Issue severity
///
/// Ordered from most to least severe so that sorting a list of issues puts
/// critical findings first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A referenced entity is missing; the affected sale is excluded
    Critical,
    /// Asymmetric link, unusual fan-out, implausible margin
    Warning,
    /// Visibility only (orphans, restored links)
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => f.write_str("critical"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

/// Machine-readable classification of an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A sale references a cost id absent from the cost set
    MissingCost,
    /// A cost references a sale id absent from the sale set
    MissingSale,
    /// Link present on one side only
    AsymmetricLink,
    /// Cost referenced by a sale while its own sale set is empty
    EmptyBackLink,
    /// Back-link restored during a healing calculation pass
    BackLinkRestored,
    /// Cost shared by more sales than the advisory threshold
    HighFanOut,
    /// Association request that would create a very large number of links
    MassAssociation,
    /// Id given to an association operation that is not in the store
    UnknownRecord,
    /// Record id seen more than once at load time
    DuplicateRecord,
    /// Sale without any linked cost
    OrphanSale,
    /// Cost without any linked sale
    OrphanCost,
    /// Negative per-sale margin
    NegativeMargin,
    /// Margin percentage above the plausibility bound
    HighMargin,
    /// Sale amount above the plausibility bound, or zero
    ImplausibleAmount,
    /// Dataset-wide margin outside the expected band
    DatasetMargin,
    /// Allocated costs do not add up to the cost ledger
    AllocationMismatch,
    /// Carry-forward or VAT inconsistency across a period chain
    PeriodChain,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::MissingCost => "missing_cost",
            IssueKind::MissingSale => "missing_sale",
            IssueKind::AsymmetricLink => "asymmetric_link",
            IssueKind::EmptyBackLink => "empty_back_link",
            IssueKind::BackLinkRestored => "back_link_restored",
            IssueKind::HighFanOut => "high_fan_out",
            IssueKind::MassAssociation => "mass_association",
            IssueKind::UnknownRecord => "unknown_record",
            IssueKind::DuplicateRecord => "duplicate_record",
            IssueKind::OrphanSale => "orphan_sale",
            IssueKind::OrphanCost => "orphan_cost",
            IssueKind::NegativeMargin => "negative_margin",
            IssueKind::HighMargin => "high_margin",
            IssueKind::ImplausibleAmount => "implausible_amount",
            IssueKind::DatasetMargin => "dataset_margin",
            IssueKind::AllocationMismatch => "allocation_mismatch",
            IssueKind::PeriodChain => "period_chain",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record (or group of records) an issue is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubjectRef {
    Sale { id: SaleId },
    Cost { id: CostId },
    Link { sale_id: SaleId, cost_id: CostId },
    Period { start: NaiveDate, end: NaiveDate },
    /// The whole batch/dataset
    Batch,
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectRef::Sale { id } => write!(f, "sale:{}", id),
            SubjectRef::Cost { id } => write!(f, "cost:{}", id),
            SubjectRef::Link { sale_id, cost_id } => write!(f, "link:{}->{}", sale_id, cost_id),
            SubjectRef::Period { start, end } => write!(f, "period:{}..{}", start, end),
            SubjectRef::Batch => f.write_str("batch"),
        }
    }
}

/// A single finding produced by the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
    pub subject: SubjectRef,
}

impl Issue {
    pub fn new(
        severity: Severity,
        kind: IssueKind,
        subject: SubjectRef,
        message: impl Into<String>,
    ) -> Self {
        Issue {
            severity,
            kind,
            message: message.into(),
            subject,
        }
    }

    pub fn critical(kind: IssueKind, subject: SubjectRef, message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, kind, subject, message)
    }

    pub fn warning(kind: IssueKind, subject: SubjectRef, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, kind, subject, message)
    }

    pub fn info(kind: IssueKind, subject: SubjectRef, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, kind, subject, message)
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

impl SubjectRef {
    pub fn sale(id: &str) -> Self {
        SubjectRef::Sale { id: id.to_string() }
    }

    pub fn cost(id: &str) -> Self {
        SubjectRef::Cost { id: id.to_string() }
    }

    pub fn link(sale_id: &str, cost_id: &str) -> Self {
        SubjectRef::Link {
            sale_id: sale_id.to_string(),
            cost_id: cost_id.to_string(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.severity, self.kind, self.subject, self.message
        )
    }
}
