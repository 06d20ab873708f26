//! Ledger record types for the margin-scheme engine
//!
//! This module defines the Sale and Cost records that make up the association
//! graph, together with the identifiers and document categories used
//! throughout the system.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Sale identifier
///
/// Opaque string id assigned by the ingestion collaborator.
pub type SaleId = String;

/// Cost identifier
///
/// Opaque string id assigned by the ingestion collaborator.
pub type CostId = String;

/// A sale document (invoice, receipt, credit note...)
///
/// Amounts are net of VAT and already normalized to a single currency with
/// a fixed decimal precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    /// Unique sale identifier
    pub id: SaleId,

    /// Document reference as printed on the invoice (e.g. `FT 2025/001`)
    ///
    /// The prefix determines the [`DocumentCategory`].
    pub number: String,

    /// Document date
    pub date: NaiveDate,

    /// Customer name or free-text reference
    pub counterparty: String,

    /// Net sale amount
    pub amount: Decimal,

    /// Costs attributed to this sale
    ///
    /// The mirror of [`Cost::linked_sale_ids`]; every id here should have this
    /// sale's id in the cost's set.
    pub linked_cost_ids: BTreeSet<CostId>,
}

impl Sale {
    /// Create a sale with no linked costs
    pub fn new(
        id: impl Into<SaleId>,
        number: impl Into<String>,
        date: NaiveDate,
        counterparty: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Sale {
            id: id.into(),
            number: number.into(),
            date,
            counterparty: counterparty.into(),
            amount,
            linked_cost_ids: BTreeSet::new(),
        }
    }

    /// Builder-style helper that records links to the given cost ids
    pub fn with_costs<I, S>(mut self, cost_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CostId>,
    {
        self.linked_cost_ids.extend(cost_ids.into_iter().map(Into::into));
        self
    }

    /// Document category derived from the document number prefix
    pub fn category(&self) -> DocumentCategory {
        DocumentCategory::from_document_number(&self.number)
    }

    pub fn is_orphan(&self) -> bool {
        self.linked_cost_ids.is_empty()
    }
}

/// A purchase/cost document directly attributable to one or more sales
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cost {
    /// Unique cost identifier
    pub id: CostId,

    /// Supplier document reference, when the upstream export carries one
    pub document_number: Option<String>,

    /// Document date
    pub date: NaiveDate,

    /// Supplier name
    pub supplier: String,

    /// Free-text description of the service bought
    pub description: String,

    /// Net cost amount
    pub amount: Decimal,

    /// Sales this cost is shared across
    ///
    /// The size of this set is the divisor used by the allocation engine.
    pub linked_sale_ids: BTreeSet<SaleId>,
}

impl Cost {
    /// Create a cost with no linked sales
    pub fn new(
        id: impl Into<CostId>,
        date: NaiveDate,
        supplier: impl Into<String>,
        description: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Cost {
            id: id.into(),
            document_number: None,
            date,
            supplier: supplier.into(),
            description: description.into(),
            amount,
            linked_sale_ids: BTreeSet::new(),
        }
    }

    /// Builder-style helper that records links to the given sale ids
    pub fn with_sales<I, S>(mut self, sale_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SaleId>,
    {
        self.linked_sale_ids.extend(sale_ids.into_iter().map(Into::into));
        self
    }

    /// Builder-style helper that sets the supplier document reference
    pub fn with_document_number(mut self, number: impl Into<String>) -> Self {
        self.document_number = Some(number.into());
        self
    }

    /// Number of sales this cost is linked to
    pub fn fan_out(&self) -> usize {
        self.linked_sale_ids.len()
    }

    pub fn is_orphan(&self) -> bool {
        self.linked_sale_ids.is_empty()
    }
}

/// Sale document category
///
/// Determined from the document number prefix, following the usual
/// invoicing series codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    /// `FT` series
    Invoice,
    /// `FR` series
    InvoiceReceipt,
    /// `NC` series
    CreditNote,
    /// `ND` series
    DebitNote,
    /// `FS` series
    SimplifiedInvoice,
    /// Anything else
    Other,
}

impl DocumentCategory {
    /// Classify a document number by its series prefix
    ///
    /// Leading whitespace is ignored and the prefix match is case-insensitive.
    pub fn from_document_number(number: &str) -> Self {
        let prefix: String = number
            .trim_start()
            .chars()
            .take(2)
            .collect::<String>()
            .to_ascii_uppercase();

        match prefix.as_str() {
            "FT" => DocumentCategory::Invoice,
            "FR" => DocumentCategory::InvoiceReceipt,
            "NC" => DocumentCategory::CreditNote,
            "ND" => DocumentCategory::DebitNote,
            "FS" => DocumentCategory::SimplifiedInvoice,
            _ => DocumentCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Invoice => "invoice",
            DocumentCategory::InvoiceReceipt => "invoice_receipt",
            DocumentCategory::CreditNote => "credit_note",
            DocumentCategory::DebitNote => "debit_note",
            DocumentCategory::SimplifiedInvoice => "simplified_invoice",
            DocumentCategory::Other => "other",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
