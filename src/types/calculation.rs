//! Calculation output types
//!
//! These are ephemeral projections recomputed on demand for a given rate.
//! None of them is ever persisted as a first-class entity.

use super::record::{CostId, DocumentCategory, SaleId};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of decimal places used for every monetary output field
pub const MONEY_DP: u32 = 2;

/// Round a monetary amount to [`MONEY_DP`] places, half away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// One cost's share in a sale's allocation, retained for audit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostAllocation {
    pub cost_id: CostId,
    pub supplier: String,
    pub description: String,
    /// Supplier document reference, if any
    pub document_number: Option<String>,
    pub date: NaiveDate,
    /// Full amount of the cost document
    pub total_amount: Decimal,
    /// Share attributed to this sale (unrounded)
    pub allocated_amount: Decimal,
    /// Divisor used for the even split
    pub shared_with: usize,
}

/// Margin and tax projection for a single sale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationResult {
    pub sale_ref: SaleId,
    pub sale_number: String,
    pub category: DocumentCategory,
    pub date: NaiveDate,
    pub counterparty: String,
    pub sale_amount: Decimal,
    pub allocated_cost_total: Decimal,
    pub gross_margin: Decimal,
    /// Percentage rate applied (e.g. 23 for 23%)
    pub rate: Decimal,
    pub tax_amount: Decimal,
    pub net_margin: Decimal,
    pub margin_percentage: Decimal,
    pub cost_breakdown: Vec<CostAllocation>,
}

impl CalculationResult {
    pub fn cost_count(&self) -> usize {
        self.cost_breakdown.len()
    }
}

/// Totals for one document category
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryTotals {
    pub count: usize,
    pub total_sales: Decimal,
    pub total_costs: Decimal,
    pub total_margin: Decimal,
    pub total_tax: Decimal,
}

/// Aggregate of a set of calculation results
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_sales: Decimal,
    pub total_costs: Decimal,
    pub total_gross_margin: Decimal,
    pub total_tax: Decimal,
    pub total_net_margin: Decimal,
    /// Weighted by sale amount: total margin over total sales
    pub average_margin_percentage: Decimal,
    pub documents_processed: usize,
    pub documents_with_margin: usize,
    pub documents_with_loss: usize,
    pub by_category: BTreeMap<DocumentCategory, CategoryTotals>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::exact(Decimal::new(16100, 2), Decimal::new(16100, 2))]
    #[case::half_up(Decimal::new(10005, 3), Decimal::new(1001, 2))]
    #[case::half_negative(Decimal::new(-10005, 3), Decimal::new(-1001, 2))]
    #[case::below_half(Decimal::new(33333, 3), Decimal::new(3333, 2))]
    fn test_round_money(#[case] input: Decimal, #[case] expected: Decimal) {
        assert_eq!(round_money(input), expected);
    }
}
