//! Per-sale margin calculator
//!
//! This module provides the MarginCalculator that projects every sale into a
//! [`CalculationResult`] for a given percentage rate:
//!
//! ```text
//! gross_margin      = sale.amount - allocated_cost_total
//! tax_amount        = max(gross_margin, 0) * rate / 100
//! net_margin        = gross_margin - tax_amount
//! margin_percentage = gross_margin / sale.amount * 100   (0 when amount is 0)
//! ```
//!
//! A calculation pass is a pure function of the records it is given. Results
//! are recomputed on demand and never stored.

use crate::config::validate_rate;
use crate::core::allocation::{allocate, index_costs};
use crate::core::association_store::AssociationStore;
use crate::types::{
    round_money, CalculationResult, Cost, CostAllocation, Issue, MarginError, Sale, Summary,
};
use rust_decimal::Decimal;
use std::collections::HashSet;

/// Default fan-out above which allocation emits an advisory
pub const DEFAULT_FAN_OUT_ADVISORY: usize = 10;

/// Output of one calculation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalculationRun {
    /// One result per sale that could be calculated, in input order
    pub results: Vec<CalculationResult>,
    /// Issues accumulated during the pass, deduplicated
    pub issues: Vec<Issue>,
}

impl CalculationRun {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(Issue::is_critical)
    }
}

/// Margin and tax calculator for a fixed rate
#[derive(Debug, Clone, PartialEq)]
pub struct MarginCalculator {
    rate: Decimal,
    fan_out_advisory: usize,
}

impl MarginCalculator {
    /// Create a calculator for a percentage rate
    ///
    /// # Arguments
    ///
    /// * `rate` - Percentage rate, e.g. `23` for 23%
    ///
    /// # Errors
    ///
    /// Returns `InvalidRate` if `rate` lies outside `[0, 100]`
    pub fn new(rate: Decimal) -> Result<Self, MarginError> {
        Ok(MarginCalculator {
            rate: validate_rate(rate)?,
            fan_out_advisory: DEFAULT_FAN_OUT_ADVISORY,
        })
    }

    /// Override the fan-out advisory threshold
    pub fn with_fan_out_advisory(mut self, threshold: usize) -> Self {
        self.fan_out_advisory = threshold;
        self
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Calculate every sale without touching the records
    ///
    /// Sales referencing a missing cost are excluded with one Critical issue
    /// each; every other sale yields exactly one result.
    pub fn calculate_all(&self, sales: &[Sale], costs: &[Cost]) -> CalculationRun {
        let index = index_costs(costs);
        let mut results = Vec::with_capacity(sales.len());
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for sale in sales {
            match allocate(sale, &index, self.fan_out_advisory) {
                Ok(allocation) => {
                    for issue in allocation.issues {
                        if seen.insert(issue.clone()) {
                            issues.push(issue);
                        }
                    }
                    results.push(self.project(sale, allocation.total, allocation.breakdown));
                }
                Err(issue) => {
                    tracing::warn!(sale = %sale.id, "{}", issue.message);
                    issues.push(issue);
                }
            }
        }

        tracing::debug!(
            sales = sales.len(),
            costs = costs.len(),
            results = results.len(),
            issues = issues.len(),
            "calculation pass complete"
        );

        CalculationRun { results, issues }
    }

    /// Restore missing back-links in the store, then calculate
    ///
    /// The healing step is the only mutation: one Info issue is reported per
    /// restored link, ahead of the issues of the pass itself.
    pub fn calculate_store(&self, store: &mut AssociationStore) -> CalculationRun {
        let mut healed = store.heal_back_links();
        if !healed.is_empty() {
            tracing::info!(restored = healed.len(), "restored missing back-links");
        }

        let mut run = self.calculate_all(store.sales(), store.costs());
        healed.append(&mut run.issues);
        run.issues = healed;
        run
    }

    /// Calculate a single sale
    ///
    /// # Errors
    ///
    /// Returns the Critical issue if the sale references a missing cost
    pub fn calculate_sale(&self, sale: &Sale, costs: &[Cost]) -> Result<CalculationResult, Issue> {
        let index = index_costs(costs);
        let allocation = allocate(sale, &index, self.fan_out_advisory)?;
        Ok(self.project(sale, allocation.total, allocation.breakdown))
    }

    fn project(
        &self,
        sale: &Sale,
        allocated: Decimal,
        cost_breakdown: Vec<CostAllocation>,
    ) -> CalculationResult {
        let gross_margin = sale.amount - allocated;
        let tax_amount = gross_margin.max(Decimal::ZERO) * self.rate / Decimal::ONE_HUNDRED;
        let net_margin = gross_margin - tax_amount;
        let margin_percentage = if sale.amount.is_zero() {
            Decimal::ZERO
        } else {
            gross_margin / sale.amount * Decimal::ONE_HUNDRED
        };

        CalculationResult {
            sale_ref: sale.id.clone(),
            sale_number: sale.number.clone(),
            category: sale.category(),
            date: sale.date,
            counterparty: sale.counterparty.clone(),
            sale_amount: round_money(sale.amount),
            allocated_cost_total: round_money(allocated),
            gross_margin: round_money(gross_margin),
            rate: self.rate,
            tax_amount: round_money(tax_amount),
            net_margin: round_money(net_margin),
            margin_percentage: round_money(margin_percentage),
            cost_breakdown,
        }
    }
}

/// Aggregate results into totals, counts and per-category buckets
///
/// The average margin percentage is weighted by sale amount and is zero when
/// total sales are not positive.
pub fn summarize(results: &[CalculationResult]) -> Summary {
    let mut summary = Summary::default();

    for result in results {
        summary.total_sales += result.sale_amount;
        summary.total_costs += result.allocated_cost_total;
        summary.total_gross_margin += result.gross_margin;
        summary.total_tax += result.tax_amount;
        summary.total_net_margin += result.net_margin;
        summary.documents_processed += 1;

        if result.gross_margin > Decimal::ZERO {
            summary.documents_with_margin += 1;
        } else if result.gross_margin < Decimal::ZERO {
            summary.documents_with_loss += 1;
        }

        let bucket = summary.by_category.entry(result.category).or_default();
        bucket.count += 1;
        bucket.total_sales += result.sale_amount;
        bucket.total_costs += result.allocated_cost_total;
        bucket.total_margin += result.gross_margin;
        bucket.total_tax += result.tax_amount;
    }

    if summary.total_sales > Decimal::ZERO {
        summary.average_margin_percentage = round_money(
            summary.total_gross_margin / summary.total_sales * Decimal::ONE_HUNDRED,
        );
    }

    summary
}
