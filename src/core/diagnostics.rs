//! Reconciliation diagnostics
//!
//! The margin calculator attributes costs through explicit links, while the
//! period engine counts every cost dated inside a period. Both views agree
//! only when every cost is linked and fully allocated. This module measures
//! the gap between them without changing either.

use crate::config::ValidationConfig;
use crate::types::{round_money, CalculationResult, Cost, Issue, IssueKind, Sale, SubjectRef};
use rust_decimal::Decimal;
use serde::Serialize;

/// Largest difference tolerated between allocated and ledger costs
const ALLOCATION_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Side-by-side comparison of the allocation and aggregate views
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub sales_count: usize,
    pub costs_count: usize,
    /// Sales that produced a calculation result
    pub calculated_sales: usize,

    /// Aggregate view
    pub total_sales: Decimal,
    pub total_costs: Decimal,
    pub expected_margin: Decimal,

    /// Allocation view
    pub allocated_costs: Decimal,
    pub calculated_margin: Decimal,

    /// `total_costs - allocated_costs`
    pub allocation_delta: Decimal,
    /// `calculated_margin - expected_margin`
    pub margin_delta: Decimal,

    pub orphan_sales: usize,
    pub orphan_costs: usize,
    pub orphan_cost_amount: Decimal,
    pub avg_links_per_sale: Decimal,
    pub avg_links_per_cost: Decimal,

    #[serde(skip)]
    pub issues: Vec<Issue>,
}

impl ReconciliationReport {
    /// Whether both views agree within tolerance
    pub fn is_reconciled(&self) -> bool {
        self.allocation_delta.abs() <= ALLOCATION_TOLERANCE
    }
}

/// Compare the records against the results of a calculation pass
///
/// # Arguments
///
/// * `sales`, `costs` - The full record set
/// * `results` - Results of a calculation pass over the same records
/// * `config` - Supplies the link density threshold
pub fn reconcile(
    sales: &[Sale],
    costs: &[Cost],
    results: &[CalculationResult],
    config: &ValidationConfig,
) -> ReconciliationReport {
    let total_sales: Decimal = sales.iter().map(|s| s.amount).sum();
    let total_costs: Decimal = costs.iter().map(|c| c.amount).sum();

    let allocated: Decimal = results
        .iter()
        .flat_map(|r| r.cost_breakdown.iter())
        .map(|line| line.allocated_amount)
        .sum();
    let calculated_sales: Decimal = results.iter().map(|r| r.sale_amount).sum();
    let calculated_margin = calculated_sales - allocated;

    let orphan_sales = sales.iter().filter(|s| s.is_orphan()).count();
    let orphans: Vec<&Cost> = costs.iter().filter(|c| c.is_orphan()).collect();
    let orphan_cost_amount: Decimal = orphans.iter().map(|c| c.amount).sum();

    let sale_links: usize = sales.iter().map(|s| s.linked_cost_ids.len()).sum();
    let cost_links: usize = costs.iter().map(|c| c.linked_sale_ids.len()).sum();

    let mut report = ReconciliationReport {
        sales_count: sales.len(),
        costs_count: costs.len(),
        calculated_sales: results.len(),
        total_sales: round_money(total_sales),
        total_costs: round_money(total_costs),
        expected_margin: round_money(total_sales - total_costs),
        allocated_costs: round_money(allocated),
        calculated_margin: round_money(calculated_margin),
        allocation_delta: round_money(total_costs - allocated),
        margin_delta: round_money(calculated_margin - (total_sales - total_costs)),
        orphan_sales,
        orphan_costs: orphans.len(),
        orphan_cost_amount: round_money(orphan_cost_amount),
        avg_links_per_sale: average(sale_links, sales.len()),
        avg_links_per_cost: average(cost_links, costs.len()),
        issues: Vec::new(),
    };
    report.issues = report_issues(&report, config);

    tracing::debug!(
        allocation_delta = %report.allocation_delta,
        issues = report.issues.len(),
        "reconciliation complete"
    );
    report
}

fn average(links: usize, records: usize) -> Decimal {
    if records == 0 {
        return Decimal::ZERO;
    }
    round_money(Decimal::from(links) / Decimal::from(records))
}

fn report_issues(report: &ReconciliationReport, config: &ValidationConfig) -> Vec<Issue> {
    let mut issues = Vec::new();

    if !report.is_reconciled() {
        issues.push(Issue::warning(
            IssueKind::AllocationMismatch,
            SubjectRef::Batch,
            format!(
                "Allocated costs {} differ from total costs {} by {}",
                report.allocated_costs, report.total_costs, report.allocation_delta
            ),
        ));
    }

    if report.orphan_costs > 0 {
        issues.push(Issue::warning(
            IssueKind::OrphanCost,
            SubjectRef::Batch,
            format!(
                "{} cost(s) totalling {} are not linked to any sale",
                report.orphan_costs, report.orphan_cost_amount
            ),
        ));
    }

    if report.orphan_sales > 0 {
        issues.push(Issue::warning(
            IssueKind::OrphanSale,
            SubjectRef::Batch,
            format!("{} sale(s) have no linked costs", report.orphan_sales),
        ));
    }

    let densest = report.avg_links_per_sale.max(report.avg_links_per_cost);
    if densest > config.density_threshold {
        issues.push(Issue::warning(
            IssueKind::MassAssociation,
            SubjectRef::Batch,
            format!(
                "Average of {} links per record suggests mass association",
                densest
            ),
        ));
    }

    issues
}
