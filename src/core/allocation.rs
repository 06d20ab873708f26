//! Proportional cost allocation
//!
//! A cost shared by several sales is split evenly between them:
//!
//! ```text
//! allocated_cost_total(sale) = Σ cost.amount / |cost.linked_sale_ids|
//! ```
//!
//! The split is independent of sale size. Allocation never fails the batch:
//! anomalies become [`Issue`]s, and only a sale referencing a cost that does
//! not exist is excluded from the result set.

use crate::types::{Cost, CostAllocation, Issue, IssueKind, Sale, SubjectRef};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Costs indexed by id, borrowed for the duration of one pass
pub type CostIndex<'a> = HashMap<&'a str, &'a Cost>;

/// Build a [`CostIndex`] over a cost slice
///
/// On duplicate ids the first occurrence wins, matching the association
/// store's load policy.
pub fn index_costs(costs: &[Cost]) -> CostIndex<'_> {
    let mut index = HashMap::with_capacity(costs.len());
    for cost in costs {
        index.entry(cost.id.as_str()).or_insert(cost);
    }
    index
}

/// Costs attributed to a single sale
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Sum of allocated shares (unrounded)
    pub total: Decimal,
    /// One line per linked cost, in cost-id order
    pub breakdown: Vec<CostAllocation>,
    /// Non-fatal anomalies found while allocating
    pub issues: Vec<Issue>,
}

/// Allocate the linked costs of one sale
///
/// # Arguments
///
/// * `sale` - The sale to allocate costs to
/// * `costs` - Every cost of the pass, indexed by id
/// * `fan_out_advisory` - Fan-out above which a Warning is emitted
///
/// # Returns
///
/// * `Ok(Allocation)` - with Warning issues for empty or asymmetric back-links
///   and for high fan-out
/// * `Err(Issue)` - a single Critical issue if the sale references one or more
///   missing costs; the sale must be excluded from the result set
pub fn allocate(
    sale: &Sale,
    costs: &CostIndex<'_>,
    fan_out_advisory: usize,
) -> Result<Allocation, Issue> {
    let missing: Vec<&str> = sale
        .linked_cost_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !costs.contains_key(id))
        .collect();

    if !missing.is_empty() {
        return Err(Issue::critical(
            IssueKind::MissingCost,
            SubjectRef::sale(&sale.id),
            format!(
                "Sale {} references missing cost(s): {}",
                sale.id,
                missing.join(", ")
            ),
        ));
    }

    let mut total = Decimal::ZERO;
    let mut breakdown = Vec::with_capacity(sale.linked_cost_ids.len());
    let mut issues = Vec::new();

    for cost_id in &sale.linked_cost_ids {
        let Some(cost) = costs.get(cost_id.as_str()) else {
            continue;
        };

        let shared_with = if cost.is_orphan() {
            issues.push(Issue::warning(
                IssueKind::EmptyBackLink,
                SubjectRef::link(&sale.id, &cost.id),
                format!(
                    "Cost {} has no linked sales but is referenced by sale {}; allocated in full",
                    cost.id, sale.id
                ),
            ));
            1
        } else {
            if !cost.linked_sale_ids.contains(&sale.id) {
                issues.push(Issue::warning(
                    IssueKind::AsymmetricLink,
                    SubjectRef::link(&sale.id, &cost.id),
                    format!("Cost {} does not link back to sale {}", cost.id, sale.id),
                ));
            }
            cost.fan_out()
        };

        if shared_with > fan_out_advisory {
            issues.push(Issue::warning(
                IssueKind::HighFanOut,
                SubjectRef::cost(&cost.id),
                format!(
                    "Cost {} is shared by {} sales (advisory threshold {})",
                    cost.id, shared_with, fan_out_advisory
                ),
            ));
        }

        let allocated_amount = cost.amount / Decimal::from(shared_with);
        total += allocated_amount;

        breakdown.push(CostAllocation {
            cost_id: cost.id.clone(),
            supplier: cost.supplier.clone(),
            description: cost.description.clone(),
            document_number: cost.document_number.clone(),
            date: cost.date,
            total_amount: cost.amount,
            allocated_amount,
            shared_with,
        });
    }

    Ok(Allocation {
        total,
        breakdown,
        issues,
    })
}
