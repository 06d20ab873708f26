//! Integrity validator
//!
//! Read-only scans over the association graph, the calculation results and
//! the dataset as a whole. Nothing here mutates records; every finding is an
//! [`Issue`]:
//!
//! - **Critical**: a link points at a record that does not exist
//! - **Warning**: asymmetric link, implausible fan-out, amount or margin
//! - **Info**: orphan sales and costs

use crate::config::ValidationConfig;
use crate::core::allocation::index_costs;
use crate::core::association_store::AssociationStore;
use crate::core::calculator::DEFAULT_FAN_OUT_ADVISORY;
use crate::types::{
    round_money, CalculationResult, Cost, Issue, IssueKind, Sale, SubjectRef,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Read-only validator
#[derive(Debug, Clone)]
pub struct IntegrityValidator {
    config: ValidationConfig,
    fan_out_advisory: usize,
}

impl Default for IntegrityValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl IntegrityValidator {
    pub fn new(config: ValidationConfig) -> Self {
        IntegrityValidator {
            config,
            fan_out_advisory: DEFAULT_FAN_OUT_ADVISORY,
        }
    }

    pub fn with_fan_out_advisory(mut self, threshold: usize) -> Self {
        self.fan_out_advisory = threshold;
        self
    }

    /// Scan the links held by a store
    pub fn validate_store(&self, store: &AssociationStore) -> Vec<Issue> {
        self.validate_links(store.sales(), store.costs())
    }

    /// Scan links between raw record slices
    ///
    /// Each broken or asymmetric link is reported once, from the side that
    /// holds it. On duplicate ids the first record is the one checked against.
    pub fn validate_links(&self, sales: &[Sale], costs: &[Cost]) -> Vec<Issue> {
        let mut sale_index: HashMap<&str, &Sale> = HashMap::with_capacity(sales.len());
        for sale in sales {
            sale_index.entry(sale.id.as_str()).or_insert(sale);
        }
        let cost_index = index_costs(costs);
        let mut issues = Vec::new();

        for sale in sales {
            if sale.is_orphan() {
                issues.push(Issue::info(
                    IssueKind::OrphanSale,
                    SubjectRef::sale(&sale.id),
                    format!("Sale {} has no linked costs", sale.id),
                ));
            }

            for cost_id in &sale.linked_cost_ids {
                match cost_index.get(cost_id.as_str()) {
                    None => issues.push(Issue::critical(
                        IssueKind::MissingCost,
                        SubjectRef::link(&sale.id, cost_id),
                        format!("Sale {} references missing cost {}", sale.id, cost_id),
                    )),
                    Some(cost) if !cost.linked_sale_ids.contains(&sale.id) => {
                        issues.push(Issue::warning(
                            IssueKind::AsymmetricLink,
                            SubjectRef::link(&sale.id, cost_id),
                            format!("Cost {} does not link back to sale {}", cost_id, sale.id),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        for cost in costs {
            if cost.is_orphan() {
                issues.push(Issue::info(
                    IssueKind::OrphanCost,
                    SubjectRef::cost(&cost.id),
                    format!("Cost {} is not linked to any sale", cost.id),
                ));
            }

            if cost.fan_out() > self.fan_out_advisory {
                issues.push(Issue::warning(
                    IssueKind::HighFanOut,
                    SubjectRef::cost(&cost.id),
                    format!("Cost {} is shared by {} sales", cost.id, cost.fan_out()),
                ));
            }

            for sale_id in &cost.linked_sale_ids {
                match sale_index.get(sale_id.as_str()) {
                    None => issues.push(Issue::critical(
                        IssueKind::MissingSale,
                        SubjectRef::link(sale_id, &cost.id),
                        format!("Cost {} references missing sale {}", cost.id, sale_id),
                    )),
                    Some(sale) if !sale.linked_cost_ids.contains(&cost.id) => {
                        issues.push(Issue::warning(
                            IssueKind::AsymmetricLink,
                            SubjectRef::link(sale_id, &cost.id),
                            format!("Sale {} does not link back to cost {}", sale_id, cost.id),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        tracing::debug!(issues = issues.len(), "link scan complete");
        issues
    }

    /// Plausibility checks on calculated margins
    pub fn validate_results(&self, results: &[CalculationResult]) -> Vec<Issue> {
        let mut issues = Vec::new();

        for result in results {
            let subject = SubjectRef::sale(&result.sale_ref);

            if result.gross_margin < Decimal::ZERO {
                issues.push(Issue::warning(
                    IssueKind::NegativeMargin,
                    subject.clone(),
                    format!(
                        "Sale {} has a negative margin of {}",
                        result.sale_ref, result.gross_margin
                    ),
                ));
            }
            if result.cost_count() == 0 && result.sale_amount > Decimal::ZERO {
                issues.push(Issue::info(
                    IssueKind::OrphanSale,
                    subject.clone(),
                    format!(
                        "Sale {} has no costs; the full amount is taxed as margin",
                        result.sale_ref
                    ),
                ));
            }
            if result.margin_percentage > self.config.high_margin_percentage {
                issues.push(Issue::warning(
                    IssueKind::HighMargin,
                    subject,
                    format!(
                        "Sale {} has an unusually high margin of {}%",
                        result.sale_ref, result.margin_percentage
                    ),
                ));
            }
        }

        issues
    }

    /// Dataset-wide plausibility checks on raw amounts
    pub fn validate_dataset(&self, sales: &[Sale], costs: &[Cost]) -> Vec<Issue> {
        let mut issues = Vec::new();

        for sale in sales {
            if sale.amount.is_zero() {
                issues.push(Issue::warning(
                    IssueKind::ImplausibleAmount,
                    SubjectRef::sale(&sale.id),
                    format!("Sale {} has a zero amount", sale.id),
                ));
            } else if sale.amount > self.config.high_amount {
                issues.push(Issue::warning(
                    IssueKind::ImplausibleAmount,
                    SubjectRef::sale(&sale.id),
                    format!("Sale {} has an unusually high amount of {}", sale.id, sale.amount),
                ));
            }
        }

        for cost in costs {
            if cost.amount > self.config.high_amount {
                issues.push(Issue::warning(
                    IssueKind::ImplausibleAmount,
                    SubjectRef::cost(&cost.id),
                    format!("Cost {} has an unusually high amount of {}", cost.id, cost.amount),
                ));
            }
        }

        let total_sales: Decimal = sales.iter().map(|s| s.amount).sum();
        let total_costs: Decimal = costs.iter().map(|c| c.amount).sum();
        if total_sales > Decimal::ZERO {
            let margin =
                round_money((total_sales - total_costs) / total_sales * Decimal::ONE_HUNDRED);
            if margin > self.config.dataset_margin_ceiling {
                issues.push(Issue::warning(
                    IssueKind::DatasetMargin,
                    SubjectRef::Batch,
                    format!(
                        "Overall margin of {}% is above {}%; some costs may be missing",
                        margin, self.config.dataset_margin_ceiling
                    ),
                ));
            } else if margin < Decimal::ZERO {
                issues.push(Issue::warning(
                    IssueKind::DatasetMargin,
                    SubjectRef::Batch,
                    format!("Overall margin of {}% is negative", margin),
                ));
            }
        }

        issues
    }

    /// Run every check and order the findings by severity
    ///
    /// Within a severity the scan order is kept.
    pub fn validate_all(
        &self,
        store: &AssociationStore,
        results: &[CalculationResult],
    ) -> Vec<Issue> {
        let mut issues = self.validate_store(store);
        issues.extend(self.validate_results(results));
        issues.extend(self.validate_dataset(store.sales(), store.costs()));
        issues.sort_by_key(|issue| issue.severity);
        issues
    }
}
