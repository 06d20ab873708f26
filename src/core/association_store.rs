//! Bidirectional many-to-many association store
//!
//! This module provides the AssociationStore that owns the Sale and Cost
//! records of one session and every link between them. A link is recorded on
//! both sides: the cost id in the sale's `linked_cost_ids` and the sale id in
//! the cost's `linked_sale_ids`. All mutation goes through [`link`],
//! [`unlink`] and [`associate`], which always update both sides together.
//!
//! # Ownership
//!
//! The store is owned by exactly one logical session. It performs no internal
//! locking; callers must serialize mutation against calculation passes.
//!
//! # Duplicate Handling
//!
//! If a duplicate record id is encountered at load time, only the first
//! occurrence is kept and a Warning issue is reported.
//!
//! [`link`]: AssociationStore::link
//! [`unlink`]: AssociationStore::unlink
//! [`associate`]: AssociationStore::associate

use crate::config::AssociationLimits;
use crate::types::{Cost, CostId, Issue, IssueKind, MarginError, Sale, SaleId, SubjectRef};
use std::collections::{HashMap, HashSet};

/// Result of an association operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationOutcome {
    /// Number of sale-cost pairs that were not (fully) linked before
    pub links_created: usize,
    /// Advisory issues (unknown ids, mass association, over-linked costs)
    pub issues: Vec<Issue>,
}

/// In-memory association graph between sales and costs
///
/// Records keep their input order, which the auto-match engine relies on for
/// deterministic tie-breaking.
#[derive(Debug, Clone, Default)]
pub struct AssociationStore {
    sales: Vec<Sale>,
    costs: Vec<Cost>,
    sale_index: HashMap<SaleId, usize>,
    cost_index: HashMap<CostId, usize>,
    limits: AssociationLimits,
}

impl AssociationStore {
    /// Create an empty store with default association limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from loaded records
    ///
    /// Existing link sets are taken as given, even when they are asymmetric
    /// or point at missing records: reporting those is the integrity
    /// validator's job.
    ///
    /// # Returns
    ///
    /// The store and one Warning issue per duplicate id that was dropped.
    pub fn from_records(sales: Vec<Sale>, costs: Vec<Cost>) -> (Self, Vec<Issue>) {
        let mut store = Self::new();
        let mut issues = Vec::new();

        for sale in sales {
            if let Some(issue) = store.insert_sale(sale) {
                issues.push(issue);
            }
        }
        for cost in costs {
            if let Some(issue) = store.insert_cost(cost) {
                issues.push(issue);
            }
        }

        (store, issues)
    }

    /// Replace the advisory limits used by [`associate`](Self::associate)
    pub fn with_limits(mut self, limits: AssociationLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Insert a sale; the first occurrence of an id wins
    pub fn insert_sale(&mut self, sale: Sale) -> Option<Issue> {
        if self.sale_index.contains_key(&sale.id) {
            tracing::warn!(sale = %sale.id, "duplicate sale id ignored");
            return Some(Issue::warning(
                IssueKind::DuplicateRecord,
                SubjectRef::sale(&sale.id),
                format!("Duplicate sale id {}; first occurrence kept", sale.id),
            ));
        }
        self.sale_index.insert(sale.id.clone(), self.sales.len());
        self.sales.push(sale);
        None
    }

    /// Insert a cost; the first occurrence of an id wins
    pub fn insert_cost(&mut self, cost: Cost) -> Option<Issue> {
        if self.cost_index.contains_key(&cost.id) {
            tracing::warn!(cost = %cost.id, "duplicate cost id ignored");
            return Some(Issue::warning(
                IssueKind::DuplicateRecord,
                SubjectRef::cost(&cost.id),
                format!("Duplicate cost id {}; first occurrence kept", cost.id),
            ));
        }
        self.cost_index.insert(cost.id.clone(), self.costs.len());
        self.costs.push(cost);
        None
    }

    /// All sales, in input order
    pub fn sales(&self) -> &[Sale] {
        &self.sales
    }

    /// All costs, in input order
    pub fn costs(&self) -> &[Cost] {
        &self.costs
    }

    pub fn sale(&self, id: &str) -> Option<&Sale> {
        self.sale_index.get(id).map(|&i| &self.sales[i])
    }

    pub fn cost(&self, id: &str) -> Option<&Cost> {
        self.cost_index.get(id).map(|&i| &self.costs[i])
    }

    /// Costs with no linked sale, in input order
    pub fn unlinked_costs(&self) -> impl Iterator<Item = &Cost> {
        self.costs.iter().filter(|cost| cost.is_orphan())
    }

    /// Number of sale-side links
    pub fn link_count(&self) -> usize {
        self.sales.iter().map(|s| s.linked_cost_ids.len()).sum()
    }

    /// Link one sale to one cost, on both sides
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - if either side of the link was newly recorded
    /// * `Ok(false)` - if the link already existed on both sides
    ///
    /// # Errors
    ///
    /// Returns `UnknownSale` / `UnknownCost` if an id is not in the store.
    pub fn link(&mut self, sale_id: &str, cost_id: &str) -> Result<bool, MarginError> {
        let sale_idx = *self
            .sale_index
            .get(sale_id)
            .ok_or_else(|| MarginError::unknown_sale(sale_id))?;
        let cost_idx = *self
            .cost_index
            .get(cost_id)
            .ok_or_else(|| MarginError::unknown_cost(cost_id))?;

        let sale_side = self.sales[sale_idx]
            .linked_cost_ids
            .insert(cost_id.to_string());
        let cost_side = self.costs[cost_idx]
            .linked_sale_ids
            .insert(sale_id.to_string());

        Ok(sale_side || cost_side)
    }

    /// Remove the link between a sale and a cost, on both sides
    ///
    /// Symmetric with [`link`](Self::link). A one-sided (asymmetric) link is
    /// removed as well. Unknown ids are not an error: there is nothing to
    /// remove.
    ///
    /// # Returns
    ///
    /// `true` if anything was removed
    pub fn unlink(&mut self, sale_id: &str, cost_id: &str) -> bool {
        let mut removed = false;

        if let Some(&i) = self.sale_index.get(sale_id) {
            removed |= self.sales[i].linked_cost_ids.remove(cost_id);
        }
        if let Some(&j) = self.cost_index.get(cost_id) {
            removed |= self.costs[j].linked_sale_ids.remove(sale_id);
        }

        if removed {
            tracing::debug!(sale = sale_id, cost = cost_id, "link removed");
        }
        removed
    }

    /// Link every given sale to every given cost
    ///
    /// Duplicate ids in the request are ignored; ids unknown to the store are
    /// skipped with a Warning. The operation also reports:
    /// - a mass-association Warning when both lists are larger than
    ///   `mass_side_threshold` and their product exceeds `mass_total_threshold`
    /// - an over-linked Warning for every requested cost whose resulting
    ///   fan-out exceeds `over_linked_threshold`
    ///
    /// # Arguments
    ///
    /// * `sale_ids` - Sales to link
    /// * `cost_ids` - Costs to link
    pub fn associate<S, C>(&mut self, sale_ids: &[S], cost_ids: &[C]) -> AssociationOutcome
    where
        S: AsRef<str>,
        C: AsRef<str>,
    {
        let mut outcome = AssociationOutcome::default();

        let sales = self.known_ids(sale_ids, true, &mut outcome.issues);
        let costs = self.known_ids(cost_ids, false, &mut outcome.issues);

        let requested = sales.len() * costs.len();
        if sales.len() > self.limits.mass_side_threshold
            && costs.len() > self.limits.mass_side_threshold
            && requested > self.limits.mass_total_threshold
        {
            tracing::warn!(
                sales = sales.len(),
                costs = costs.len(),
                requested,
                "large association request"
            );
            outcome.issues.push(Issue::warning(
                IssueKind::MassAssociation,
                SubjectRef::Batch,
                format!(
                    "Creating up to {} associations ({} sales x {} costs); consider linking costs to specific sales",
                    requested,
                    sales.len(),
                    costs.len()
                ),
            ));
        }

        for sale_id in &sales {
            for cost_id in &costs {
                // Both ids were checked against the indexes above
                if let Ok(true) = self.link(sale_id, cost_id) {
                    outcome.links_created += 1;
                }
            }
        }

        for cost_id in &costs {
            if let Some(cost) = self.cost(cost_id) {
                if cost.fan_out() > self.limits.over_linked_threshold {
                    outcome.issues.push(Issue::warning(
                        IssueKind::HighFanOut,
                        SubjectRef::cost(cost_id),
                        format!(
                            "Cost '{}' is now linked to {} sales",
                            cost.supplier,
                            cost.fan_out()
                        ),
                    ));
                }
            }
        }

        tracing::debug!(
            links_created = outcome.links_created,
            issues = outcome.issues.len(),
            "association applied"
        );
        outcome
    }

    /// Restore every missing cost-side back-link
    ///
    /// A sale that references an existing cost whose `linked_sale_ids` lacks
    /// the sale gets the back-link added. Sale-side gaps (a cost pointing at a
    /// sale that does not point back) are left alone: the sale side is what
    /// drives allocation, so adding links there would change which costs a
    /// sale carries.
    ///
    /// # Returns
    ///
    /// One Info issue per restored link
    pub fn heal_back_links(&mut self) -> Vec<Issue> {
        let mut issues = Vec::new();

        for sale in &self.sales {
            for cost_id in &sale.linked_cost_ids {
                let Some(&j) = self.cost_index.get(cost_id) else {
                    continue;
                };
                if self.costs[j].linked_sale_ids.insert(sale.id.clone()) {
                    tracing::debug!(sale = %sale.id, cost = %cost_id, "back-link restored");
                    issues.push(Issue::info(
                        IssueKind::BackLinkRestored,
                        SubjectRef::link(&sale.id, cost_id),
                        format!(
                            "Restored missing back-link from cost {} to sale {}",
                            cost_id, sale.id
                        ),
                    ));
                }
            }
        }

        issues
    }

    /// Consume the store, returning the records
    pub fn into_parts(self) -> (Vec<Sale>, Vec<Cost>) {
        (self.sales, self.costs)
    }

    fn known_ids<T: AsRef<str>>(
        &self,
        ids: &[T],
        sale_side: bool,
        issues: &mut Vec<Issue>,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut known = Vec::new();

        for id in ids {
            let id = id.as_ref();
            if !seen.insert(id) {
                continue;
            }
            let exists = if sale_side {
                self.sale_index.contains_key(id)
            } else {
                self.cost_index.contains_key(id)
            };
            if exists {
                known.push(id.to_string());
            } else {
                let (subject, label) = if sale_side {
                    (SubjectRef::sale(id), "Sale")
                } else {
                    (SubjectRef::cost(id), "Cost")
                };
                issues.push(Issue::warning(
                    IssueKind::UnknownRecord,
                    subject,
                    format!("{} {} not found; skipped", label, id),
                ));
            }
        }

        known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    fn sale(id: &str) -> Sale {
        Sale::new(id, format!("FT {}", id), date(), "Client", Decimal::from(1000))
    }

    fn cost(id: &str) -> Cost {
        Cost::new(id, date(), "Supplier", "Service", Decimal::from(300))
    }

    fn store(sales: &[&str], costs: &[&str]) -> AssociationStore {
        let (store, issues) = AssociationStore::from_records(
            sales.iter().map(|id| sale(id)).collect(),
            costs.iter().map(|id| cost(id)).collect(),
        );
        assert!(issues.is_empty());
        store
    }

    #[test]
    fn test_link_is_bidirectional() {
        let mut store = store(&["s1"], &["c1"]);

        assert!(store.link("s1", "c1").unwrap());
        assert!(store.sale("s1").unwrap().linked_cost_ids.contains("c1"));
        assert!(store.cost("c1").unwrap().linked_sale_ids.contains("s1"));

        // Second link is a no-op
        assert!(!store.link("s1", "c1").unwrap());
        assert_eq!(store.link_count(), 1);
    }

    #[test]
    fn test_link_unknown_ids() {
        let mut store = store(&["s1"], &["c1"]);
        assert!(matches!(
            store.link("s9", "c1"),
            Err(MarginError::UnknownSale { .. })
        ));
        assert!(matches!(
            store.link("s1", "c9"),
            Err(MarginError::UnknownCost { .. })
        ));
        assert_eq!(store.link_count(), 0);
    }

    #[test]
    fn test_unlink_is_symmetric_and_reversible() {
        let mut store = store(&["s1"], &["c1"]);
        store.link("s1", "c1").unwrap();

        assert!(store.unlink("s1", "c1"));
        assert!(store.sale("s1").unwrap().is_orphan());
        assert!(store.cost("c1").unwrap().is_orphan());

        // Nothing left to remove
        assert!(!store.unlink("s1", "c1"));
        assert!(!store.unlink("s9", "c9"));
    }

    #[test]
    fn test_unlink_removes_asymmetric_link() {
        let (mut store, _) = AssociationStore::from_records(
            vec![sale("s1").with_costs(["c1"])],
            vec![cost("c1")],
        );
        assert!(store.unlink("s1", "c1"));
        assert!(store.sale("s1").unwrap().is_orphan());
    }

    #[test]
    fn test_associate_cartesian_product() {
        let mut store = store(&["s1", "s2"], &["c1", "c2", "c3"]);

        let outcome = store.associate(&["s1", "s2"], &["c1", "c2", "c3"]);
        assert_eq!(outcome.links_created, 6);
        assert!(outcome.issues.is_empty());
        assert_eq!(store.cost("c2").unwrap().fan_out(), 2);

        // Repeating the request creates nothing new
        let outcome = store.associate(&["s1", "s2"], &["c1", "c2", "c3"]);
        assert_eq!(outcome.links_created, 0);
    }

    #[test]
    fn test_associate_deduplicates_request() {
        let mut store = store(&["s1"], &["c1"]);
        let outcome = store.associate(&["s1", "s1"], &["c1", "c1"]);
        assert_eq!(outcome.links_created, 1);
    }

    #[test]
    fn test_associate_skips_unknown_ids() {
        let mut store = store(&["s1"], &["c1"]);
        let outcome = store.associate(&["s1", "ghost"], &["c1", "phantom"]);

        assert_eq!(outcome.links_created, 1);
        assert_eq!(outcome.issues.len(), 2);
        assert!(outcome
            .issues
            .iter()
            .all(|i| i.kind == IssueKind::UnknownRecord));
    }

    #[test]
    fn test_associate_mass_warning() {
        let sale_ids: Vec<String> = (0..11).map(|i| format!("s{}", i)).collect();
        let cost_ids: Vec<String> = (0..11).map(|i| format!("c{}", i)).collect();
        let sales: Vec<&str> = sale_ids.iter().map(String::as_str).collect();
        let costs: Vec<&str> = cost_ids.iter().map(String::as_str).collect();
        let mut store = store(&sales, &costs);

        let outcome = store.associate(&sale_ids, &cost_ids);
        assert_eq!(outcome.links_created, 121);
        assert!(outcome
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::MassAssociation && i.subject == SubjectRef::Batch));
        // Every cost ends up linked to 11 sales
        assert_eq!(
            outcome
                .issues
                .iter()
                .filter(|i| i.kind == IssueKind::HighFanOut)
                .count(),
            11
        );
    }

    #[test]
    fn test_associate_custom_limits() {
        let mut store = store(&["s1", "s2", "s3"], &["c1"]).with_limits(AssociationLimits {
            mass_side_threshold: 10,
            mass_total_threshold: 100,
            over_linked_threshold: 2,
        });
        let outcome = store.associate(&["s1", "s2", "s3"], &["c1"]);
        assert_eq!(outcome.links_created, 3);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].kind, IssueKind::HighFanOut);
    }

    #[test]
    fn test_duplicate_ids_first_wins() {
        let first = sale("s1");
        let mut second = sale("s1");
        second.amount = Decimal::from(5);

        let (store, issues) =
            AssociationStore::from_records(vec![first, second], vec![cost("c1"), cost("c1")]);

        assert_eq!(store.sales().len(), 1);
        assert_eq!(store.costs().len(), 1);
        assert_eq!(store.sale("s1").unwrap().amount, Decimal::from(1000));
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.kind == IssueKind::DuplicateRecord));
    }

    #[test]
    fn test_unlinked_costs_in_input_order() {
        let mut store = store(&["s1"], &["c3", "c1", "c2"]);
        store.link("s1", "c1").unwrap();

        let ids: Vec<&str> = store.unlinked_costs().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c3", "c2"]);
    }

    #[test]
    fn test_heal_back_links() {
        let (mut store, _) = AssociationStore::from_records(
            vec![sale("s1").with_costs(["c1", "missing"])],
            vec![cost("c1")],
        );

        let issues = store.heal_back_links();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::BackLinkRestored);
        assert_eq!(issues[0].subject, SubjectRef::link("s1", "c1"));
        assert!(store.cost("c1").unwrap().linked_sale_ids.contains("s1"));

        // Idempotent
        assert!(store.heal_back_links().is_empty());
    }
}
