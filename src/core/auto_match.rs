//! Heuristic auto-match engine
//!
//! Proposes sale-cost associations for costs that are not linked to any sale
//! yet. Every candidate pair is scored from 0 to 100 out of weak signals:
//!
//! - **date proximity**: tiered, decaying linearly inside each tier; zero
//!   for pairs further apart than the maximum span
//! - **value ratio**: a cost is usually a plausible fraction of the sale
//! - **lexical overlap**: shared tokens between supplier/description and
//!   counterparty/document number
//! - **ordering bonus**: the cost predates the invoice it belongs to
//!
//! [`AutoMatcher::propose`] is pure and returns ranked proposals;
//! [`AutoMatcher::apply`] writes them into the store through the symmetric
//! link operation, so every created link can be reversed with
//! [`AssociationStore::unlink`].

use crate::config::MatchConfig;
use crate::core::association_store::AssociationStore;
use crate::types::{Cost, CostId, DocumentCategory, Sale, SaleId};
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeSet;
use std::fmt;

/// Upper bound of a confidence score
pub const MAX_CONFIDENCE: f64 = 100.0;

/// One signal that contributed to a match score
#[derive(Debug, Clone, PartialEq)]
pub enum MatchReason {
    DateProximity { days: i64, points: f64 },
    ValueRatio { ratio: f64, typical: bool, points: f64 },
    SharedKeywords { keywords: Vec<String>, points: f64 },
    CostPredatesInvoice { points: f64 },
}

impl MatchReason {
    pub fn points(&self) -> f64 {
        match self {
            MatchReason::DateProximity { points, .. }
            | MatchReason::ValueRatio { points, .. }
            | MatchReason::SharedKeywords { points, .. }
            | MatchReason::CostPredatesInvoice { points } => *points,
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchReason::DateProximity { days, .. } => write!(f, "dates {} day(s) apart", days),
            MatchReason::ValueRatio { ratio, typical, .. } => {
                let band = if *typical { "typical" } else { "plausible" };
                write!(f, "{} value ratio ({:.0}%)", band, ratio * 100.0)
            }
            MatchReason::SharedKeywords { keywords, .. } => {
                write!(f, "shared keywords: {}", keywords.join(", "))
            }
            MatchReason::CostPredatesInvoice { .. } => f.write_str("cost predates invoice"),
        }
    }
}

/// Score of one cost-sale pair
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    /// Clamped to `[0, 100]`
    pub confidence: f64,
    pub reasons: Vec<MatchReason>,
}

/// A proposed association
#[derive(Debug, Clone, PartialEq)]
pub struct MatchProposal {
    pub cost_id: CostId,
    pub sale_id: SaleId,
    pub confidence: f64,
    pub reasons: Vec<MatchReason>,
}

impl MatchProposal {
    /// Reasons joined for display, e.g. `dates 2 day(s) apart; cost predates invoice`
    pub fn reasons_text(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Result of applying proposals to a store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AutoMatchOutcome {
    /// Proposals that were written into the store
    pub matches: Vec<MatchProposal>,
    pub links_created: usize,
    /// Whether the global match cap stopped the run
    pub capped: bool,
}

/// Heuristic matcher
#[derive(Debug, Clone, Default)]
pub struct AutoMatcher {
    config: MatchConfig,
}

impl AutoMatcher {
    /// Create a matcher; out-of-range settings fall back to their defaults
    pub fn new(config: MatchConfig) -> Self {
        AutoMatcher {
            config: config.validated(),
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Score one cost against one sale
    ///
    /// Returns the clamped score and the signals that contributed to it.
    /// Beyond the maximum date span the date signal adds nothing, but the
    /// other signals are still counted.
    pub fn score(&self, cost: &Cost, sale: &Sale) -> MatchScore {
        let days = (sale.date - cost.date).num_days().abs();
        let mut reasons = Vec::new();

        let date_points = if days > self.config.max_date_span_days {
            0.0
        } else {
            self.date_points(days)
        };
        if date_points > 0.0 {
            reasons.push(MatchReason::DateProximity {
                days,
                points: date_points,
            });
        }

        if let Some(reason) = self.value_reason(cost, sale) {
            reasons.push(reason);
        }

        let keywords = self.shared_keywords(cost, sale);
        if !keywords.is_empty() {
            let saturation = self.config.keyword_saturation as f64;
            let points = (keywords.len() as f64 / saturation).min(1.0) * self.config.keyword_points;
            reasons.push(MatchReason::SharedKeywords { keywords, points });
        }

        if sale.category() == DocumentCategory::Invoice && cost.date < sale.date {
            reasons.push(MatchReason::CostPredatesInvoice {
                points: self.config.ordering_bonus,
            });
        }

        let total: f64 = reasons.iter().map(MatchReason::points).sum();
        MatchScore {
            confidence: total.clamp(0.0, MAX_CONFIDENCE),
            reasons,
        }
    }

    /// Rank candidate sales for every unlinked cost
    ///
    /// Costs are visited in input order. For each, candidates at or above the
    /// threshold are sorted by descending confidence (ties keep sale input
    /// order) and the top `max_per_cost` are kept. Proposals stop once
    /// `max_matches` have been collected.
    pub fn propose(&self, store: &AssociationStore) -> Vec<MatchProposal> {
        self.rank(store).0
    }

    /// Propose and link in one step
    pub fn apply(&self, store: &mut AssociationStore) -> AutoMatchOutcome {
        let (proposals, capped) = self.rank(store);
        let mut outcome = AutoMatchOutcome {
            capped,
            ..AutoMatchOutcome::default()
        };

        for proposal in proposals {
            match store.link(&proposal.sale_id, &proposal.cost_id) {
                Ok(created) => {
                    if created {
                        outcome.links_created += 1;
                    }
                    outcome.matches.push(proposal);
                }
                Err(e) => tracing::warn!("auto-match link skipped: {}", e),
            }
        }

        if outcome.capped {
            tracing::info!(
                max_matches = self.config.max_matches,
                "auto-match stopped at the match cap"
            );
        }
        tracing::debug!(links_created = outcome.links_created, "auto-match applied");
        outcome
    }

    /// Ranked proposals, and whether the global cap cut off any candidate
    fn rank(&self, store: &AssociationStore) -> (Vec<MatchProposal>, bool) {
        let mut proposals = Vec::new();
        let mut capped = false;

        for cost in store.unlinked_costs() {
            let mut candidates: Vec<(&Sale, MatchScore)> = store
                .sales()
                .iter()
                .map(|sale| (sale, self.score(cost, sale)))
                .filter(|(_, score)| score.confidence >= self.config.threshold)
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let room = self.config.max_matches - proposals.len();
            if room == 0 {
                capped = true;
                break;
            }

            // Stable: equal scores keep input order
            candidates.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence));
            let keep = candidates.len().min(self.config.max_per_cost);
            if keep > room {
                capped = true;
            }

            for (sale, score) in candidates.into_iter().take(keep.min(room)) {
                proposals.push(MatchProposal {
                    cost_id: cost.id.clone(),
                    sale_id: sale.id.clone(),
                    confidence: score.confidence,
                    reasons: score.reasons,
                });
            }
        }

        tracing::debug!(proposals = proposals.len(), capped, "auto-match proposals ranked");
        (proposals, capped)
    }

    fn date_points(&self, days: i64) -> f64 {
        let tiers = &self.config.date_tiers;
        for (i, tier) in tiers.iter().enumerate() {
            if days < tier.from_days || days > tier.to_days {
                continue;
            }
            let (floor, width) = match tiers.get(i + 1) {
                Some(next) => (next.ceiling, (next.from_days - tier.from_days) as f64),
                None => (0.0, (tier.to_days - tier.from_days + 1) as f64),
            };
            let progress = (days - tier.from_days) as f64 / width;
            return tier.ceiling - (tier.ceiling - floor) * progress;
        }
        0.0
    }

    fn value_reason(&self, cost: &Cost, sale: &Sale) -> Option<MatchReason> {
        if sale.amount.is_sign_negative() || sale.amount.is_zero() || cost.amount >= sale.amount {
            return None;
        }
        let ratio = (cost.amount / sale.amount).to_f64()?;
        if ratio < self.config.min_value_ratio || ratio > self.config.max_value_ratio {
            return None;
        }

        let typical =
            self.config.typical_ratio_low <= ratio && ratio <= self.config.typical_ratio_high;
        let points = if typical {
            self.config.value_points
        } else {
            self.config.value_points / 2.0
        };
        Some(MatchReason::ValueRatio {
            ratio,
            typical,
            points,
        })
    }

    fn shared_keywords(&self, cost: &Cost, sale: &Sale) -> Vec<String> {
        let cost_tokens = self.tokens(&[&cost.supplier, &cost.description]);
        let sale_tokens = self.tokens(&[&sale.counterparty, &sale.number]);
        cost_tokens.intersection(&sale_tokens).cloned().collect()
    }

    /// Lowercase alphanumeric tokens, without short tokens and stop-words
    fn tokens(&self, fields: &[&str]) -> BTreeSet<String> {
        fields
            .iter()
            .flat_map(|field| field.split(|c: char| !c.is_alphanumeric()))
            .map(str::to_lowercase)
            .filter(|token| token.chars().count() >= self.config.min_keyword_length)
            .filter(|token| !self.config.stop_words.iter().any(|w| w == token))
            .collect()
    }
}
