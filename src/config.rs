//! Engine configuration
//!
//! Every tunable threshold of the engine lives here, with defaults matching
//! the behaviour expected by margin-scheme practitioners. Configuration can
//! come from three layers, later layers winning:
//!
//! 1. [`EngineConfig::default`]
//! 2. An optional TOML file (`--config engine.toml`)
//! 3. CLI flags
//!
//! Out-of-range values never abort a run: they are replaced by the default
//! and a warning is logged, the same way the batch configuration does.
//!
//! ```toml
//! region = "madeira"
//!
//! [matching]
//! threshold = 55.0
//! max_per_cost = 3
//! ```

use crate::types::{MarginError, VatRegion};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit percentage rate; takes precedence over `region` when set
    pub vat_rate: Option<Decimal>,
    /// Regional rate preset used when no explicit rate is given
    pub region: VatRegion,
    pub allocation: AllocationConfig,
    pub association: AssociationLimits,
    pub matching: MatchConfig,
    pub validation: ValidationConfig,
}

impl EngineConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, MarginError> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config.validated())
    }

    /// Read and parse a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, MarginError> {
        if !path.exists() {
            return Err(MarginError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Effective percentage rate
    ///
    /// # Errors
    ///
    /// Returns `InvalidRate` if an explicit rate lies outside `[0, 100]`.
    /// Unlike the heuristic thresholds, a wrong rate is never silently
    /// replaced: it would change the tax due.
    pub fn rate(&self) -> Result<Decimal, MarginError> {
        let rate = self.vat_rate.unwrap_or_else(|| self.region.rate());
        validate_rate(rate)
    }

    /// Replace out-of-range values by their defaults, logging each fallback
    pub fn validated(mut self) -> Self {
        self.allocation = self.allocation.validated();
        self.association = self.association.validated();
        self.matching = self.matching.validated();
        self
    }
}

/// Check that a percentage rate lies within `[0, 100]`
pub fn validate_rate(rate: Decimal) -> Result<Decimal, MarginError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
        return Err(MarginError::invalid_rate(rate));
    }
    Ok(rate)
}

/// Allocation engine tunables
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// A cost shared by more sales than this emits an advisory
    pub fan_out_advisory: usize,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            fan_out_advisory: 10,
        }
    }
}

impl AllocationConfig {
    fn validated(self) -> Self {
        if self.fan_out_advisory == 0 {
            let default = Self::default();
            tracing::warn!(
                value = self.fan_out_advisory,
                fallback = default.fan_out_advisory,
                "invalid allocation.fan_out_advisory, using default"
            );
            return default;
        }
        self
    }
}

/// Thresholds for advisory issues raised by association operations
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssociationLimits {
    /// Both id lists must exceed this size for a mass-association warning
    pub mass_side_threshold: usize,
    /// ... and their product must exceed this
    pub mass_total_threshold: usize,
    /// A cost whose resulting fan-out exceeds this is reported as over-linked
    pub over_linked_threshold: usize,
}

impl Default for AssociationLimits {
    fn default() -> Self {
        Self {
            mass_side_threshold: 10,
            mass_total_threshold: 100,
            over_linked_threshold: 10,
        }
    }
}

impl AssociationLimits {
    fn validated(self) -> Self {
        let default = Self::default();
        if self.mass_side_threshold == 0
            || self.mass_total_threshold == 0
            || self.over_linked_threshold == 0
        {
            tracing::warn!(?self, "zero association limit, using defaults");
            return default;
        }
        self
    }
}

/// One date-proximity tier of the auto-match scorer
///
/// Within `[from_days, to_days]` the score decreases linearly from `ceiling`
/// towards the next tier's ceiling (or zero for the last tier).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DateTier {
    pub from_days: i64,
    pub to_days: i64,
    pub ceiling: f64,
}

impl DateTier {
    pub const fn new(from_days: i64, to_days: i64, ceiling: f64) -> Self {
        Self {
            from_days,
            to_days,
            ceiling,
        }
    }
}

/// Auto-match engine tunables
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Minimum confidence (0-100) for a candidate to be linked
    pub threshold: f64,
    /// Top-K sales linked per cost
    pub max_per_cost: usize,
    /// Stop once this many links have been created in one run
    pub max_matches: usize,
    /// Pairs further apart than this get no date points
    pub max_date_span_days: i64,
    pub date_tiers: Vec<DateTier>,
    pub min_value_ratio: f64,
    pub max_value_ratio: f64,
    pub typical_ratio_low: f64,
    pub typical_ratio_high: f64,
    /// Points for a ratio in the typical sub-band; half outside it
    pub value_points: f64,
    /// Points for full lexical overlap
    pub keyword_points: f64,
    /// Number of shared tokens at which the lexical score saturates
    pub keyword_saturation: usize,
    pub min_keyword_length: usize,
    /// Bonus when the cost predates an invoice
    pub ordering_bonus: f64,
    pub stop_words: Vec<String>,
}

/// Upper bound accepted for `max_per_cost`
pub const MAX_PER_COST_LIMIT: usize = 10;

/// Upper bound accepted for `max_matches`
pub const MAX_MATCHES_LIMIT: usize = 1000;

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 60.0,
            max_per_cost: 5,
            max_matches: 50,
            max_date_span_days: 30,
            date_tiers: vec![
                DateTier::new(0, 7, 40.0),
                DateTier::new(8, 14, 30.0),
                DateTier::new(15, 30, 20.0),
            ],
            min_value_ratio: 0.1,
            max_value_ratio: 0.8,
            typical_ratio_low: 0.2,
            typical_ratio_high: 0.4,
            value_points: 30.0,
            keyword_points: 30.0,
            keyword_saturation: 3,
            min_keyword_length: 3,
            ordering_bonus: 10.0,
            stop_words: [
                "de", "da", "do", "e", "em", "para", "com", "lda", "sa", "unipessoal", "ltd",
                "inc",
            ]
            .iter()
            .map(|w| w.to_string())
            .collect(),
        }
    }
}

impl MatchConfig {
    /// Replace out-of-range values by their defaults, logging each fallback
    pub fn validated(mut self) -> Self {
        let default = Self::default();

        if !(0.0..=100.0).contains(&self.threshold) {
            tracing::warn!(
                value = self.threshold,
                fallback = default.threshold,
                "invalid matching.threshold, using default"
            );
            self.threshold = default.threshold;
        }

        if self.max_per_cost == 0 || self.max_per_cost > MAX_PER_COST_LIMIT {
            tracing::warn!(
                value = self.max_per_cost,
                fallback = default.max_per_cost,
                "invalid matching.max_per_cost, using default"
            );
            self.max_per_cost = default.max_per_cost;
        }

        if self.max_matches == 0 || self.max_matches > MAX_MATCHES_LIMIT {
            tracing::warn!(
                value = self.max_matches,
                fallback = default.max_matches,
                "invalid matching.max_matches, using default"
            );
            self.max_matches = default.max_matches;
        }

        let ratios_ordered = 0.0 <= self.min_value_ratio
            && self.min_value_ratio <= self.typical_ratio_low
            && self.typical_ratio_low <= self.typical_ratio_high
            && self.typical_ratio_high <= self.max_value_ratio;
        if !ratios_ordered {
            tracing::warn!("value ratio bands are not nested, using default bands");
            self.min_value_ratio = default.min_value_ratio;
            self.max_value_ratio = default.max_value_ratio;
            self.typical_ratio_low = default.typical_ratio_low;
            self.typical_ratio_high = default.typical_ratio_high;
        }

        let tiers_ordered = !self.date_tiers.is_empty()
            && self
                .date_tiers
                .iter()
                .all(|t| 0 <= t.from_days && t.from_days <= t.to_days && t.ceiling >= 0.0)
            && self
                .date_tiers
                .windows(2)
                .all(|w| w[0].to_days < w[1].from_days);
        if !tiers_ordered {
            tracing::warn!("date tiers are empty or overlapping, using default tiers");
            self.date_tiers = default.date_tiers;
        }

        if self.keyword_saturation == 0 {
            self.keyword_saturation = default.keyword_saturation;
        }

        self
    }
}

/// Plausibility bounds used by the integrity validator
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Documents above this amount are flagged as implausible
    pub high_amount: Decimal,
    /// Per-sale margin percentage above this is flagged
    pub high_margin_percentage: Decimal,
    /// Dataset-wide margin percentage above this is flagged
    pub dataset_margin_ceiling: Decimal,
    /// Average links per record above this is flagged as mass association
    pub density_threshold: Decimal,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            high_amount: Decimal::from(50_000),
            high_margin_percentage: Decimal::from(80),
            dataset_margin_ceiling: Decimal::from(40),
            density_threshold: Decimal::from(20),
        }
    }
}
