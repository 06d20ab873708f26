//! Fiscal period types
//!
//! A [`Period`] is a closed date interval. A [`PeriodResult`] is the outcome
//! of one compensation step and carries both the carry-forward received from
//! the previous period and the one handed on to the next.

use super::error::MarginError;
use super::record::SaleId;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Closed date interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    /// Create a period, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, MarginError> {
        if start > end {
            return Err(MarginError::invalid_period(start, end));
        }
        Ok(Period { start, end })
    }

    /// Calendar quarter `quarter` (1-4) of `year`
    pub fn quarter(year: i32, quarter: u32) -> Result<Self, MarginError> {
        if !(1..=4).contains(&quarter) {
            return Err(MarginError::InvalidQuarter { year, quarter });
        }

        let first_month = (quarter - 1) * 3 + 1;
        let start = NaiveDate::from_ymd_opt(year, first_month, 1)
            .ok_or(MarginError::InvalidQuarter { year, quarter })?;
        // Day before the first day of the next quarter
        let next_start = if quarter == 4 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, first_month + 3, 1)
        }
        .ok_or(MarginError::InvalidQuarter { year, quarter })?;
        let end = next_start
            .pred_opt()
            .ok_or(MarginError::InvalidQuarter { year, quarter })?;

        Period::new(start, end)
    }

    /// The four calendar quarters of `year`, in chronological order
    pub fn quarters(year: i32) -> Result<Vec<Self>, MarginError> {
        (1..=4).map(|q| Period::quarter(year, q)).collect()
    }

    /// Whether `date` falls inside the period (both ends inclusive)
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Quarter number if the period is exactly a calendar quarter
    pub fn as_quarter(&self) -> Option<(i32, u32)> {
        let year = self.start.year();
        let quarter = (self.start.month() - 1) / 3 + 1;
        match Period::quarter(year, quarter) {
            Ok(q) if q == *self => Some((year, quarter)),
            _ => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for Period {
    type Err = MarginError;

    /// Parse `YYYY-MM-DD..YYYY-MM-DD`, the same shape [`Display`](fmt::Display) prints
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || MarginError::config(format!("Invalid period '{}': expected START..END", s));
        let (start, end) = s.split_once("..").ok_or_else(invalid)?;
        let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
        let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
        Period::new(start, end)
    }
}

/// Outcome of compensating one period
///
/// Amounts are kept at full precision; formatting rounds them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodResult {
    pub period: Period,
    pub rate: Decimal,
    pub sales_count: usize,
    pub costs_count: usize,
    pub total_sales: Decimal,
    pub total_costs: Decimal,
    /// `total_sales - total_costs`, may be negative
    pub gross_margin: Decimal,
    /// Magnitude of the negative margin received from the previous period (>= 0)
    pub carry_forward_in: Decimal,
    /// `gross_margin - carry_forward_in`
    pub compensated_margin: Decimal,
    /// `max(compensated_margin, 0)`
    pub vat_base: Decimal,
    pub vat_due: Decimal,
    /// `min(compensated_margin, 0)`, handed to the next period
    pub carry_forward_out: Decimal,
    /// Sales dated in the period, in input order; not part of the totals
    pub details: Vec<PeriodSaleDetail>,
}

/// One sale of a period with the margin of its own linked costs
///
/// Costs are allocated by fan-out as in the per-sale calculation, so these
/// lines show which sales drove a period's margin. They never feed the
/// period-aggregate totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSaleDetail {
    pub sale_id: SaleId,
    pub number: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    /// `None` if the sale references a missing cost
    pub allocated_costs: Option<Decimal>,
    /// `amount - allocated_costs`
    pub margin: Option<Decimal>,
}

/// Regional VAT rate presets
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum VatRegion {
    /// Mainland standard rate
    #[default]
    Continental,
    Madeira,
    Azores,
    /// Intermediate rate
    Intermediate,
    /// Reduced rate
    Reduced,
}

impl VatRegion {
    /// Percentage rate for the region
    pub fn rate(&self) -> Decimal {
        match self {
            VatRegion::Continental => Decimal::from(23),
            VatRegion::Madeira => Decimal::from(22),
            VatRegion::Azores => Decimal::from(18),
            VatRegion::Intermediate => Decimal::from(13),
            VatRegion::Reduced => Decimal::from(6),
        }
    }
}
