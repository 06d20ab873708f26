//! Period compensation engine
//!
//! Negative margins of one fiscal period are compensated against positive
//! margins of the following periods. Each period is computed with the
//! period-aggregate model: all sales and all costs dated inside the period,
//! regardless of linkage.
//!
//! ```text
//! gross_margin       = Σ sales(P) - Σ costs(P)
//! compensated_margin = gross_margin - |carry_forward_in|
//! vat_base           = max(compensated_margin, 0)
//! vat_due            = vat_base * rate / 100
//! carry_forward_out  = min(compensated_margin, 0)
//! ```
//!
//! Each result also lists the sales of the period with the margin of their
//! own linked costs, for audit. Those lines are not used by the formulas.
//!
//! Periods must be processed in strict chronological order. The engine itself
//! is stateless; [`PeriodChain`] threads the carry-forward from one period to
//! the next and refuses out-of-order periods.

use crate::config::validate_rate;
use crate::core::allocation::{allocate, index_costs};
use crate::types::{
    round_money, Cost, Issue, IssueKind, MarginError, Period, PeriodResult, PeriodSaleDetail,
    Sale, SubjectRef,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Tolerance used when re-checking VAT amounts of a chain
const VAT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Stateless per-period calculator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodEngine {
    rate: Decimal,
}

impl PeriodEngine {
    /// Create an engine for a percentage rate
    ///
    /// # Errors
    ///
    /// Returns `InvalidRate` if `rate` lies outside `[0, 100]`
    pub fn new(rate: Decimal) -> Result<Self, MarginError> {
        Ok(PeriodEngine {
            rate: validate_rate(rate)?,
        })
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    /// Compensate one period
    ///
    /// # Arguments
    ///
    /// * `sales` - All sales; only those dated inside `period` are counted
    /// * `costs` - All costs; only those dated inside `period` are counted
    /// * `period` - Inclusive period bounds
    /// * `carry_forward_in` - Negative margin received from the previous
    ///   period; its sign is ignored
    ///
    /// # Returns
    ///
    /// The period result and the carry-forward to hand to the next period
    /// (zero or negative)
    pub fn calculate_period(
        &self,
        sales: &[Sale],
        costs: &[Cost],
        period: Period,
        carry_forward_in: Decimal,
    ) -> (PeriodResult, Decimal) {
        let cost_index = index_costs(costs);
        let details: Vec<PeriodSaleDetail> = sales
            .iter()
            .filter(|s| period.contains(s.date))
            .map(|sale| {
                let allocated_costs = allocate(sale, &cost_index, usize::MAX)
                    .ok()
                    .map(|allocation| allocation.total);
                PeriodSaleDetail {
                    sale_id: sale.id.clone(),
                    number: sale.number.clone(),
                    date: sale.date,
                    amount: sale.amount,
                    allocated_costs,
                    margin: allocated_costs.map(|allocated| sale.amount - allocated),
                }
            })
            .collect();
        let sales_count = details.len();
        let total_sales: Decimal = details.iter().map(|d| d.amount).sum();
        let (costs_count, total_costs) = costs
            .iter()
            .filter(|c| period.contains(c.date))
            .fold((0usize, Decimal::ZERO), |(n, sum), c| (n + 1, sum + c.amount));

        let carry_forward_in = carry_forward_in.abs();
        let gross_margin = total_sales - total_costs;
        let compensated_margin = gross_margin - carry_forward_in;
        let vat_base = compensated_margin.max(Decimal::ZERO);
        let vat_due = vat_base * self.rate / Decimal::ONE_HUNDRED;
        let carry_forward_out = compensated_margin.min(Decimal::ZERO);

        tracing::debug!(
            %period,
            sales = sales_count,
            costs = costs_count,
            %gross_margin,
            %carry_forward_out,
            "period compensated"
        );

        let result = PeriodResult {
            period,
            rate: self.rate,
            sales_count,
            costs_count,
            total_sales,
            total_costs,
            gross_margin,
            carry_forward_in,
            compensated_margin,
            vat_base,
            vat_due,
            carry_forward_out,
            details,
        };
        (result, carry_forward_out)
    }
}

/// Ordered sequence of compensated periods
///
/// Owns the running carry-forward so callers cannot feed a period with the
/// wrong one.
#[derive(Debug, Clone)]
pub struct PeriodChain {
    engine: PeriodEngine,
    carry_forward: Decimal,
    previous_end: Option<NaiveDate>,
    results: Vec<PeriodResult>,
}

impl PeriodChain {
    /// Start an empty chain with no opening carry-forward
    pub fn new(engine: PeriodEngine) -> Self {
        PeriodChain {
            engine,
            carry_forward: Decimal::ZERO,
            previous_end: None,
            results: Vec::new(),
        }
    }

    /// Start the chain with a negative margin carried over from before the
    /// first period (e.g. the last return of the previous year)
    pub fn with_opening_carry_forward(mut self, carry_forward: Decimal) -> Self {
        self.carry_forward = -carry_forward.abs();
        self
    }

    /// Compensate the next period
    ///
    /// # Errors
    ///
    /// Returns `PeriodOutOfOrder` if `period` starts on or before the end of
    /// the previously accepted period. The chain is left unchanged.
    pub fn push(
        &mut self,
        sales: &[Sale],
        costs: &[Cost],
        period: Period,
    ) -> Result<&PeriodResult, MarginError> {
        if let Some(previous_end) = self.previous_end {
            if period.start <= previous_end {
                return Err(MarginError::period_out_of_order(previous_end, period.start));
            }
        }

        let (result, carry_forward_out) =
            self.engine.calculate_period(sales, costs, period, self.carry_forward);
        self.carry_forward = carry_forward_out;
        self.previous_end = Some(period.end);
        self.results.push(result);

        Ok(&self.results[self.results.len() - 1])
    }

    /// Compensate several periods in order
    pub fn extend<I>(
        &mut self,
        sales: &[Sale],
        costs: &[Cost],
        periods: I,
    ) -> Result<(), MarginError>
    where
        I: IntoIterator<Item = Period>,
    {
        for period in periods {
            self.push(sales, costs, period)?;
        }
        Ok(())
    }

    /// Carry-forward that the next period will receive (zero or negative)
    pub fn carry_forward(&self) -> Decimal {
        self.carry_forward
    }

    pub fn results(&self) -> &[PeriodResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<PeriodResult> {
        self.results
    }
}

/// Summary of one period in the shape of the margin-scheme tax return
///
/// All money fields are rounded to cents. The negative margin to carry is
/// reported as a positive magnitude, as on the return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginSchemeReturn {
    pub period: Period,
    /// `(year, quarter)` when the period is a calendar quarter
    pub quarter: Option<(i32, u32)>,
    pub rate: Decimal,
    pub total_sales: Decimal,
    pub direct_costs: Decimal,
    pub gross_margin: Decimal,
    pub previous_negative_margin: Decimal,
    pub taxable_margin: Decimal,
    pub vat_assessed: Decimal,
    pub negative_margin_to_carry: Decimal,
}

impl MarginSchemeReturn {
    pub fn from_period(result: &PeriodResult) -> Self {
        MarginSchemeReturn {
            period: result.period,
            quarter: result.period.as_quarter(),
            rate: result.rate,
            total_sales: round_money(result.total_sales),
            direct_costs: round_money(result.total_costs),
            gross_margin: round_money(result.gross_margin),
            previous_negative_margin: round_money(result.carry_forward_in),
            taxable_margin: round_money(result.vat_base),
            vat_assessed: round_money(result.vat_due),
            negative_margin_to_carry: round_money(result.carry_forward_out.abs()),
        }
    }
}

/// Re-check the compensation invariants of a chain of period results
///
/// Reports a Critical issue for every period that:
/// - does not start after the previous one ends
/// - received a carry-forward different from what the previous period handed on
/// - has a VAT amount that differs from `vat_base * rate / 100` by more than 0.01
pub fn verify_chain(results: &[PeriodResult]) -> Vec<Issue> {
    let mut issues = Vec::new();

    for (i, result) in results.iter().enumerate() {
        let subject = SubjectRef::Period {
            start: result.period.start,
            end: result.period.end,
        };

        if let Some(previous) = i.checked_sub(1).map(|p| &results[p]) {
            if result.period.start <= previous.period.end {
                issues.push(Issue::critical(
                    IssueKind::PeriodChain,
                    subject.clone(),
                    format!(
                        "Period {} does not follow period {}",
                        result.period, previous.period
                    ),
                ));
            }

            let expected = previous.carry_forward_out.abs();
            if result.carry_forward_in != expected {
                issues.push(Issue::critical(
                    IssueKind::PeriodChain,
                    subject.clone(),
                    format!(
                        "Carry-forward in {} does not match previous carry-forward out {}",
                        round_money(result.carry_forward_in),
                        round_money(expected)
                    ),
                ));
            }
        }

        let expected_vat = result.vat_base * result.rate / Decimal::ONE_HUNDRED;
        if (result.vat_due - expected_vat).abs() > VAT_TOLERANCE {
            issues.push(Issue::critical(
                IssueKind::PeriodChain,
                subject,
                format!(
                    "VAT due {} differs from {} at {}%",
                    round_money(result.vat_due),
                    round_money(expected_vat),
                    result.rate
                ),
            ));
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sale(id: &str, on: NaiveDate, amount: &str) -> Sale {
        Sale::new(id, format!("FT {}", id), on, "Client", dec(amount))
    }

    fn cost(id: &str, on: NaiveDate, amount: &str) -> Cost {
        Cost::new(id, on, "Supplier", "Service", dec(amount))
    }

    fn engine() -> PeriodEngine {
        PeriodEngine::new(Decimal::from(23)).unwrap()
    }

    /// Q1 closes at -500, Q2 earns 800
    fn two_quarter_ledger() -> (Vec<Sale>, Vec<Cost>) {
        (
            vec![
                sale("s1", date(2025, 2, 10), "1000"),
                sale("s2", date(2025, 5, 5), "1800"),
            ],
            vec![
                cost("c1", date(2025, 3, 31), "1500"),
                cost("c2", date(2025, 4, 1), "1000"),
            ],
        )
    }

    #[test]
    fn test_negative_margin_is_compensated_next_period() {
        let (sales, costs) = two_quarter_ledger();
        let engine = engine();

        let q1 = Period::quarter(2025, 1).unwrap();
        let (first, carry) = engine.calculate_period(&sales, &costs, q1, Decimal::ZERO);
        assert_eq!(first.gross_margin, dec("-500"));
        assert_eq!(first.vat_due, Decimal::ZERO);
        assert_eq!(first.carry_forward_out, dec("-500"));
        assert_eq!(carry, dec("-500"));

        let q2 = Period::quarter(2025, 2).unwrap();
        let (second, carry) = engine.calculate_period(&sales, &costs, q2, carry);
        assert_eq!(second.gross_margin, dec("800"));
        assert_eq!(second.carry_forward_in, dec("500"));
        assert_eq!(second.compensated_margin, dec("300"));
        assert_eq!(second.vat_base, dec("300"));
        assert_eq!(round_money(second.vat_due), dec("69.00"));
        assert_eq!(carry, Decimal::ZERO);
    }

    #[rstest]
    #[case::negative_sign("-100")]
    #[case::positive_sign("100")]
    fn test_carry_forward_sign_is_ignored(#[case] carry_in: &str) {
        let sales = vec![sale("s1", date(2025, 1, 10), "150")];
        let period = Period::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap();

        let (result, carry) = engine().calculate_period(&sales, &[], period, dec(carry_in));
        assert_eq!(result.carry_forward_in, dec("100"));
        assert_eq!(result.compensated_margin, dec("50"));
        assert_eq!(carry, Decimal::ZERO);
    }

    #[test]
    fn test_bounds_are_inclusive_and_links_ignored() {
        let period = Period::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap();
        let sales = vec![
            sale("s1", date(2025, 1, 1), "100"),
            sale("s2", date(2025, 1, 31), "100"),
            sale("s3", date(2025, 2, 1), "999"),
        ];
        // Unlinked cost still counts
        let costs = vec![cost("c1", date(2025, 1, 15), "50")];

        let (result, _) = engine().calculate_period(&sales, &costs, period, Decimal::ZERO);
        assert_eq!(result.sales_count, 2);
        assert_eq!(result.costs_count, 1);
        assert_eq!(result.gross_margin, dec("150"));
    }

    #[test]
    fn test_details_list_sales_with_linked_costs() {
        let q2 = Period::quarter(2025, 2).unwrap();
        let sales = vec![
            sale("s1", date(2025, 4, 10), "1000").with_costs(["c1"]),
            sale("s2", date(2025, 5, 20), "400").with_costs(["c1"]),
            sale("s3", date(2025, 6, 1), "300").with_costs(["c404"]),
            sale("s4", date(2025, 7, 1), "999"),
        ];
        // Linked cost dated in the previous quarter still counts for the detail
        let costs = vec![cost("c1", date(2025, 3, 28), "600").with_sales(["s1", "s2"])];

        let (result, _) = engine().calculate_period(&sales, &costs, q2, Decimal::ZERO);
        let lines: Vec<(&str, Option<Decimal>)> = result
            .details
            .iter()
            .map(|d| (d.sale_id.as_str(), d.margin))
            .collect();
        assert_eq!(
            lines,
            vec![
                ("s1", Some(dec("700"))),
                ("s2", Some(dec("100"))),
                ("s3", None),
            ]
        );
        assert_eq!(result.details[0].allocated_costs, Some(dec("300")));

        // Totals stay on the period-aggregate model
        assert_eq!(result.sales_count, 3);
        assert_eq!(result.total_costs, Decimal::ZERO);
        assert_eq!(result.gross_margin, dec("1700"));
    }

    #[test]
    fn test_chain_threads_carry_forward() {
        let sales = vec![sale("s2", date(2025, 2, 10), "50")];
        let costs = vec![cost("c1", date(2025, 1, 10), "100")];
        let mut chain = PeriodChain::new(engine());

        let january = Period::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap();
        let february = Period::new(date(2025, 2, 1), date(2025, 2, 28)).unwrap();

        let first = chain.push(&sales, &costs, january).unwrap();
        assert_eq!(first.carry_forward_out, dec("-100"));

        let second = chain.push(&sales, &costs, february).unwrap();
        assert_eq!(second.carry_forward_in, dec("100"));
        assert_eq!(second.carry_forward_out, dec("-50"));
        assert_eq!(chain.carry_forward(), dec("-50"));
        assert!(verify_chain(chain.results()).is_empty());
    }

    #[rstest]
    #[case::same_period(date(2025, 1, 1), date(2025, 3, 31))]
    #[case::overlapping(date(2025, 3, 31), date(2025, 4, 30))]
    #[case::earlier(date(2024, 10, 1), date(2024, 12, 31))]
    fn test_chain_rejects_out_of_order(#[case] start: NaiveDate, #[case] end: NaiveDate) {
        let mut chain = PeriodChain::new(engine());
        chain.push(&[], &[], Period::quarter(2025, 1).unwrap()).unwrap();

        let result = chain.push(&[], &[], Period::new(start, end).unwrap());
        assert!(matches!(result, Err(MarginError::PeriodOutOfOrder { .. })));
        assert_eq!(chain.results().len(), 1);
    }

    #[test]
    fn test_opening_carry_forward() {
        let sales = vec![sale("s1", date(2025, 1, 10), "1000")];
        let mut chain = PeriodChain::new(engine()).with_opening_carry_forward(dec("400"));
        let result = chain
            .push(&sales, &[], Period::quarter(2025, 1).unwrap())
            .unwrap();
        assert_eq!(result.carry_forward_in, dec("400"));
        assert_eq!(result.vat_base, dec("600"));
    }

    #[test]
    fn test_margin_scheme_return() {
        let (sales, costs) = two_quarter_ledger();
        let mut chain = PeriodChain::new(engine());
        chain
            .extend(&sales, &costs, Period::quarters(2025).unwrap())
            .unwrap();

        let q2 = MarginSchemeReturn::from_period(&chain.results()[1]);
        assert_eq!(q2.quarter, Some((2025, 2)));
        assert_eq!(q2.total_sales, dec("1800.00"));
        assert_eq!(q2.direct_costs, dec("1000.00"));
        assert_eq!(q2.previous_negative_margin, dec("500.00"));
        assert_eq!(q2.taxable_margin, dec("300.00"));
        assert_eq!(q2.vat_assessed, dec("69.00"));
        assert_eq!(q2.negative_margin_to_carry, Decimal::ZERO);

        let q1 = MarginSchemeReturn::from_period(&chain.results()[0]);
        assert_eq!(q1.negative_margin_to_carry, dec("500.00"));
    }

    #[test]
    fn test_verify_chain_detects_broken_carry_forward() {
        let (sales, costs) = two_quarter_ledger();
        let engine = engine();
        let q1 = Period::quarter(2025, 1).unwrap();
        let q2 = Period::quarter(2025, 2).unwrap();
        let (first, _) = engine.calculate_period(&sales, &costs, q1, Decimal::ZERO);
        // Second period computed as if Q1 had no loss
        let (second, _) = engine.calculate_period(&sales, &costs, q2, Decimal::ZERO);

        let issues = verify_chain(&[first, second]);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_critical());
        assert_eq!(issues[0].kind, IssueKind::PeriodChain);
    }

    #[test]
    fn test_verify_chain_detects_wrong_vat() {
        let sales = vec![sale("s1", date(2025, 1, 10), "1000")];
        let (mut result, _) = engine().calculate_period(
            &sales,
            &[],
            Period::quarter(2025, 1).unwrap(),
            Decimal::ZERO,
        );
        result.vat_due += dec("0.02");

        let issues = verify_chain(&[result]);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_invalid_rate() {
        assert!(matches!(
            PeriodEngine::new(Decimal::from(101)),
            Err(MarginError::InvalidRate { .. })
        ));
    }
}
