//! CSV format handling for ledger records and engine output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvSaleRecord / CsvCostRecord structures for deserialization
//! - Conversion from CSV records to domain types
//! - Output serialization for results, summaries, periods, matches and issues
//!
//! All functions are pure (no file I/O) for easy testing.
//!
//! # Input Formats
//!
//! ```text
//! id,number,date,counterparty,amount,linked_costs
//! s1,FT 2025/001,2025-01-15,Atlantic Tours,1000.00,c1;c2
//!
//! id,document_number,date,supplier,description,amount,linked_sales
//! c1,H-77,2025-01-12,Hotel Lisboa,3 nights,600.00,s1;s2
//! ```
//!
//! Link columns hold `;`-separated ids and may be empty.

use crate::core::auto_match::MatchProposal;
use crate::core::diagnostics::ReconciliationReport;
use crate::core::period::MarginSchemeReturn;
use crate::types::{
    round_money, CalculationResult, Cost, Issue, MarginError, PeriodResult, Sale, Summary,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Date format of every date column
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Separator used inside link columns
pub const LINK_SEPARATOR: char = ';';

/// A raw CSV row that converts into a domain record
///
/// Lets the sync and async readers stay generic over sales and costs.
pub trait CsvRow: DeserializeOwned {
    type Record;

    fn convert(self) -> Result<Self::Record, MarginError>;
}

/// CSV record structure for sales
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvSaleRecord {
    pub id: String,
    pub number: String,
    pub date: String,
    pub counterparty: String,
    pub amount: String,
    #[serde(default)]
    pub linked_costs: Option<String>,
}

/// CSV record structure for costs
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvCostRecord {
    pub id: String,
    #[serde(default)]
    pub document_number: Option<String>,
    pub date: String,
    pub supplier: String,
    #[serde(default)]
    pub description: String,
    pub amount: String,
    #[serde(default)]
    pub linked_sales: Option<String>,
}

impl CsvRow for CsvSaleRecord {
    type Record = Sale;

    fn convert(self) -> Result<Sale, MarginError> {
        convert_sale_record(self)
    }
}

impl CsvRow for CsvCostRecord {
    type Record = Cost;

    fn convert(self) -> Result<Cost, MarginError> {
        convert_cost_record(self)
    }
}

/// Convert a CsvSaleRecord to a Sale
///
/// # Errors
///
/// Returns an error if the id is empty, or the date or amount cannot be
/// parsed.
pub fn convert_sale_record(record: CsvSaleRecord) -> Result<Sale, MarginError> {
    let id = require_id(&record.id)?;
    let date = parse_date(&record.date, &id)?;
    let amount = parse_amount(&record.amount, &id)?;

    Ok(Sale::new(id, record.number.trim(), date, record.counterparty.trim(), amount)
        .with_costs(parse_links(record.linked_costs.as_deref())))
}

/// Convert a CsvCostRecord to a Cost
///
/// # Errors
///
/// Returns an error if the id is empty, or the date or amount cannot be
/// parsed.
pub fn convert_cost_record(record: CsvCostRecord) -> Result<Cost, MarginError> {
    let id = require_id(&record.id)?;
    let date = parse_date(&record.date, &id)?;
    let amount = parse_amount(&record.amount, &id)?;

    let mut cost = Cost::new(
        id,
        date,
        record.supplier.trim(),
        record.description.trim(),
        amount,
    )
    .with_sales(parse_links(record.linked_sales.as_deref()));

    if let Some(number) = record.document_number.as_deref().map(str::trim) {
        if !number.is_empty() {
            cost = cost.with_document_number(number);
        }
    }
    Ok(cost)
}

fn require_id(id: &str) -> Result<String, MarginError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(MarginError::ParseError {
            line: None,
            message: "record without id".to_string(),
        });
    }
    Ok(id.to_string())
}

fn parse_date(value: &str, record: &str) -> Result<NaiveDate, MarginError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| MarginError::invalid_date(value, record))
}

fn parse_amount(value: &str, record: &str) -> Result<Decimal, MarginError> {
    Decimal::from_str(value.trim()).map_err(|_| MarginError::invalid_amount(value, record))
}

/// Split a link column into ids, dropping blanks
pub fn parse_links(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(LINK_SEPARATOR)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Format a monetary amount with two decimals
pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", round_money(amount))
}

/// Write per-sale results
///
/// Columns: sale_id, number, category, date, counterparty, sale_amount,
/// allocated_costs, gross_margin, rate, tax, net_margin, margin_pct,
/// cost_count. Rows keep the order of `results`.
pub fn write_results_csv(
    results: &[CalculationResult],
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "sale_id",
        "number",
        "category",
        "date",
        "counterparty",
        "sale_amount",
        "allocated_costs",
        "gross_margin",
        "rate",
        "tax",
        "net_margin",
        "margin_pct",
        "cost_count",
    ])?;

    for result in results {
        writer.write_record(&[
            result.sale_ref.clone(),
            result.sale_number.clone(),
            result.category.to_string(),
            result.date.format(DATE_FORMAT).to_string(),
            result.counterparty.clone(),
            format_money(result.sale_amount),
            format_money(result.allocated_cost_total),
            format_money(result.gross_margin),
            result.rate.normalize().to_string(),
            format_money(result.tax_amount),
            format_money(result.net_margin),
            format_money(result.margin_percentage),
            result.cost_count().to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the cost breakdown behind each result, one row per allocated cost
pub fn write_breakdown_csv(
    results: &[CalculationResult],
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "sale_id",
        "cost_id",
        "supplier",
        "description",
        "document_number",
        "date",
        "cost_amount",
        "shared_with",
        "allocated",
    ])?;

    for result in results {
        for line in &result.cost_breakdown {
            writer.write_record(&[
                result.sale_ref.clone(),
                line.cost_id.clone(),
                line.supplier.clone(),
                line.description.clone(),
                line.document_number.clone().unwrap_or_default(),
                line.date.format(DATE_FORMAT).to_string(),
                format_money(line.total_amount),
                line.shared_with.to_string(),
                format_money(line.allocated_amount),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Write a summary: one row per document category, then a `total` row
///
/// The total row's margin percentage is the sales-weighted average.
pub fn write_summary_csv(summary: &Summary, output: &mut dyn Write) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "category",
        "documents",
        "sales",
        "costs",
        "gross_margin",
        "tax",
        "margin_pct",
    ])?;

    for (category, totals) in &summary.by_category {
        let margin_pct = if totals.total_sales > Decimal::ZERO {
            totals.total_margin / totals.total_sales * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        writer.write_record(&[
            category.to_string(),
            totals.count.to_string(),
            format_money(totals.total_sales),
            format_money(totals.total_costs),
            format_money(totals.total_margin),
            format_money(totals.total_tax),
            format_money(margin_pct),
        ])?;
    }

    writer.write_record(&[
        "total".to_string(),
        summary.documents_processed.to_string(),
        format_money(summary.total_sales),
        format_money(summary.total_costs),
        format_money(summary.total_gross_margin),
        format_money(summary.total_tax),
        format_money(summary.average_margin_percentage),
    ])?;

    writer.flush()?;
    Ok(())
}

/// Write compensated periods, in chain order
pub fn write_periods_csv(
    periods: &[PeriodResult],
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "start",
        "end",
        "sales",
        "costs",
        "gross_margin",
        "carry_forward_in",
        "compensated_margin",
        "vat_base",
        "vat_due",
        "carry_forward_out",
    ])?;

    for period in periods {
        writer.write_record(&[
            period.period.start.format(DATE_FORMAT).to_string(),
            period.period.end.format(DATE_FORMAT).to_string(),
            format_money(period.total_sales),
            format_money(period.total_costs),
            format_money(period.gross_margin),
            format_money(period.carry_forward_in),
            format_money(period.compensated_margin),
            format_money(period.vat_base),
            format_money(period.vat_due),
            format_money(period.carry_forward_out),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the per-sale lines of every period
///
/// Allocated costs and margin are empty for a sale that references a
/// missing cost.
pub fn write_period_details_csv(
    periods: &[PeriodResult],
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "start",
        "end",
        "sale_id",
        "number",
        "date",
        "amount",
        "allocated_costs",
        "margin",
    ])?;

    for period in periods {
        for detail in &period.details {
            writer.write_record(&[
                period.period.start.format(DATE_FORMAT).to_string(),
                period.period.end.format(DATE_FORMAT).to_string(),
                detail.sale_id.clone(),
                detail.number.clone(),
                detail.date.format(DATE_FORMAT).to_string(),
                format_money(detail.amount),
                detail.allocated_costs.map(format_money).unwrap_or_default(),
                detail.margin.map(format_money).unwrap_or_default(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Write periods in the layout of the margin-scheme return
///
/// The `quarter` column reads `2025-Q1` for calendar quarters and is empty
/// otherwise.
pub fn write_returns_csv(
    returns: &[MarginSchemeReturn],
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "start",
        "end",
        "quarter",
        "rate",
        "total_sales",
        "direct_costs",
        "gross_margin",
        "previous_negative_margin",
        "taxable_margin",
        "vat_assessed",
        "negative_margin_to_carry",
    ])?;

    for ret in returns {
        writer.write_record(&[
            ret.period.start.format(DATE_FORMAT).to_string(),
            ret.period.end.format(DATE_FORMAT).to_string(),
            ret.quarter
                .map(|(year, quarter)| format!("{}-Q{}", year, quarter))
                .unwrap_or_default(),
            ret.rate.normalize().to_string(),
            format_money(ret.total_sales),
            format_money(ret.direct_costs),
            format_money(ret.gross_margin),
            format_money(ret.previous_negative_margin),
            format_money(ret.taxable_margin),
            format_money(ret.vat_assessed),
            format_money(ret.negative_margin_to_carry),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write auto-match proposals with their confidence and reasons
pub fn write_matches_csv(
    matches: &[MatchProposal],
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record(["cost_id", "sale_id", "confidence", "reasons"])?;
    for proposal in matches {
        writer.write_record(&[
            proposal.cost_id.clone(),
            proposal.sale_id.clone(),
            format!("{:.1}", proposal.confidence),
            proposal.reasons_text(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write issues in the order given
pub fn write_issues_csv(issues: &[Issue], output: &mut dyn Write) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record(["severity", "kind", "subject", "message"])?;
    for issue in issues {
        writer.write_record(&[
            issue.severity.to_string(),
            issue.kind.to_string(),
            issue.subject.to_string(),
            issue.message.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a reconciliation report as `metric,value` rows
pub fn write_reconciliation_csv(
    report: &ReconciliationReport,
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let mut writer = csv::Writer::from_writer(output);

    let rows = [
        ("sales_count", report.sales_count.to_string()),
        ("costs_count", report.costs_count.to_string()),
        ("calculated_sales", report.calculated_sales.to_string()),
        ("total_sales", format_money(report.total_sales)),
        ("total_costs", format_money(report.total_costs)),
        ("expected_margin", format_money(report.expected_margin)),
        ("allocated_costs", format_money(report.allocated_costs)),
        ("calculated_margin", format_money(report.calculated_margin)),
        ("allocation_delta", format_money(report.allocation_delta)),
        ("margin_delta", format_money(report.margin_delta)),
        ("orphan_sales", report.orphan_sales.to_string()),
        ("orphan_costs", report.orphan_costs.to_string()),
        ("orphan_cost_amount", format_money(report.orphan_cost_amount)),
        ("avg_links_per_sale", format_money(report.avg_links_per_sale)),
        ("avg_links_per_cost", format_money(report.avg_links_per_cost)),
    ];

    writer.write_record(["metric", "value"])?;
    for (metric, value) in rows {
        writer.write_record([metric, value.as_str()])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calculator::{summarize, MarginCalculator};
    use crate::core::period::PeriodEngine;
    use crate::types::{IssueKind, Period, SubjectRef};
    use rstest::rstest;

    fn sale_record(date: &str, amount: &str, links: Option<&str>) -> CsvSaleRecord {
        CsvSaleRecord {
            id: "s1".to_string(),
            number: "FT 2025/001".to_string(),
            date: date.to_string(),
            counterparty: "Atlantic Tours".to_string(),
            amount: amount.to_string(),
            linked_costs: links.map(str::to_string),
        }
    }

    fn written(write: impl FnOnce(&mut Vec<u8>) -> Result<(), MarginError>) -> String {
        let mut output = Vec::new();
        write(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_convert_sale_record() {
        let sale = convert_sale_record(sale_record("2025-01-15", " 1000.50 ", Some("c1; c2;;")))
            .unwrap();
        assert_eq!(sale.id, "s1");
        assert_eq!(sale.amount, Decimal::new(100050, 2));
        assert_eq!(sale.date, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        let links: Vec<&str> = sale.linked_cost_ids.iter().map(String::as_str).collect();
        assert_eq!(links, vec!["c1", "c2"]);
    }

    #[rstest]
    #[case::bad_date("15/01/2025", "100", "Invalid date")]
    #[case::bad_amount("2025-01-15", "1.000,00", "Invalid amount")]
    #[case::empty_amount("2025-01-15", "", "Invalid amount")]
    fn test_convert_sale_record_errors(
        #[case] date: &str,
        #[case] amount: &str,
        #[case] expected: &str,
    ) {
        let error = convert_sale_record(sale_record(date, amount, None)).unwrap_err();
        assert!(error.to_string().contains(expected));
    }

    #[test]
    fn test_convert_cost_record() {
        let record = CsvCostRecord {
            id: "c1".to_string(),
            document_number: Some("  ".to_string()),
            date: "2025-01-12".to_string(),
            supplier: "Hotel Lisboa".to_string(),
            description: "3 nights".to_string(),
            amount: "600".to_string(),
            linked_sales: Some("s1;s2".to_string()),
        };
        let cost = convert_cost_record(record).unwrap();
        assert_eq!(cost.document_number, None);
        assert_eq!(cost.fan_out(), 2);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let mut record = sale_record("2025-01-15", "10", None);
        record.id = " ".to_string();
        assert!(matches!(
            convert_sale_record(record),
            Err(MarginError::ParseError { .. })
        ));
    }

    #[rstest]
    #[case::none(None, vec![])]
    #[case::empty(Some(""), vec![])]
    #[case::single(Some("c1"), vec!["c1"])]
    #[case::spaced(Some(" c1 ; c2 "), vec!["c1", "c2"])]
    fn test_parse_links(#[case] value: Option<&str>, #[case] expected: Vec<&str>) {
        assert_eq!(parse_links(value), expected);
    }

    #[rstest]
    #[case::integer(Decimal::from(5), "5.00")]
    #[case::half_up(Decimal::new(10005, 3), "10.01")]
    #[case::negative(Decimal::new(-5, 1), "-0.50")]
    fn test_format_money(#[case] amount: Decimal, #[case] expected: &str) {
        assert_eq!(format_money(amount), expected);
    }

    #[test]
    fn test_write_results_and_summary() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let sales = vec![
            Sale::new("s1", "FT 1", date, "Client", Decimal::from(1000)).with_costs(["c1"]),
            Sale::new("s2", "FT 2", date, "Client", Decimal::from(2000)).with_costs(["c1"]),
        ];
        let costs = vec![Cost::new("c1", date, "Hotel", "Rooms", Decimal::from(600))
            .with_sales(["s1", "s2"])];
        let run = MarginCalculator::new(Decimal::from(23))
            .unwrap()
            .calculate_all(&sales, &costs);

        let results = written(|out| write_results_csv(&run.results, out));
        assert_eq!(
            results,
            "sale_id,number,category,date,counterparty,sale_amount,allocated_costs,gross_margin,rate,tax,net_margin,margin_pct,cost_count\n\
             s1,FT 1,invoice,2025-01-15,Client,1000.00,300.00,700.00,23,161.00,539.00,70.00,1\n\
             s2,FT 2,invoice,2025-01-15,Client,2000.00,300.00,1700.00,23,391.00,1309.00,85.00,1\n"
        );

        let summary = written(|out| write_summary_csv(&summarize(&run.results), out));
        assert_eq!(
            summary,
            "category,documents,sales,costs,gross_margin,tax,margin_pct\n\
             invoice,2,3000.00,600.00,2400.00,552.00,80.00\n\
             total,2,3000.00,600.00,2400.00,552.00,80.00\n"
        );

        let breakdown = written(|out| write_breakdown_csv(&run.results, out));
        assert_eq!(breakdown.lines().count(), 3);
        assert!(breakdown.contains("s2,c1,Hotel,Rooms,,2025-01-15,600.00,2,300.00"));
    }

    #[test]
    fn test_write_periods() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let costs = vec![Cost::new("c1", date, "A", "B", Decimal::from(500))];
        let (result, _) = PeriodEngine::new(Decimal::from(23)).unwrap().calculate_period(
            &[],
            &costs,
            Period::quarter(2025, 1).unwrap(),
            Decimal::ZERO,
        );

        let output = written(|out| write_periods_csv(&[result], out));
        assert_eq!(
            output,
            "start,end,sales,costs,gross_margin,carry_forward_in,compensated_margin,\
             vat_base,vat_due,carry_forward_out\n\
             2025-01-01,2025-03-31,0.00,500.00,-500.00,0.00,-500.00,0.00,0.00,-500.00\n"
        );
    }

    #[test]
    fn test_write_period_details() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let sales = vec![
            Sale::new("s1", "FT 1", date, "Client", Decimal::from(1000)).with_costs(["c1"]),
            Sale::new("s2", "FT 2", date, "Client", Decimal::from(50)).with_costs(["c404"]),
        ];
        let costs =
            vec![Cost::new("c1", date, "A", "B", Decimal::from(300)).with_sales(["s1"])];
        let (result, _) = PeriodEngine::new(Decimal::from(23)).unwrap().calculate_period(
            &sales,
            &costs,
            Period::quarter(2025, 1).unwrap(),
            Decimal::ZERO,
        );

        let output = written(|out| write_period_details_csv(&[result], out));
        assert_eq!(
            output,
            "start,end,sale_id,number,date,amount,allocated_costs,margin\n\
             2025-01-01,2025-03-31,s1,FT 1,2025-02-01,1000.00,300.00,700.00\n\
             2025-01-01,2025-03-31,s2,FT 2,2025-02-01,50.00,,\n"
        );
    }

    #[test]
    fn test_write_returns() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        let costs = vec![Cost::new("c1", date, "A", "B", Decimal::from(500))];
        let (result, _) = PeriodEngine::new(Decimal::from(23)).unwrap().calculate_period(
            &[],
            &costs,
            Period::quarter(2025, 1).unwrap(),
            Decimal::ZERO,
        );

        let returns = [MarginSchemeReturn::from_period(&result)];
        let output = written(|out| write_returns_csv(&returns, out));
        assert_eq!(
            output,
            "start,end,quarter,rate,total_sales,direct_costs,gross_margin,\
             previous_negative_margin,taxable_margin,vat_assessed,negative_margin_to_carry\n\
             2025-01-01,2025-03-31,2025-Q1,23,0.00,500.00,-500.00,0.00,0.00,0.00,500.00\n"
        );
    }

    #[test]
    fn test_write_issues() {
        let issues = vec![Issue::critical(
            IssueKind::MissingCost,
            SubjectRef::sale("s1"),
            "Sale s1 references missing cost(s): c404",
        )];
        let output = written(|out| write_issues_csv(&issues, out));
        assert_eq!(
            output,
            "severity,kind,subject,message\n\
             critical,missing_cost,sale:s1,Sale s1 references missing cost(s): c404\n"
        );
    }

    #[test]
    fn test_write_empty_matches() {
        let output = written(|out| write_matches_csv(&[], out));
        assert_eq!(output, "cost_id,sale_id,confidence,reasons\n");
    }
}
