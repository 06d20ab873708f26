//! Subcommand execution
//!
//! Every subcommand follows the same pipeline:
//!
//! ```text
//! LoadingStrategy → Ledger → AssociationStore → engine pass → CSV on `output`
//!                                                     ↓
//!                                      issues → --issues file (optional)
//! ```

use super::args::{AutoMatchArgs, CalculateArgs, CliArgs, Command, PeriodsArgs, StrategyType};
use crate::config::EngineConfig;
use crate::core::{
    reconcile, summarize, verify_chain, AssociationStore, AutoMatcher, IntegrityValidator,
    MarginCalculator, MarginSchemeReturn, PeriodChain, PeriodEngine,
};
use crate::io::csv_format::{
    write_breakdown_csv, write_issues_csv, write_matches_csv, write_period_details_csv,
    write_periods_csv, write_reconciliation_csv, write_results_csv, write_returns_csv,
    write_summary_csv,
};
use crate::strategy::create_strategy;
use crate::types::{Issue, MarginError, Period};
use chrono::Datelike;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Run the parsed command line, writing the primary CSV to `output`
///
/// # Errors
///
/// Returns an error for configuration problems, unreadable input files,
/// an invalid rate or out-of-order periods. Record-level problems never
/// fail the run; they are reported as issues.
pub fn run(args: &CliArgs, output: &mut dyn Write) -> Result<(), MarginError> {
    let config = args.engine_config()?;
    let rate = config.rate()?;

    let batch_config = match args.strategy {
        StrategyType::Async => Some(args.to_batch_config()),
        StrategyType::Sync => None,
    };
    let strategy = create_strategy(args.strategy, batch_config);

    let ledger_args = args.command.ledger();
    let ledger = strategy.load(&ledger_args.sales, &ledger_args.costs)?;
    if ledger.skipped_rows > 0 {
        tracing::warn!(skipped_rows = ledger.skipped_rows, "malformed rows were skipped");
    }

    let (store, mut issues) = ledger.into_store();
    let mut store = store.with_limits(config.association.clone());
    let calculator =
        MarginCalculator::new(rate)?.with_fan_out_advisory(config.allocation.fan_out_advisory);

    match &args.command {
        Command::Calculate(calc_args) => {
            run_calculate(calc_args, &config, &calculator, &mut store, &mut issues, output)?
        }
        Command::Periods(period_args) => {
            run_periods(period_args, &store, PeriodEngine::new(rate)?, &mut issues, output)?
        }
        Command::AutoMatch(match_args) => {
            run_auto_match(match_args, &config, &mut store, output)?
        }
        Command::Validate(_) => {
            let run = calculator.calculate_all(store.sales(), store.costs());
            let validator = IntegrityValidator::new(config.validation.clone())
                .with_fan_out_advisory(config.allocation.fan_out_advisory);
            issues.extend(validator.validate_all(&store, &run.results));
            issues.sort_by_key(|issue| issue.severity);
            write_issues_csv(&issues, output)?;
        }
        Command::Diagnostics(_) => {
            let run = calculator.calculate_store(&mut store);
            issues.extend(run.issues);
            let report = reconcile(store.sales(), store.costs(), &run.results, &config.validation);
            if !report.is_reconciled() {
                tracing::warn!(
                    delta = %report.allocation_delta,
                    "allocated costs do not reconcile with total costs"
                );
            }
            issues.extend(report.issues.iter().cloned());
            write_reconciliation_csv(&report, output)?;
        }
    }

    report_issues(&issues, args.issues.as_deref())
}

fn run_calculate(
    args: &CalculateArgs,
    config: &EngineConfig,
    calculator: &MarginCalculator,
    store: &mut AssociationStore,
    issues: &mut Vec<Issue>,
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    if args.auto_match {
        let outcome = AutoMatcher::new(config.matching.clone()).apply(store);
        tracing::info!(links_created = outcome.links_created, "auto-match links created");
    }

    let run = if args.no_heal {
        calculator.calculate_all(store.sales(), store.costs())
    } else {
        calculator.calculate_store(store)
    };
    issues.extend(run.issues);

    write_results_csv(&run.results, output)?;

    if let Some(path) = &args.breakdown {
        write_to_file(path, |out| write_breakdown_csv(&run.results, out))?;
    }
    if let Some(path) = &args.summary {
        let summary = summarize(&run.results);
        write_to_file(path, |out| write_summary_csv(&summary, out))?;
    }
    Ok(())
}

fn run_periods(
    args: &PeriodsArgs,
    store: &AssociationStore,
    engine: PeriodEngine,
    issues: &mut Vec<Issue>,
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let periods = if !args.periods.is_empty() {
        args.periods.clone()
    } else if let Some(year) = args.year {
        Period::quarters(year)?
    } else {
        covering_quarters(store)?
    };

    let mut chain =
        PeriodChain::new(engine).with_opening_carry_forward(args.opening_carry_forward);
    chain.extend(store.sales(), store.costs(), periods)?;
    tracing::info!(carry_forward = %chain.carry_forward(), "period chain closed");

    let results = chain.into_results();
    issues.extend(verify_chain(&results));

    if let Some(path) = &args.details {
        write_to_file(path, |out| write_period_details_csv(&results, out))?;
    }

    if args.returns {
        let returns: Vec<MarginSchemeReturn> =
            results.iter().map(MarginSchemeReturn::from_period).collect();
        write_returns_csv(&returns, output)
    } else {
        write_periods_csv(&results, output)
    }
}

fn run_auto_match(
    args: &AutoMatchArgs,
    config: &EngineConfig,
    store: &mut AssociationStore,
    output: &mut dyn Write,
) -> Result<(), MarginError> {
    let matcher = AutoMatcher::new(config.matching.clone());

    let matches = if args.dry_run {
        matcher.propose(store)
    } else {
        let outcome = matcher.apply(store);
        tracing::info!(
            links_created = outcome.links_created,
            capped = outcome.capped,
            "auto-match applied"
        );
        outcome.matches
    };

    write_matches_csv(&matches, output)
}

/// Every calendar quarter from the first to the last year with a dated record
fn covering_quarters(store: &AssociationStore) -> Result<Vec<Period>, MarginError> {
    let years: Vec<i32> = store
        .sales()
        .iter()
        .map(|s| s.date.year())
        .chain(store.costs().iter().map(|c| c.date.year()))
        .collect();

    let (Some(&first), Some(&last)) = (years.iter().min(), years.iter().max()) else {
        return Ok(Vec::new());
    };

    let mut periods = Vec::new();
    for year in first..=last {
        periods.extend(Period::quarters(year)?);
    }
    Ok(periods)
}

fn report_issues(issues: &[Issue], path: Option<&Path>) -> Result<(), MarginError> {
    let mut critical = 0;
    for issue in issues.iter().filter(|issue| issue.is_critical()) {
        tracing::warn!(subject = %issue.subject, "{}", issue.message);
        critical += 1;
    }
    tracing::info!(issues = issues.len(), critical, "run complete");

    match path {
        Some(path) => write_to_file(path, |out| write_issues_csv(issues, out)),
        None => Ok(()),
    }
}

fn write_to_file<F>(path: &Path, write: F) -> Result<(), MarginError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), MarginError>,
{
    let mut file = BufWriter::new(File::create(path)?);
    write(&mut file)?;
    file.flush()?;
    Ok(())
}
