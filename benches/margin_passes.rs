//! Benchmark suite for loading strategies and engine passes
//!
//! Compares the synchronous and asynchronous loading strategies, then times
//! the calculation, period and auto-match passes on generated ledgers,
//! using the divan benchmarking framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```
//!
//! # Generated Ledgers
//!
//! Every sale shares one cost with its neighbour and owns one cost of its
//! own, so each cost has a fan-out of one or two. Every tenth cost is left
//! unlinked so the auto-matcher has work to do.

use chrono::{Duration, NaiveDate};
use margin_vat_engine::cli::StrategyType;
use margin_vat_engine::core::{
    AssociationStore, AutoMatcher, MarginCalculator, PeriodChain, PeriodEngine,
};
use margin_vat_engine::strategy::{create_strategy, BatchConfig};
use margin_vat_engine::types::{Cost, Period, Sale};
use rust_decimal::Decimal;
use std::io::Write;
use tempfile::NamedTempFile;

fn main() {
    divan::main();
}

const SIZES: &[usize] = &[100, 1_000, 10_000];

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date")
}

/// Sales `s{i}` and costs `c{i}` with the link pattern described above
fn ledger(size: usize) -> (Vec<Sale>, Vec<Cost>) {
    let mut sales = Vec::with_capacity(size);
    let mut costs = Vec::with_capacity(size);

    for i in 0..size {
        let date = base_date() + Duration::days((i % 365) as i64);
        let cost_links: Vec<String> = if i % 10 == 9 {
            Vec::new()
        } else if i + 1 < size && (i + 1) % 10 != 9 {
            vec![format!("c{}", i), format!("c{}", i + 1)]
        } else {
            vec![format!("c{}", i)]
        };

        sales.push(
            Sale::new(
                format!("s{}", i),
                format!("FT 2025/{}", i),
                date,
                format!("Client {}", i % 50),
                Decimal::from(1000 + (i % 17) as i64 * 25),
            )
            .with_costs(cost_links),
        );
        costs.push(Cost::new(
            format!("c{}", i),
            date - Duration::days(2),
            format!("Supplier {}", i % 30),
            format!("Client {} services", i % 50),
            Decimal::from(250 + (i % 13) as i64 * 10),
        ));
    }

    // Back-links mirror the sale side
    let (mut store, _) = AssociationStore::from_records(sales, costs);
    store.heal_back_links();
    store.into_parts()
}

/// Write a ledger to temporary sales and costs CSV files
fn ledger_files(size: usize) -> (NamedTempFile, NamedTempFile) {
    let (sales, costs) = ledger(size);

    let mut sales_file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(sales_file, "id,number,date,counterparty,amount,linked_costs").expect("write");
    for s in &sales {
        let links: Vec<&str> = s.linked_cost_ids.iter().map(String::as_str).collect();
        writeln!(
            sales_file,
            "{},{},{},{},{},{}",
            s.id,
            s.number,
            s.date,
            s.counterparty,
            s.amount,
            links.join(";")
        )
        .expect("write");
    }

    let mut costs_file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(
        costs_file,
        "id,document_number,date,supplier,description,amount,linked_sales"
    )
    .expect("write");
    for c in &costs {
        let links: Vec<&str> = c.linked_sale_ids.iter().map(String::as_str).collect();
        writeln!(
            costs_file,
            "{},,{},{},{},{},{}",
            c.id,
            c.date,
            c.supplier,
            c.description,
            c.amount,
            links.join(";")
        )
        .expect("write");
    }

    (sales_file, costs_file)
}

/// Benchmark the synchronous loading strategy
#[divan::bench(args = SIZES)]
fn sync_strategy_load(bencher: divan::Bencher, size: usize) {
    let (sales, costs) = ledger_files(size);
    let strategy = create_strategy(StrategyType::Sync, None);

    bencher.bench_local(|| {
        strategy
            .load(sales.path(), costs.path())
            .expect("Loading failed")
    });
}

/// Benchmark the asynchronous loading strategy
#[divan::bench(args = SIZES)]
fn async_strategy_load(bencher: divan::Bencher, size: usize) {
    let (sales, costs) = ledger_files(size);
    let strategy = create_strategy(StrategyType::Async, Some(BatchConfig::default()));

    bencher.bench_local(|| {
        strategy
            .load(sales.path(), costs.path())
            .expect("Loading failed")
    });
}

/// Benchmark a full per-sale calculation pass
#[divan::bench(args = SIZES)]
fn calculate_all(bencher: divan::Bencher, size: usize) {
    let (sales, costs) = ledger(size);
    let calculator = MarginCalculator::new(Decimal::from(23)).expect("valid rate");

    bencher.bench_local(|| calculator.calculate_all(&sales, &costs));
}

/// Benchmark a four-quarter period chain
#[divan::bench(args = SIZES)]
fn period_chain(bencher: divan::Bencher, size: usize) {
    let (sales, costs) = ledger(size);
    let periods = Period::quarters(2025).expect("valid year");

    bencher.bench_local(|| {
        let engine = PeriodEngine::new(Decimal::from(23)).expect("valid rate");
        let mut chain = PeriodChain::new(engine);
        chain
            .extend(&sales, &costs, periods.iter().copied())
            .expect("ordered periods");
        chain.into_results()
    });
}

/// Benchmark auto-match proposals (quadratic in ledger size)
#[divan::bench(args = [100, 1_000])]
fn auto_match_propose(bencher: divan::Bencher, size: usize) {
    let (sales, costs) = ledger(size);
    let (store, _) = AssociationStore::from_records(sales, costs);
    let matcher = AutoMatcher::default();

    bencher.bench_local(|| matcher.propose(&store));
}
