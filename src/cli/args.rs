use crate::config::EngineConfig;
use crate::strategy::BatchConfig;
use crate::types::{MarginError, Period, VatRegion};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Compute margin-scheme VAT from sales, costs and their associations
#[derive(Parser, Debug)]
#[command(name = "margin-vat")]
#[command(about = "Compute margin-scheme VAT from sales, costs and their associations", long_about = None)]
pub struct CliArgs {
    /// Enable verbose logging. Repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Optional TOML file with engine settings
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Loading strategy to use for reading the ledger files
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "async",
        global = true,
        help = "Loading strategy: 'sync' for synchronous or 'async' for concurrent loading"
    )]
    pub strategy: StrategyType,

    /// Number of records per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        global = true,
        help = "Number of records per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Number of runtime worker threads (async mode only)
    #[arg(
        long = "workers",
        value_name = "COUNT",
        global = true,
        help = "Number of async worker threads (default: CPU cores)"
    )]
    pub worker_threads: Option<usize>,

    /// Percentage VAT rate, overriding the region and the config file
    #[arg(long, value_name = "PERCENT", global = true)]
    pub rate: Option<Decimal>,

    /// Regional rate preset
    #[arg(long, value_enum, global = true)]
    pub region: Option<VatRegion>,

    /// Write the issues found during the run to this CSV file
    #[arg(long, value_name = "FILE", global = true)]
    pub issues: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available loading strategies for CSV input
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Per-sale margin and tax from explicit cost associations
    Calculate(CalculateArgs),

    /// Period returns with negative-margin carry-forward
    Periods(PeriodsArgs),

    /// Propose (and by default create) sale-cost associations
    AutoMatch(AutoMatchArgs),

    /// Check link integrity and margin plausibility
    Validate(LedgerArgs),

    /// Reconcile the per-sale view with the period-aggregate view
    Diagnostics(LedgerArgs),
}

/// The two input files every subcommand reads
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Sales CSV (id,number,date,counterparty,amount,linked_costs)
    #[arg(value_name = "SALES")]
    pub sales: PathBuf,

    /// Costs CSV (id,document_number,date,supplier,description,amount,linked_sales)
    #[arg(value_name = "COSTS")]
    pub costs: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CalculateArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Also write the per-cost allocation breakdown to this file
    #[arg(long, value_name = "FILE")]
    pub breakdown: Option<PathBuf>,

    /// Also write the per-category summary to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Run the auto-matcher before calculating
    #[arg(long)]
    pub auto_match: bool,

    /// Do not restore missing back-links before calculating
    #[arg(long)]
    pub no_heal: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PeriodsArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Compensate the four quarters of this year
    #[arg(long, conflicts_with = "periods")]
    pub year: Option<i32>,

    /// Explicit period, repeatable, in chronological order
    #[arg(long = "period", value_name = "START..END")]
    pub periods: Vec<Period>,

    /// Negative margin carried in from before the first period
    #[arg(long, value_name = "AMOUNT", default_value = "0")]
    pub opening_carry_forward: Decimal,

    /// Print the return layout instead of the compensation detail
    #[arg(long)]
    pub returns: bool,

    /// Also write the per-sale lines of every period to this file
    #[arg(long, value_name = "FILE")]
    pub details: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AutoMatchArgs {
    #[command(flatten)]
    pub ledger: LedgerArgs,

    /// Only print proposals, do not create links
    #[arg(long)]
    pub dry_run: bool,

    /// Minimum confidence (0-100) for a proposal
    #[arg(long, value_name = "SCORE")]
    pub threshold: Option<f64>,

    /// Maximum proposals per cost
    #[arg(long, value_name = "COUNT")]
    pub max_per_cost: Option<usize>,
}

impl Command {
    /// Input files of the subcommand
    pub fn ledger(&self) -> &LedgerArgs {
        match self {
            Command::Calculate(args) => &args.ledger,
            Command::Periods(args) => &args.ledger,
            Command::AutoMatch(args) => &args.ledger,
            Command::Validate(ledger) | Command::Diagnostics(ledger) => ledger,
        }
    }
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Zero values are replaced by defaults (with a warning) by
    /// [`BatchConfig::new`].
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.worker_threads.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.worker_threads.unwrap_or(default.worker_threads),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Default log filter for the verbosity level, used when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Engine configuration: defaults, then the config file, then CLI flags
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is missing or malformed.
    pub fn engine_config(&self) -> Result<EngineConfig, MarginError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };

        if let Some(region) = self.region {
            config.region = region;
            // An explicit region on the command line beats a file rate
            config.vat_rate = None;
        }
        if let Some(rate) = self.rate {
            config.vat_rate = Some(rate);
        }
        if let Command::AutoMatch(args) = &self.command {
            if let Some(threshold) = args.threshold {
                config.matching.threshold = threshold;
            }
            if let Some(max_per_cost) = args.max_per_cost {
                config.matching.max_per_cost = max_per_cost;
            }
        }

        Ok(config.validated())
    }
}
