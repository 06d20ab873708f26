//! Margin-scheme VAT engine CLI
//!
//! Command-line interface for computing margin-scheme VAT from a sales file
//! and a costs file.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- calculate sales.csv costs.csv > results.csv
//! cargo run -- calculate --summary summary.csv --breakdown breakdown.csv sales.csv costs.csv
//! cargo run -- periods --year 2025 sales.csv costs.csv > periods.csv
//! cargo run -- periods --period 2025-01-01..2025-06-30 --returns sales.csv costs.csv
//! cargo run -- auto-match --dry-run sales.csv costs.csv > matches.csv
//! cargo run -- --issues issues.csv validate sales.csv costs.csv
//! cargo run -- --strategy sync --rate 22 diagnostics sales.csv costs.csv
//! ```
//!
//! The primary output of each subcommand is written to stdout as CSV. Logs
//! go to stderr; `RUST_LOG` overrides the `-v` verbosity.
//!
//! # Exit Codes
//!
//! - 0: Success (issues found in the records do not change the exit code)
//! - 1: Error (file not found, invalid rate or period, bad configuration, etc.)

use margin_vat_engine::cli;
use std::io::Write;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse command-line arguments using clap
    let args = cli::parse_args();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    let result = cli::run(&args, &mut output).and_then(|()| output.flush().map_err(Into::into));

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
