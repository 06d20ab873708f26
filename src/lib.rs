//! Margin-scheme VAT engine library
//! # Overview
//!
//! Under a margin taxation scheme (travel agencies, second-hand dealers) VAT
//! is due on the gross margin of a sale, not on its price. This library
//! allocates costs shared by several sales, computes per-sale margin and tax,
//! and nets negative margins across successive fiscal periods.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Sale, Cost, CalculationResult, Issue, etc.)
//! - [`config`] - Engine tunables with defaults and TOML loading
//! - [`cli`] - CLI arguments parsing and subcommand execution
//! - [`core`] - Business logic components:
//!   - [`core::association_store`] - Bidirectional sale-cost link graph
//!   - [`core::allocation`] - Proportional cost attribution for one sale
//!   - [`core::calculator`] - Per-sale margin and tax, summaries
//!   - [`core::period`] - Period compensation with negative-margin carry-forward
//!   - [`core::auto_match`] - Heuristic sale-cost association proposals
//!   - [`core::integrity`] - Link integrity and plausibility checks
//!   - [`core::diagnostics`] - Reconciliation of the per-sale and period views
//! - [`io`] - CSV readers and writers
//! - [`strategy`] - Pluggable ledger loading strategies (sync, async)
//!
//! # Margin rules
//!
//! - A cost linked to `n` sales contributes `amount / n` to each of them
//! - Tax is charged on `max(gross_margin, 0)`; a negative margin is never taxed
//! - Within a chain of periods, a negative period margin is carried forward
//!   and offsets the next positive margin before tax
//!
//! Record-level problems never abort a pass: they are returned as [`Issue`]s
//! next to a best-effort result set.

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use config::EngineConfig;
pub use core::{
    AssociationStore, AutoMatcher, IntegrityValidator, MarginCalculator, PeriodChain, PeriodEngine,
};
pub use types::{
    CalculationResult, Cost, Issue, IssueKind, MarginError, Period, PeriodResult, Sale, Severity,
    Summary,
};
