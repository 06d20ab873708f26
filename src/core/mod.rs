//! Core business logic module
//!
//! This module contains the margin-scheme engine components, leaves first:
//! - `association_store` - Bidirectional sale/cost association graph
//! - `integrity` - Read-only link, result and dataset validation
//! - `allocation` - Proportional cost attribution for one sale
//! - `calculator` - Per-sale margin and tax, summaries
//! - `period` - Multi-period compensation with carry-forward
//! - `auto_match` - Heuristic association proposals
//! - `diagnostics` - Reconciliation of the allocation and aggregate views

pub mod allocation;
pub mod association_store;
pub mod auto_match;
pub mod calculator;
pub mod diagnostics;
pub mod integrity;
pub mod period;

pub use allocation::{allocate, Allocation};
pub use association_store::{AssociationOutcome, AssociationStore};
pub use auto_match::{AutoMatchOutcome, AutoMatcher, MatchProposal, MatchReason, MatchScore};
pub use calculator::{summarize, CalculationRun, MarginCalculator};
pub use diagnostics::{reconcile, ReconciliationReport};
pub use integrity::IntegrityValidator;
pub use period::{verify_chain, MarginSchemeReturn, PeriodChain, PeriodEngine};
