//! Loading strategy module
//!
//! This module defines the Strategy pattern for loading a ledger (the sales
//! and costs files) into memory. Different implementations (synchronous,
//! asynchronous concurrent) can be selected at runtime. Whatever the
//! strategy, the resulting ledger is identical and the engine that consumes
//! it is single-threaded.

use crate::cli::StrategyType;
use crate::core::association_store::AssociationStore;
use crate::types::{Cost, Issue, MarginError, Sale};
use std::path::Path;

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncLoadingStrategy, BatchConfig};
pub use sync::SyncLoadingStrategy;

/// Sales and costs loaded from disk, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    pub sales: Vec<Sale>,
    pub costs: Vec<Cost>,
    /// Rows that could not be parsed and were skipped
    pub skipped_rows: usize,
}

impl Ledger {
    /// Build an association store, reporting duplicate ids
    pub fn into_store(self) -> (AssociationStore, Vec<Issue>) {
        AssociationStore::from_records(self.sales, self.costs)
    }
}

/// Loading strategy trait
///
/// Each strategy reads both CSV files and converts every row into a domain
/// record.
pub trait LoadingStrategy: Send + Sync {
    /// Load sales and costs
    ///
    /// # Arguments
    ///
    /// * `sales_path` - Path to the sales CSV file
    /// * `costs_path` - Path to the costs CSV file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Either file cannot be opened (file not found, permission denied)
    /// - The async runtime cannot be created
    ///
    /// Individual malformed rows are logged with `tracing::warn!` and skipped;
    /// they never make this method fail.
    fn load(&self, sales_path: &Path, costs_path: &Path) -> Result<Ledger, MarginError>;
}

/// Create a loading strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of loading strategy to create (Sync or Async)
/// * `config` - Optional configuration for async loading (ignored for sync)
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
) -> Box<dyn LoadingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncLoadingStrategy),
        StrategyType::Async => Box::new(AsyncLoadingStrategy::new(config.unwrap_or_default())),
    }
}
