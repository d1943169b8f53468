//! DriftMgr Core - multi-state aggregation and drift history engine
//!
//! This crate merges many infrastructure state files into one resource view
//! and keeps a time-ordered history of how each resource changed. The
//! implementation prioritizes:
//!
//! 1. **Determinism** - The same inputs always produce the same result
//! 2. **Logging** - Every decision point logged with pass or tracker context
//! 3. **Resilience** - A bad state file is reported, never fatal
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `state` - State file model, loading and discovery
//! - `aggregation` - Cross-file index, duplicates, orphans, references, metrics
//! - `history` - Change ledger, lifecycles, stability, predictions, snapshots
//! - `config` - Tunables with environment overrides
//! - `clock` - Time source for age and retention calculations
//! - `logging` - Structured logging with pass/tracker context

pub mod aggregation;
pub mod clock;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod state;

pub use aggregation::{AggregationResult, StateAggregator};
pub use config::{AggregatorConfig, TrackerConfig};
pub use error::{AggregationError, DiscoveryError, HistoryError, StateError};
pub use history::StateHistoryTracker;

/// Initialize the crate-wide logger.
///
/// Safe to call more than once; only the first call installs the logger.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .try_init();
}
