//! Resource aggregation module.
//!
//! Builds a cross-file resource index from many state files and analyzes it:
//! - Duplicate ownership (conflict vs. intentional multi-environment)
//! - Orphaned resources (backup vs. current state)
//! - Cross-state references and state relationships
//! - Module reuse
//! - Metrics, issues and recommendations

pub mod aggregator;
pub mod models;
pub mod report;
pub mod rules;

pub use aggregator::*;
pub use models::*;
