//! Drift history module.
//!
//! Keeps an append-only ledger of resource changes and derives from it:
//! - Per-resource lifecycles with a stability score
//! - Next-drift predictions
//! - Timeline reports and drift trends
//!
//! Historical snapshots can be pulled from backup directories, CI artifacts
//! and git, and gaps between them are back-filled with reconstructed changes.

pub mod models;
pub mod persistence;
pub mod snapshots;
pub mod sources;
pub mod stability;
pub mod tracker;

pub use models::*;
pub use sources::{
    ArtifactDirectorySource, BackupDirectorySource, GitHistorySource, RawSnapshot, SnapshotSource,
};
pub use tracker::*;
