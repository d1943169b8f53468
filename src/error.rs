//! Error types.
//!
//! Each layer gets its own enum so callers can match on the condition that
//! matters to them (a skipped file vs. a failed pass vs. a missing lifecycle).

use std::path::PathBuf;

use thiserror::Error;

/// Failure to read or parse a single state file.
///
/// The aggregator treats these as per-file warnings, never as a pass failure.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to enumerate state locations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery root does not exist: {0}")]
    MissingRoot(PathBuf),
}

/// Fatal aggregation pass failure.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("failed to enumerate discovered states: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Drift history lookups and persistence.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("lifecycle not found for resource {key}")]
    NotFound { key: String },

    #[error("insufficient drift history for prediction on {key} ({drift_events} drift events, need at least 2)")]
    InsufficientHistory { key: String, drift_events: usize },

    #[error("rejected change record: {0}")]
    InvalidChange(String),

    #[error("history storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize change record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HistoryError {
    /// True for lookups on resources the tracker has never seen.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HistoryError::NotFound { .. })
    }

    /// True when the resource exists but has too few drift events to predict.
    pub fn is_insufficient_history(&self) -> bool {
        matches!(self, HistoryError::InsufficientHistory { .. })
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;
