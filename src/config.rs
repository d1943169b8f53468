//! Engine configuration.
//!
//! Defaults match the retention and gap policies of the drift history
//! tracker; every value can be overridden from the environment.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of snapshots kept before pruning kicks in.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 1000;

/// Default retention window for snapshots, in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Gap between consecutive snapshots that triggers history reconstruction.
pub const DEFAULT_GAP_THRESHOLD_HOURS: i64 = 24;

/// State file count above which consolidation is recommended.
pub const DEFAULT_CONSOLIDATION_THRESHOLD: usize = 10;

/// Settings for [`crate::aggregation::StateAggregator`].
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub consolidation_threshold: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            consolidation_threshold: DEFAULT_CONSOLIDATION_THRESHOLD,
        }
    }
}

impl AggregatorConfig {
    /// Defaults overridden by `DRIFTMGR_CONSOLIDATION_THRESHOLD`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse("DRIFTMGR_CONSOLIDATION_THRESHOLD") {
            config.consolidation_threshold = v;
        }
        config
    }
}

/// Settings for [`crate::history::StateHistoryTracker`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Directory for one-file-per-change records. `None` keeps the ledger in memory only.
    pub storage_dir: Option<PathBuf>,
    pub retention_days: i64,
    pub max_snapshots: usize,
    pub gap_threshold_hours: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            retention_days: DEFAULT_RETENTION_DAYS,
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            gap_threshold_hours: DEFAULT_GAP_THRESHOLD_HOURS,
        }
    }
}

impl TrackerConfig {
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Defaults overridden by `DRIFTMGR_STORAGE_DIR`, `DRIFTMGR_RETENTION_DAYS`,
    /// `DRIFTMGR_MAX_SNAPSHOTS` and `DRIFTMGR_GAP_THRESHOLD_HOURS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var("DRIFTMGR_STORAGE_DIR") {
            if !dir.trim().is_empty() {
                config.storage_dir = Some(PathBuf::from(dir));
            }
        }
        if let Some(v) = env_parse("DRIFTMGR_RETENTION_DAYS") {
            config.retention_days = v;
        }
        if let Some(v) = env_parse("DRIFTMGR_MAX_SNAPSHOTS") {
            config.max_snapshots = v;
        }
        if let Some(v) = env_parse("DRIFTMGR_GAP_THRESHOLD_HOURS") {
            config.gap_threshold_hours = v;
        }
        config
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("CONFIG_INVALID_VALUE var={} value={:?}", name, raw);
            None
        }
    }
}
