//! Drift history tracker.
//!
//! Owns the change ledger, the per-resource lifecycles derived from it and
//! the snapshot store. All mutations take the exclusive side of one
//! `RwLock`; every query takes the shared side.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::{HistoryError, HistoryResult};
use crate::logging::LogContext;

use super::models::{
    lifecycle_key, ChangeType, DriftPrediction, DriftTrends, Impact, ResourceChange,
    ResourceLifecycle, StateSnapshot, TimelineEvent, TimelineReport, SOURCE_RECONSTRUCTED,
};
use super::persistence::ChangeStore;
use super::snapshots::{create_snapshot, detect_changes, SnapshotStore};
use super::sources::SnapshotSource;
use super::stability;

/// Confidence attached to changes interpolated across a snapshot gap.
pub const RECONSTRUCTED_CONFIDENCE: f64 = 0.6;

struct Ledger {
    changes: Vec<ResourceChange>,
    lifecycles: HashMap<String, ResourceLifecycle>,
    snapshots: SnapshotStore,
    /// Snapshot id pairs already interpolated.
    reconstructed_gaps: HashSet<(String, String)>,
    /// Change records already in the ledger, written or replayed.
    persisted: HashSet<PathBuf>,
}

impl Ledger {
    fn apply(&mut self, change: ResourceChange, now: DateTime<Utc>) {
        let lifecycle = self
            .lifecycles
            .entry(change.lifecycle_key())
            .or_insert_with(|| ResourceLifecycle::new(&change));

        let at = lifecycle
            .changes
            .partition_point(|c| c.timestamp <= change.timestamp);
        lifecycle.changes.insert(at, change.clone());

        lifecycle.first_seen = lifecycle.first_seen.min(change.timestamp);
        lifecycle.last_seen = lifecycle.last_seen.max(change.timestamp);
        lifecycle.total_changes += 1;
        match change.change_type {
            ChangeType::Drifted => lifecycle.drift_count += 1,
            ChangeType::Recreated => lifecycle.recreate_count += 1,
            _ => {}
        }
        lifecycle.stability = stability::lifecycle_stability(lifecycle, now);

        self.changes.push(change);
    }

    fn lifecycle(&self, resource_id: &str, provider: &str) -> HistoryResult<&ResourceLifecycle> {
        let key = lifecycle_key(provider, resource_id);
        self.lifecycles
            .get(&key)
            .ok_or(HistoryError::NotFound { key })
    }
}

pub struct StateHistoryTracker {
    id: String,
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    store: Option<ChangeStore>,
    ledger: RwLock<Ledger>,
}

impl StateHistoryTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let id = format!("hist-{}", &Uuid::new_v4().to_string()[..8]);
        let store = config.storage_dir.clone().map(ChangeStore::new);
        let ledger = Ledger {
            changes: Vec::new(),
            lifecycles: HashMap::new(),
            snapshots: SnapshotStore::new(config.max_snapshots, config.retention_days),
            reconstructed_gaps: HashSet::new(),
            persisted: HashSet::new(),
        };

        log::info!(
            "{} TRACKER_CREATED storage={:?} max_snapshots={} retention_days={}",
            LogContext::tracker(&id),
            config.storage_dir,
            config.max_snapshots,
            config.retention_days
        );

        Self {
            id,
            config,
            clock,
            store,
            ledger: RwLock::new(ledger),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn ctx(&self) -> LogContext {
        LogContext::tracker(&self.id)
    }

    /// Append a change to the ledger and update its lifecycle.
    ///
    /// An unset (epoch) timestamp is replaced with the clock's `now`. The
    /// change is persisted when a storage directory is configured; a
    /// persistence failure is logged and the change stays in memory.
    pub fn track_change(&self, mut change: ResourceChange) -> HistoryResult<()> {
        if change.resource_id.trim().is_empty() {
            return Err(HistoryError::InvalidChange(
                "resource_id is empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&change.confidence) {
            return Err(HistoryError::InvalidChange(format!(
                "confidence {} outside [0, 1]",
                change.confidence
            )));
        }

        let now = self.clock.now();
        if change.timestamp.timestamp_millis() == 0 {
            change.timestamp = now;
        }

        let ctx = self.ctx().with_resource(&change.lifecycle_key());
        let mut ledger = self.ledger.write();

        if let Some(store) = &self.store {
            match store.persist(&change) {
                Ok(path) => {
                    ledger.persisted.insert(path);
                }
                Err(e) => {
                    crate::log_warn!(ctx, "CHANGE_PERSIST_FAILED", error = e.to_string());
                }
            }
        }

        crate::log_debug!(
            ctx,
            "CHANGE_TRACKED",
            change_type = change.change_type.to_string(),
            source = change.source
        );
        ledger.apply(change, now);
        Ok(())
    }

    /// Insert a snapshot, pruning by retention when over capacity.
    /// Returns false when a snapshot with the same id already exists.
    pub fn add_snapshot(&self, snapshot: StateSnapshot) -> bool {
        let now = self.clock.now();
        self.ledger.write().snapshots.insert(snapshot, now)
    }

    pub fn snapshot_count(&self) -> usize {
        self.ledger.read().snapshots.len()
    }

    /// Snapshots ordered by time.
    pub fn snapshots(&self) -> Vec<StateSnapshot> {
        self.ledger
            .read()
            .snapshots
            .sorted()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Collect snapshots from every source, then fill history gaps.
    ///
    /// A failing source is logged and skipped. Returns the number of new
    /// snapshots added.
    pub fn load_historical_states(&self, sources: &[Box<dyn SnapshotSource>]) -> usize {
        let ctx = self.ctx();
        let mut added = 0;

        for source in sources {
            let raw = match source.collect() {
                Ok(raw) => raw,
                Err(e) => {
                    log::warn!(
                        "{} HISTORY_SOURCE_FAILED source={} error={:#}",
                        ctx,
                        source.name(),
                        e
                    );
                    continue;
                }
            };

            let mut from_source = 0;
            for item in raw {
                let snapshot = create_snapshot(&item.data, item.timestamp, &item.source);
                if self.add_snapshot(snapshot) {
                    from_source += 1;
                }
            }
            log::info!(
                "{} HISTORY_SOURCE_LOADED source={} snapshots={}",
                ctx,
                source.name(),
                from_source
            );
            added += from_source;
        }

        self.reconstruct_missing_history();
        added
    }

    /// Interpolate a `modified` change at the midpoint of every snapshot gap
    /// longer than the configured threshold, once per gap.
    ///
    /// Returns the number of synthesized changes.
    pub fn reconstruct_missing_history(&self) -> usize {
        let threshold = Duration::hours(self.config.gap_threshold_hours);
        let now = self.clock.now();
        let mut ledger = self.ledger.write();

        let mut synthesized = Vec::new();
        let mut gaps = Vec::new();
        {
            let sorted = ledger.snapshots.sorted();
            for pair in sorted.windows(2) {
                let (prev, next) = (pair[0], pair[1]);
                let gap_id = (prev.id.clone(), next.id.clone());
                if next.timestamp - prev.timestamp <= threshold
                    || ledger.reconstructed_gaps.contains(&gap_id)
                {
                    continue;
                }

                let midpoint = prev.timestamp + (next.timestamp - prev.timestamp) / 2;
                for change in detect_changes(prev, next) {
                    if change.change_type != ChangeType::Modified {
                        continue;
                    }
                    synthesized.push(
                        ResourceChange::new(
                            &change.resource_id,
                            &change.resource_type,
                            &change.provider,
                            ChangeType::Modified,
                            midpoint,
                        )
                        .with_source(SOURCE_RECONSTRUCTED)
                        .with_confidence(RECONSTRUCTED_CONFIDENCE),
                    );
                }
                gaps.push(gap_id);
            }
        }

        let count = synthesized.len();
        ledger.reconstructed_gaps.extend(gaps);
        for change in synthesized {
            ledger.apply(change, now);
        }

        if count > 0 {
            crate::log_info!(self.ctx(), "HISTORY_RECONSTRUCTED", changes = count);
        }
        count
    }

    /// Replay persisted change records into the ledger.
    ///
    /// Records are applied in timestamp order, rebuilding lifecycles and
    /// stability. Records this tracker already holds (tracked here or
    /// replayed earlier) are skipped, so repeated calls only pick up new
    /// files. Returns the number of records applied.
    pub fn load_persisted_changes(&self) -> HistoryResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let records = store.load_records()?;

        let now = self.clock.now();
        let mut ledger = self.ledger.write();
        let mut count = 0;
        for (path, change) in records {
            if ledger.persisted.insert(path) {
                ledger.apply(change, now);
                count += 1;
            }
        }

        log::info!(
            "{} PERSISTED_CHANGES_LOADED dir={} changes={}",
            self.ctx(),
            store.dir().display(),
            count
        );
        Ok(count)
    }

    pub fn resource_lifecycle(
        &self,
        resource_id: &str,
        provider: &str,
    ) -> HistoryResult<ResourceLifecycle> {
        self.ledger
            .read()
            .lifecycle(resource_id, provider)
            .cloned()
    }

    /// Changes with `start <= timestamp < end`, oldest first.
    pub fn change_history(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<ResourceChange> {
        let ledger = self.ledger.read();
        let mut changes: Vec<ResourceChange> = ledger
            .changes
            .iter()
            .filter(|c| c.timestamp >= start && c.timestamp < end)
            .cloned()
            .collect();
        changes.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        changes
    }

    pub fn change_count(&self) -> usize {
        self.ledger.read().changes.len()
    }

    pub fn drift_trends(&self) -> DriftTrends {
        stability::drift_trends(&self.ledger.read().changes)
    }

    /// Lifecycles with stability below `threshold`, least stable first.
    pub fn unstable_resources(&self, threshold: f64) -> Vec<ResourceLifecycle> {
        let ledger = self.ledger.read();
        let mut unstable: Vec<ResourceLifecycle> = ledger
            .lifecycles
            .values()
            .filter(|l| l.stability < threshold)
            .cloned()
            .collect();
        unstable.sort_by(|a, b| {
            a.stability
                .partial_cmp(&b.stability)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key().cmp(&b.key()))
        });
        unstable
    }

    pub fn predict_next_drift(
        &self,
        resource_id: &str,
        provider: &str,
    ) -> HistoryResult<DriftPrediction> {
        let ledger = self.ledger.read();
        stability::predict_next_drift(ledger.lifecycle(resource_id, provider)?)
    }

    pub fn generate_timeline_report(
        &self,
        resource_id: &str,
        provider: &str,
    ) -> HistoryResult<TimelineReport> {
        let ledger = self.ledger.read();
        let lifecycle = ledger.lifecycle(resource_id, provider)?;

        let events = lifecycle
            .changes
            .iter()
            .map(|change| TimelineEvent {
                timestamp: change.timestamp,
                change_type: change.change_type,
                description: describe_change(change),
                impact: Impact::of(change.change_type),
                source: change.source.clone(),
            })
            .collect();

        Ok(TimelineReport {
            resource_id: lifecycle.resource_id.clone(),
            provider: lifecycle.provider.clone(),
            first_seen: lifecycle.first_seen,
            last_seen: lifecycle.last_seen,
            total_changes: lifecycle.total_changes,
            stability: lifecycle.stability,
            events,
        })
    }
}

fn describe_change(change: &ResourceChange) -> String {
    let id = &change.resource_id;
    match change.change_type {
        ChangeType::Created => format!("Resource {} created", id),
        ChangeType::Modified => format!("Resource {} modified", id),
        ChangeType::Deleted => format!("Resource {} deleted", id),
        ChangeType::Drifted => format!("Resource {} drifted from desired state", id),
        ChangeType::Imported => format!("Resource {} imported into Terraform", id),
        ChangeType::Recreated => format!("Resource {} recreated", id),
    }
}
