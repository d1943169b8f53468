//! Snapshot capture, retention and diffing.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::state::{JsonStateLoader, StateResource};

use super::models::{ChangeType, ResourceChange, StateSnapshot, SOURCE_SNAPSHOT_DIFF};

/// Confidence attached to changes derived from a snapshot diff.
pub const SNAPSHOT_DIFF_CONFIDENCE: f64 = 0.9;

/// SHA-256 of the raw state bytes, hex encoded.
pub fn hash_state(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Build a snapshot from raw state bytes.
///
/// Bytes that do not parse as a state document still produce a snapshot
/// (with no resources) so the hash and timestamp are kept.
pub fn create_snapshot(data: &[u8], timestamp: DateTime<Utc>, source: &str) -> StateSnapshot {
    let (resources, metadata) = match JsonStateLoader::parse(Path::new(source), data) {
        Ok(doc) => {
            let metadata = json!({
                "version": doc.version,
                "serial": doc.serial,
                "lineage": doc.lineage,
                "terraform_version": doc.terraform_version,
            });
            (doc.resources, metadata)
        }
        Err(e) => {
            log::debug!("SNAPSHOT_UNPARSED source={} error={}", source, e);
            (Vec::new(), serde_json::Value::Null)
        }
    };

    StateSnapshot {
        id: format!("{}-{}", source, timestamp.timestamp()),
        timestamp,
        state_file: source.to_string(),
        resources,
        metadata,
        hash: hash_state(data),
        previous: None,
    }
}

/// Identity used when diffing snapshots: the provider id when present.
fn snapshot_identity(resource: &StateResource) -> String {
    if resource.id.is_empty() {
        resource.key()
    } else {
        resource.id.clone()
    }
}

fn diff_change(
    resource: &StateResource,
    change_type: ChangeType,
    timestamp: DateTime<Utc>,
) -> ResourceChange {
    ResourceChange::new(
        &snapshot_identity(resource),
        &resource.resource_type,
        &resource.provider,
        change_type,
        timestamp,
    )
    .with_source(SOURCE_SNAPSHOT_DIFF)
    .with_confidence(SNAPSHOT_DIFF_CONFIDENCE)
}

/// Created, deleted and modified resources between two snapshots, stamped
/// with the later snapshot's time.
pub fn detect_changes(prev: &StateSnapshot, next: &StateSnapshot) -> Vec<ResourceChange> {
    let index = |snapshot: &StateSnapshot| -> BTreeMap<String, StateResource> {
        snapshot
            .resources
            .iter()
            .map(|r| (snapshot_identity(r), r.clone()))
            .collect()
    };
    let before = index(prev);
    let after = index(next);

    let mut changes = Vec::new();

    for (id, resource) in &after {
        if !before.contains_key(id) {
            changes.push(
                diff_change(resource, ChangeType::Created, next.timestamp)
                    .with_states(None, Some(resource.attributes.clone())),
            );
        }
    }

    for (id, resource) in &before {
        if !after.contains_key(id) {
            changes.push(
                diff_change(resource, ChangeType::Deleted, next.timestamp)
                    .with_states(Some(resource.attributes.clone()), None),
            );
        }
    }

    for (id, new) in &after {
        if let Some(old) = before.get(id) {
            if old.attributes != new.attributes {
                changes.push(
                    diff_change(new, ChangeType::Modified, next.timestamp).with_states(
                        Some(old.attributes.clone()),
                        Some(new.attributes.clone()),
                    ),
                );
            }
        }
    }

    changes
}

/// Snapshots keyed by id with count-triggered, age-based pruning.
#[derive(Debug)]
pub struct SnapshotStore {
    snapshots: HashMap<String, StateSnapshot>,
    max_snapshots: usize,
    retention_days: i64,
}

impl SnapshotStore {
    pub fn new(max_snapshots: usize, retention_days: i64) -> Self {
        Self {
            snapshots: HashMap::new(),
            max_snapshots,
            retention_days,
        }
    }

    /// Insert a snapshot unless one with the same id exists.
    ///
    /// Links `previous` to the latest earlier snapshot of the same state
    /// file. Returns whether the snapshot was added.
    pub fn insert(&mut self, mut snapshot: StateSnapshot, now: DateTime<Utc>) -> bool {
        if self.snapshots.contains_key(&snapshot.id) {
            return false;
        }

        snapshot.previous = self
            .snapshots
            .values()
            .filter(|s| s.state_file == snapshot.state_file && s.timestamp < snapshot.timestamp)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)))
            .map(|s| s.id.clone());

        self.snapshots.insert(snapshot.id.clone(), snapshot);

        if self.snapshots.len() > self.max_snapshots {
            let pruned = self.prune(now);
            log::info!(
                "SNAPSHOTS_PRUNED removed={} remaining={}",
                pruned,
                self.snapshots.len()
            );
        }
        true
    }

    /// Drop every snapshot older than the retention window.
    fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(self.retention_days);
        let before = self.snapshots.len();
        self.snapshots.retain(|_, s| s.timestamp >= cutoff);
        before - self.snapshots.len()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StateSnapshot> {
        self.snapshots.get(id)
    }

    /// Snapshots ordered by timestamp, then id.
    pub fn sorted(&self) -> Vec<&StateSnapshot> {
        let mut sorted: Vec<&StateSnapshot> = self.snapshots.values().collect();
        sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        sorted
    }
}
