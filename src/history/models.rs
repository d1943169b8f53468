//! Drift history data model.
//!
//! `ResourceChange` is the ledger entry and the only authoritative record;
//! lifecycles, predictions, timelines and trends are projections over it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::StateResource;

/// Source tag for changes synthesized to fill gaps between snapshots.
pub const SOURCE_RECONSTRUCTED: &str = "reconstructed";
/// Source tag for changes derived by diffing two snapshots.
pub const SOURCE_SNAPSHOT_DIFF: &str = "snapshot_diff";
/// Source tag for changes submitted directly to the tracker.
pub const SOURCE_TRACKED: &str = "tracked";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Drifted,
    Imported,
    Recreated,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
            ChangeType::Drifted => "drifted",
            ChangeType::Imported => "imported",
            ChangeType::Recreated => "recreated",
        };
        f.write_str(text)
    }
}

/// One append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub resource_id: String,
    pub resource_type: String,
    pub provider: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<String>,
    pub confidence: f64,
}

impl ResourceChange {
    pub fn new(
        resource_id: &str,
        resource_type: &str,
        provider: &str,
        change_type: ChangeType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            resource_type: resource_type.to_string(),
            provider: provider.to_string(),
            change_type,
            timestamp,
            old_state: None,
            new_state: None,
            diff: None,
            actor: None,
            source: SOURCE_TRACKED.to_string(),
            state_file: None,
            confidence: 1.0,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn with_states(mut self, old_state: Option<Value>, new_state: Option<Value>) -> Self {
        self.old_state = old_state;
        self.new_state = new_state;
        self
    }

    pub fn lifecycle_key(&self) -> String {
        lifecycle_key(&self.provider, &self.resource_id)
    }

    pub fn is_drift(&self) -> bool {
        self.change_type == ChangeType::Drifted
    }
}

/// `provider/resource_id`, the identity of a lifecycle.
pub fn lifecycle_key(provider: &str, resource_id: &str) -> String {
    format!("{}/{}", provider, resource_id)
}

/// A captured state document at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub state_file: String,
    pub resources: Vec<StateResource>,
    pub metadata: Value,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

/// Ordered history and derived counters for one `(provider, resource_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLifecycle {
    pub resource_id: String,
    pub resource_type: String,
    pub provider: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub changes: Vec<ResourceChange>,
    pub total_changes: usize,
    pub drift_count: usize,
    pub recreate_count: usize,
    pub stability: f64,
}

impl ResourceLifecycle {
    pub fn new(change: &ResourceChange) -> Self {
        Self {
            resource_id: change.resource_id.clone(),
            resource_type: change.resource_type.clone(),
            provider: change.provider.clone(),
            first_seen: change.timestamp,
            last_seen: change.timestamp,
            changes: Vec::new(),
            total_changes: 0,
            drift_count: 0,
            recreate_count: 0,
            stability: 1.0,
        }
    }

    pub fn key(&self) -> String {
        lifecycle_key(&self.provider, &self.resource_id)
    }

    /// Timestamps of drift events, oldest first.
    pub fn drift_times(&self) -> Vec<DateTime<Utc>> {
        self.changes
            .iter()
            .filter(|c| c.is_drift())
            .map(|c| c.timestamp)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftPrediction {
    pub resource_id: String,
    pub provider: String,
    pub predicted_time: DateTime<Utc>,
    pub confidence: f64,
    /// Number of drift intervals the prediction is based on.
    pub based_on: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn of(change_type: ChangeType) -> Self {
        match change_type {
            ChangeType::Deleted | ChangeType::Recreated => Impact::High,
            ChangeType::Drifted | ChangeType::Modified => Impact::Medium,
            ChangeType::Created | ChangeType::Imported => Impact::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub change_type: ChangeType,
    pub description: String,
    pub impact: Impact,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineReport {
    pub resource_id: String,
    pub provider: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_changes: usize,
    pub stability: f64,
    pub events: Vec<TimelineEvent>,
}

/// Drift event distribution over the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftTrends {
    /// `YYYY-MM-DD` -> drift events that day.
    pub daily_drifts: BTreeMap<String, usize>,
    /// Hour of day (0-23) -> drift events.
    pub hourly_pattern: BTreeMap<u32, usize>,
    /// Hour with the most drift events; the earliest hour wins ties.
    pub peak_hour: Option<u32>,
    pub provider_drifts: BTreeMap<String, usize>,
    pub type_drifts: BTreeMap<String, usize>,
    /// Mean drift events per day that saw any drift.
    pub avg_drift_rate: f64,
    pub total_drifts: usize,
}
