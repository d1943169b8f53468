//! Aggregation data model.
//!
//! Everything here is produced by a single aggregation pass and is never
//! mutated afterwards. Maps are ordered so a pass over unchanged inputs
//! serializes identically.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One managed resource as seen in one state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLocation {
    pub state_file: String,
    pub resource_id: String,
    pub resource_type: String,
    pub resource_name: String,
    pub workspace: String,
    pub environment: String,
    pub module: String,
    pub provider: String,
    pub last_modified: DateTime<Utc>,
    pub is_managed: bool,
    pub is_tainted: bool,
    pub has_drift: bool,
}

/// Why a resource disappeared between a backup and its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    TemporaryResource,
    ModuleRefactoring,
    TaintedReplaced,
    ManualRemoval,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RemovalReason::TemporaryResource => "Temporary resource removed",
            RemovalReason::ModuleRefactoring => "Module refactoring",
            RemovalReason::TaintedReplaced => "Tainted resource replaced",
            RemovalReason::ManualRemoval => "Manual removal or terraform destroy",
        };
        f.write_str(text)
    }
}

/// A resource present in a backup snapshot but absent from the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanedResource {
    pub resource_id: String,
    pub resource_type: String,
    pub last_seen_state: String,
    pub last_seen_time: DateTime<Utc>,
    pub removal_detected: DateTime<Utc>,
    pub likely_reason: RemovalReason,
    pub related_resources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    DataSource,
    RemoteState,
    Output,
    Module,
    Dependency,
}

/// Inferred dependency edge from one state file to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossStateReference {
    pub source_state: String,
    pub target_state: String,
    pub reference_type: ReferenceType,
    pub resource_id: String,
    pub data_source: Option<String>,
    pub output_variable: Option<String>,
    pub remote_state: Option<String>,
}

/// Module usage across all indexed state files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub source: String,
    pub version: String,
    pub used_in_states: Vec<String>,
    pub resource_count: usize,
    pub last_updated: DateTime<Utc>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationMetrics {
    pub total_states: usize,
    pub total_resources: usize,
    pub unique_resources: usize,
    pub duplicate_resources: usize,
    pub orphaned_resources: usize,
    pub cross_state_references: usize,
    pub partial_states: usize,
    pub conflicting_resources: usize,
    pub failed_states: usize,
    pub states_by_environment: BTreeMap<String, usize>,
    pub states_by_workspace: BTreeMap<String, usize>,
    pub resources_by_provider: BTreeMap<String, usize>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    DuplicateResource,
    OrphanedResource,
    PartialState,
    LoadFailure,
}

/// Ordered most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationIssue {
    pub issue_type: IssueType,
    pub severity: IssueSeverity,
    pub state_file: Option<String>,
    pub resource_id: Option<String>,
    pub description: String,
    pub resolution: String,
}

/// Complete output of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// Log correlation id of the pass; not part of the serialized result.
    #[serde(skip)]
    pub pass_id: String,
    pub all_resources: BTreeMap<String, ResourceLocation>,
    pub duplicate_resources: BTreeMap<String, Vec<ResourceLocation>>,
    pub orphaned_resources: BTreeMap<String, OrphanedResource>,
    pub cross_state_references: BTreeMap<String, Vec<CrossStateReference>>,
    pub state_relationships: BTreeMap<String, Vec<String>>,
    pub modules: BTreeMap<String, ModuleInfo>,
    pub metrics: AggregationMetrics,
    pub issues: Vec<AggregationIssue>,
    pub recommendations: Vec<String>,
}

impl AggregationResult {
    /// Keys indexed exactly once across all state files.
    pub fn unique_keys(&self) -> impl Iterator<Item = &str> {
        self.all_resources
            .keys()
            .filter(move |k| !self.duplicate_resources.contains_key(*k))
            .map(|k| k.as_str())
    }

    pub fn issues_of(&self, issue_type: IssueType) -> impl Iterator<Item = &AggregationIssue> {
        self.issues.iter().filter(move |i| i.issue_type == issue_type)
    }
}

/// A resource observed in a live cloud account, for coverage comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudResource {
    pub id: String,
    pub resource_type: String,
    pub name: String,
}

/// Coverage of live cloud resources by the aggregated state index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub in_state_only: Vec<String>,
    pub in_cloud_only: Vec<String>,
    pub in_both: Vec<String>,
    pub state_resources: usize,
    pub cloud_resources: usize,
    pub coverage_percent: f64,
}
