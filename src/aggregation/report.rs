//! Issue and recommendation generation.

use std::collections::BTreeMap;
use std::path::Path;

use crate::state::DiscoveredState;

use super::models::{
    AggregationIssue, AggregationMetrics, IssueSeverity, IssueType, ModuleInfo, OrphanedResource,
    ResourceLocation,
};
use super::rules::{classify_duplicates, DuplicateClass};

/// Inputs for [`generate_issues`].
pub struct IssueInputs<'a> {
    pub duplicates: &'a BTreeMap<String, Vec<ResourceLocation>>,
    pub orphans: &'a BTreeMap<String, OrphanedResource>,
    pub discovered: &'a BTreeMap<String, DiscoveredState>,
    pub load_failures: &'a BTreeMap<String, String>,
}

/// Issues sorted by severity, then type, then location.
pub fn generate_issues(inputs: &IssueInputs<'_>) -> Vec<AggregationIssue> {
    let mut issues = Vec::new();

    for (key, locations) in inputs.duplicates {
        if classify_duplicates(locations) == DuplicateClass::Conflict {
            issues.push(AggregationIssue {
                issue_type: IssueType::DuplicateResource,
                severity: IssueSeverity::Critical,
                state_file: None,
                resource_id: Some(key.clone()),
                description: format!(
                    "Resource {} managed in {} state files",
                    key,
                    locations.len()
                ),
                resolution: "Consolidate resource management to a single state file".to_string(),
            });
        }
    }

    for (key, orphan) in inputs.orphans {
        issues.push(AggregationIssue {
            issue_type: IssueType::OrphanedResource,
            severity: IssueSeverity::High,
            state_file: Some(orphan.last_seen_state.clone()),
            resource_id: Some(key.clone()),
            description: format!(
                "Resource {} no longer in state (last seen: {})",
                orphan.resource_type,
                orphan.last_seen_time.format("%Y-%m-%d")
            ),
            resolution: "Verify if resource should be imported or if removal was intentional"
                .to_string(),
        });
    }

    for (path, state) in inputs.discovered {
        if state.is_partial {
            issues.push(AggregationIssue {
                issue_type: IssueType::PartialState,
                severity: IssueSeverity::Medium,
                state_file: Some(path.clone()),
                resource_id: None,
                description: "State file appears to be incomplete or partially imported"
                    .to_string(),
                resolution: "Review and complete resource imports".to_string(),
            });
        }
    }

    for (path, error) in inputs.load_failures {
        issues.push(AggregationIssue {
            issue_type: IssueType::LoadFailure,
            severity: IssueSeverity::Low,
            state_file: Some(path.clone()),
            resource_id: None,
            description: format!("State file could not be loaded: {}", error),
            resolution: "Check the file is readable and contains valid state JSON".to_string(),
        });
    }

    issues.sort_by(|a, b| {
        (a.severity, a.issue_type, &a.state_file, &a.resource_id).cmp(&(
            b.severity,
            b.issue_type,
            &b.state_file,
            &b.resource_id,
        ))
    });
    issues
}

/// Textual heuristics over a finished pass.
pub fn generate_recommendations(
    metrics: &AggregationMetrics,
    environment_states: &BTreeMap<String, Vec<String>>,
    modules: &BTreeMap<String, ModuleInfo>,
    consolidation_threshold: usize,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if metrics.total_states > consolidation_threshold {
        recommendations.push(format!(
            "Consider consolidating {} state files using workspaces or modules",
            metrics.total_states
        ));
    }

    if metrics.duplicate_resources > 0 {
        recommendations.push(format!(
            "Resolve {} duplicate resource definitions across state files",
            metrics.duplicate_resources
        ));
    }

    if metrics.orphaned_resources > 0 {
        recommendations.push(format!(
            "Review {} orphaned resources for re-import or cleanup",
            metrics.orphaned_resources
        ));
    }

    if metrics.states_by_environment.len() > 1 && environments_share_directory(environment_states)
    {
        recommendations.push("Separate environment states into different directories".to_string());
    }

    if metrics.states_by_workspace.len() == 1
        && metrics.states_by_workspace.get("default").copied().unwrap_or(0) > 0
    {
        recommendations
            .push("Consider using Terraform workspaces for environment separation".to_string());
    }

    let reused = modules
        .values()
        .filter(|m| m.used_in_states.len() > 1)
        .count();
    if reused > 0 {
        recommendations.push(format!(
            "Good: {} modules are reused across states",
            reused
        ));
    }

    recommendations
}

/// True when two state files of one environment live in the same directory.
fn environments_share_directory(environment_states: &BTreeMap<String, Vec<String>>) -> bool {
    environment_states.values().any(|states| {
        states.iter().enumerate().any(|(i, a)| {
            states
                .iter()
                .skip(i + 1)
                .any(|b| Path::new(a).parent() == Path::new(b).parent())
        })
    })
}
