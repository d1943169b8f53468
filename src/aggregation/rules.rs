//! Classification heuristics.
//!
//! Each rule is a pure function over plain data so it can be tested in
//! isolation and swapped without touching the aggregation control flow.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::state::{DiscoveredState, StateDocument, StateResource};

use super::models::{
    CrossStateReference, OrphanedResource, ReferenceType, RemovalReason, ResourceLocation,
};

/// Resource types that may depend on resources of the listed types.
///
/// Best-effort and type-level only: it does not resolve attribute references.
pub const REFERENCE_TABLE: &[(&str, &[&str])] = &[
    (
        "aws_instance",
        &["aws_security_group", "aws_subnet", "aws_key_pair"],
    ),
    ("aws_security_group_rule", &["aws_security_group"]),
    (
        "aws_route",
        &["aws_route_table", "aws_nat_gateway", "aws_internet_gateway"],
    ),
    (
        "azurerm_virtual_machine",
        &["azurerm_network_interface", "azurerm_subnet"],
    ),
    (
        "google_compute_instance",
        &["google_compute_network", "google_compute_subnetwork"],
    ),
];

/// How a group of locations sharing one key should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateClass {
    /// Same key with no clear environment separation.
    Conflict,
    /// Same key managed once per environment.
    MultiEnvironment,
}

/// Distinct non-empty environments across a duplicate group.
pub fn distinct_environments(locations: &[ResourceLocation]) -> BTreeSet<&str> {
    locations
        .iter()
        .map(|l| l.environment.as_str())
        .filter(|e| !e.is_empty())
        .collect()
}

pub fn classify_duplicates(locations: &[ResourceLocation]) -> DuplicateClass {
    if distinct_environments(locations).len() > 1 {
        DuplicateClass::MultiEnvironment
    } else {
        DuplicateClass::Conflict
    }
}

pub fn removal_reason(resource: &StateResource) -> RemovalReason {
    if resource.name.contains("temp") || resource.name.contains("test") {
        RemovalReason::TemporaryResource
    } else if !resource.module.is_empty() {
        RemovalReason::ModuleRefactoring
    } else if resource.is_tainted() {
        RemovalReason::TaintedReplaced
    } else {
        RemovalReason::ManualRemoval
    }
}

/// Resources in `backup` whose key is missing from `current`, keyed by resource key.
///
/// Resources removed from the same module are listed as related to each other.
pub fn find_orphans(
    backup_path: &str,
    backup: &StateDocument,
    current: &StateDocument,
    last_seen_time: DateTime<Utc>,
    removal_detected: DateTime<Utc>,
) -> Vec<(String, OrphanedResource)> {
    let current_keys: HashSet<String> = current.resources.iter().map(|r| r.key()).collect();
    let removed: Vec<&StateResource> = backup
        .resources
        .iter()
        .filter(|r| !current_keys.contains(&r.key()))
        .collect();

    removed
        .iter()
        .map(|resource| {
            let mut related: Vec<String> = removed
                .iter()
                .filter(|other| {
                    !resource.module.is_empty()
                        && other.module == resource.module
                        && other.key() != resource.key()
                })
                .map(|other| other.id.clone())
                .collect();
            related.sort();
            related.dedup();

            let orphan = OrphanedResource {
                resource_id: resource.id.clone(),
                resource_type: resource.resource_type.clone(),
                last_seen_state: backup_path.to_string(),
                last_seen_time,
                removal_detected,
                likely_reason: removal_reason(resource),
                related_resources: related,
            };
            (resource.key(), orphan)
        })
        .collect()
}

pub fn can_reference(from_type: &str, to_type: &str) -> bool {
    REFERENCE_TABLE
        .iter()
        .find(|(source, _)| *source == from_type)
        .map(|(_, targets)| targets.contains(&to_type))
        .unwrap_or(false)
}

/// Type-level dependency edges from `source` to `target`.
pub fn find_references(
    source_path: &str,
    source: &StateDocument,
    target_path: &str,
    target: &StateDocument,
) -> Vec<CrossStateReference> {
    let mut refs = Vec::new();
    for from in &source.resources {
        for to in &target.resources {
            if can_reference(&from.resource_type, &to.resource_type) {
                refs.push(CrossStateReference {
                    source_state: source_path.to_string(),
                    target_state: target_path.to_string(),
                    reference_type: ReferenceType::Dependency,
                    resource_id: to.id.clone(),
                    data_source: None,
                    output_variable: None,
                    remote_state: None,
                });
            }
        }
    }
    refs
}

/// Containing directory of a state path; a bare file name lives in `.`.
///
/// `Path::starts_with("")` holds for every path, so the empty parent of a
/// bare file name must not be compared as-is.
fn state_dir(path: &str) -> &Path {
    match Path::new(path).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Two discovered states are related if they share a real environment or
/// workspace, one directory contains the other, or they use a common module.
pub fn are_related(a: &DiscoveredState, b: &DiscoveredState) -> bool {
    let meaningful_env = |e: &str| !e.is_empty() && e != "unknown" && e != "default";
    if a.environment == b.environment && meaningful_env(&a.environment) {
        return true;
    }

    if a.workspace == b.workspace && !a.workspace.is_empty() && a.workspace != "default" {
        return true;
    }

    let (dir_a, dir_b) = (state_dir(&a.path), state_dir(&b.path));
    if dir_a.starts_with(dir_b) || dir_b.starts_with(dir_a) {
        return true;
    }

    a.modules.iter().any(|m| b.modules.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MODE_TAINTED;
    use chrono::TimeZone;

    fn location(state: &str, env: &str) -> ResourceLocation {
        ResourceLocation {
            state_file: state.to_string(),
            resource_id: "i-1".to_string(),
            resource_type: "aws_instance".to_string(),
            resource_name: "web".to_string(),
            workspace: "default".to_string(),
            environment: env.to_string(),
            module: String::new(),
            provider: "aws".to_string(),
            last_modified: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            is_managed: true,
            is_tainted: false,
            has_drift: false,
        }
    }

    #[test]
    fn test_classify_duplicates() {
        let no_env = vec![location("a.tfstate", ""), location("b.tfstate", "")];
        assert_eq!(classify_duplicates(&no_env), DuplicateClass::Conflict);

        let same_env = vec![location("a.tfstate", "prod"), location("b.tfstate", "prod")];
        assert_eq!(classify_duplicates(&same_env), DuplicateClass::Conflict);

        let split = vec![location("a.tfstate", "prod"), location("b.tfstate", "dev")];
        assert_eq!(classify_duplicates(&split), DuplicateClass::MultiEnvironment);
    }

    #[test]
    fn test_removal_reason_precedence() {
        let temp = StateResource::new("1", "aws_instance", "temp_box").in_module("module.x");
        assert_eq!(removal_reason(&temp), RemovalReason::TemporaryResource);

        let moduled = StateResource::new("2", "aws_instance", "api").in_module("module.x");
        assert_eq!(removal_reason(&moduled), RemovalReason::ModuleRefactoring);

        let tainted = StateResource::new("3", "aws_instance", "api").with_mode(MODE_TAINTED);
        assert_eq!(removal_reason(&tainted), RemovalReason::TaintedReplaced);

        let plain = StateResource::new("4", "aws_instance", "api");
        assert_eq!(removal_reason(&plain), RemovalReason::ManualRemoval);
        assert_eq!(
            RemovalReason::ManualRemoval.to_string(),
            "Manual removal or terraform destroy"
        );
    }

    #[test]
    fn test_find_orphans_links_module_siblings() {
        let backup = StateDocument::from_resources(vec![
            StateResource::new("sg-1", "aws_security_group", "a").in_module("module.old"),
            StateResource::new("sg-2", "aws_security_group", "b").in_module("module.old"),
            StateResource::new("vpc-1", "aws_vpc", "main"),
        ]);
        let current = StateDocument::from_resources(vec![StateResource::new(
            "vpc-1", "aws_vpc", "main",
        )]);
        let t = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        let orphans = find_orphans("x.tfstate.backup", &backup, &current, t, t);
        assert_eq!(orphans.len(), 2);
        let (key, first) = &orphans[0];
        assert_eq!(key, "module.old.aws_security_group.a");
        assert_eq!(first.related_resources, vec!["sg-2".to_string()]);
        assert_eq!(first.likely_reason, RemovalReason::ModuleRefactoring);
    }

    #[test]
    fn test_can_reference_table() {
        assert!(can_reference("aws_instance", "aws_subnet"));
        assert!(can_reference("aws_route", "aws_nat_gateway"));
        assert!(can_reference("google_compute_instance", "google_compute_network"));
        assert!(!can_reference("aws_subnet", "aws_instance"));
        assert!(!can_reference("aws_instance", "aws_vpc"));
    }

    #[test]
    fn test_find_references_directional() {
        let compute = StateDocument::from_resources(vec![StateResource::new(
            "i-1", "aws_instance", "web",
        )]);
        let network = StateDocument::from_resources(vec![
            StateResource::new("subnet-1", "aws_subnet", "a"),
            StateResource::new("sg-1", "aws_security_group", "web"),
            StateResource::new("vpc-1", "aws_vpc", "main"),
        ]);

        let refs = find_references("compute.tfstate", &compute, "network.tfstate", &network);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.reference_type == ReferenceType::Dependency));
        assert!(refs.iter().all(|r| r.source_state == "compute.tfstate"));

        let reverse = find_references("network.tfstate", &network, "compute.tfstate", &compute);
        assert!(reverse.is_empty());
    }

    #[test]
    fn test_are_related() {
        let t = Utc::now();
        let a = DiscoveredState::new("envs/prod/app/terraform.tfstate", t).with_environment("unknown");
        let b = DiscoveredState::new("other/x.tfstate", t).with_environment("unknown");
        assert!(!are_related(&a, &b));

        let nested = DiscoveredState::new("envs/prod/terraform.tfstate", t);
        assert!(are_related(&a, &nested));

        let same_env_a = DiscoveredState::new("x/a.tfstate", t).with_environment("production");
        let same_env_b = DiscoveredState::new("y/b.tfstate", t).with_environment("production");
        assert!(are_related(&same_env_a, &same_env_b));

        let ws_a = DiscoveredState::new("x/a.tfstate", t).with_workspace("blue");
        let ws_b = DiscoveredState::new("y/b.tfstate", t).with_workspace("blue");
        assert!(are_related(&ws_a, &ws_b));

        let root = DiscoveredState::new("prod.tfstate", t).with_environment("unknown");
        let far = DiscoveredState::new("far/away/x.tfstate", t).with_environment("unknown");
        assert!(!are_related(&root, &far));
        assert!(!are_related(&far, &root));
        let sibling = DiscoveredState::new("prod.tfstate.backup", t).with_environment("unknown");
        assert!(are_related(&root, &sibling));

        let mod_a = DiscoveredState::new("x/a.tfstate", t).with_modules(&["module.vpc"]);
        let mod_b = DiscoveredState::new("y/b.tfstate", t).with_modules(&["module.vpc"]);
        assert!(are_related(&mod_a, &mod_b));
    }
}
