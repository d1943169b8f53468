//! State document and discovery models.
//!
//! These are the shapes handed to the engine by the loading and discovery
//! collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mode of a resource that is a data source rather than a managed resource.
pub const MODE_DATA: &str = "data";
/// Mode reported for a resource whose instance is tainted.
pub const MODE_TAINTED: &str = "tainted";
pub const MODE_MANAGED: &str = "managed";

/// Kind of state file, inferred from its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateType {
    Local,
    Remote,
    Workspace,
    Backup,
    Terragrunt,
    Module,
    Fragment,
}

/// A state location enumerated by discovery, with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredState {
    pub path: String,
    pub state_type: StateType,
    pub workspace: String,
    pub environment: String,
    pub last_modified: DateTime<Utc>,
    pub is_partial: bool,
    pub modules: Vec<String>,
}

impl DiscoveredState {
    pub fn new(path: &str, last_modified: DateTime<Utc>) -> Self {
        let state_type = if is_backup_path(path) {
            StateType::Backup
        } else {
            StateType::Local
        };
        Self {
            path: path.to_string(),
            state_type,
            workspace: "default".to_string(),
            environment: String::new(),
            last_modified,
            is_partial: false,
            modules: Vec::new(),
        }
    }

    pub fn with_environment(mut self, environment: &str) -> Self {
        self.environment = environment.to_string();
        self
    }

    pub fn with_workspace(mut self, workspace: &str) -> Self {
        self.workspace = workspace.to_string();
        self
    }

    pub fn with_modules(mut self, modules: &[&str]) -> Self {
        self.modules = modules.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn partial(mut self) -> Self {
        self.is_partial = true;
        self
    }

    pub fn is_backup(&self) -> bool {
        self.state_type == StateType::Backup || is_backup_path(&self.path)
    }
}

/// One resource instance as recorded in a state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResource {
    pub id: String,
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub attributes: Value,
}

fn default_mode() -> String {
    MODE_MANAGED.to_string()
}

impl StateResource {
    pub fn new(id: &str, resource_type: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            module: String::new(),
            provider: provider_for_type(resource_type).to_string(),
            mode: default_mode(),
            attributes: Value::Null,
        }
    }

    pub fn in_module(mut self, module: &str) -> Self {
        self.module = module.to_string();
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }

    /// Canonical `(module.)type.name` identity.
    pub fn key(&self) -> String {
        resource_key(&self.module, &self.resource_type, &self.name)
    }

    pub fn is_tainted(&self) -> bool {
        self.mode == MODE_TAINTED
    }

    pub fn is_managed(&self) -> bool {
        self.mode != MODE_DATA
    }
}

/// A parsed state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub lineage: String,
    #[serde(default)]
    pub terraform_version: String,
    pub resources: Vec<StateResource>,
    /// Set when the document has resource blocks with no instances.
    #[serde(default)]
    pub has_empty_resources: bool,
}

impl StateDocument {
    pub fn from_resources(resources: Vec<StateResource>) -> Self {
        Self {
            version: 4,
            resources,
            ..Self::default()
        }
    }

    /// Distinct module names, in order of first appearance.
    pub fn modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = Vec::new();
        for resource in &self.resources {
            if !resource.module.is_empty() && !modules.contains(&resource.module) {
                modules.push(resource.module.clone());
            }
        }
        modules
    }

    /// A document is partial if it holds tainted or instance-less resources.
    pub fn is_partial(&self) -> bool {
        self.has_empty_resources || self.resources.iter().any(|r| r.is_tainted())
    }

    /// First `environment` or `env` tag found on any resource.
    pub fn environment_tag(&self) -> Option<String> {
        self.resources.iter().find_map(|r| {
            let tags = r.attributes.get("tags")?;
            tags.get("environment")
                .or_else(|| tags.get("env"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
    }
}

/// Canonical `(module.)type.name` key. Unique within one state file, not across files.
pub fn resource_key(module: &str, resource_type: &str, name: &str) -> String {
    if module.is_empty() {
        format!("{}.{}", resource_type, name)
    } else {
        format!("{}.{}.{}", module, resource_type, name)
    }
}

/// Provider inferred from a resource type prefix.
pub fn provider_for_type(resource_type: &str) -> &'static str {
    if resource_type.starts_with("aws_") {
        "aws"
    } else if resource_type.starts_with("azurerm_") {
        "azure"
    } else if resource_type.starts_with("google_") {
        "gcp"
    } else if resource_type.starts_with("digitalocean_") {
        "digitalocean"
    } else {
        "unknown"
    }
}

pub fn is_backup_path(path: &str) -> bool {
    path.ends_with(".backup")
}

/// Path of the canonical state a backup belongs to (`prod.tfstate.backup` -> `prod.tfstate`).
pub fn canonical_path_for_backup(path: &str) -> Option<&str> {
    path.strip_suffix(".backup")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_key_with_and_without_module() {
        assert_eq!(resource_key("", "aws_instance", "web"), "aws_instance.web");
        assert_eq!(
            resource_key("module.vpc", "aws_subnet", "private"),
            "module.vpc.aws_subnet.private"
        );
    }

    #[test]
    fn test_provider_for_type() {
        assert_eq!(provider_for_type("aws_s3_bucket"), "aws");
        assert_eq!(provider_for_type("azurerm_subnet"), "azure");
        assert_eq!(provider_for_type("google_compute_instance"), "gcp");
        assert_eq!(provider_for_type("digitalocean_droplet"), "digitalocean");
        assert_eq!(provider_for_type("random_id"), "unknown");
    }

    #[test]
    fn test_backup_paths() {
        assert!(is_backup_path("envs/prod.tfstate.backup"));
        assert!(!is_backup_path("envs/prod.tfstate"));
        assert_eq!(
            canonical_path_for_backup("envs/prod.tfstate.backup"),
            Some("envs/prod.tfstate")
        );
        assert_eq!(canonical_path_for_backup("envs/prod.tfstate"), None);
    }

    #[test]
    fn test_document_modules_and_partial() {
        let doc = StateDocument::from_resources(vec![
            StateResource::new("a", "aws_subnet", "a").in_module("module.vpc"),
            StateResource::new("b", "aws_subnet", "b").in_module("module.vpc"),
            StateResource::new("c", "aws_instance", "c").with_mode(MODE_TAINTED),
        ]);
        assert_eq!(doc.modules(), vec!["module.vpc".to_string()]);
        assert!(doc.is_partial());
    }

    #[test]
    fn test_environment_tag() {
        let doc = StateDocument::from_resources(vec![
            StateResource::new("a", "aws_vpc", "main"),
            StateResource::new("b", "aws_instance", "web")
                .with_attributes(json!({"tags": {"env": "staging"}})),
        ]);
        assert_eq!(doc.environment_tag().as_deref(), Some("staging"));
    }
}
