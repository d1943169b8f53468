//! State file loading.
//!
//! The aggregator consumes state documents through [`StateLoader`]; the
//! default [`JsonStateLoader`] reads Terraform v4 JSON state from disk.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::StateError;

use super::models::{provider_for_type, StateDocument, StateResource, MODE_TAINTED};

/// Loads a parsed state document from a path.
pub trait StateLoader: Send + Sync {
    fn load_state_file(&self, path: &Path) -> Result<StateDocument, StateError>;
}

/// Reads Terraform JSON state files.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStateLoader;

impl JsonStateLoader {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw state bytes. `path` is only used for error reporting.
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<StateDocument, StateError> {
        let raw: RawState = serde_json::from_slice(bytes).map_err(|source| StateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(raw.into_document())
    }
}

impl StateLoader for JsonStateLoader {
    fn load_state_file(&self, path: &Path) -> Result<StateDocument, StateError> {
        let bytes = fs::read(path).map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &bytes)
    }
}

#[derive(Debug, Deserialize)]
struct RawState {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    serial: u64,
    #[serde(default)]
    lineage: String,
    #[serde(default)]
    terraform_version: String,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(default)]
    module: String,
    #[serde(default)]
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    instances: Vec<RawInstance>,
}

#[derive(Debug, Deserialize)]
struct RawInstance {
    #[serde(default)]
    index_key: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    attributes: Value,
}

impl RawState {
    fn into_document(self) -> StateDocument {
        let mut has_empty_resources = false;
        let mut resources = Vec::new();

        for raw in self.resources {
            let provider = normalize_provider(&raw.provider, &raw.resource_type);
            let mode = if raw.mode.is_empty() {
                "managed".to_string()
            } else {
                raw.mode.clone()
            };

            if raw.instances.is_empty() {
                has_empty_resources = true;
                resources.push(StateResource {
                    id: String::new(),
                    resource_type: raw.resource_type.clone(),
                    name: raw.name.clone(),
                    module: raw.module.clone(),
                    provider,
                    mode,
                    attributes: Value::Null,
                });
                continue;
            }

            for instance in raw.instances {
                let name = match &instance.index_key {
                    Some(Value::Number(n)) => format!("{}[{}]", raw.name, n),
                    Some(Value::String(s)) => format!("{}[\"{}\"]", raw.name, s),
                    _ => raw.name.clone(),
                };
                let id = instance
                    .attributes
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                let instance_mode = if instance.status.as_deref() == Some("tainted") {
                    MODE_TAINTED.to_string()
                } else {
                    mode.clone()
                };

                resources.push(StateResource {
                    id,
                    resource_type: raw.resource_type.clone(),
                    name,
                    module: raw.module.clone(),
                    provider: provider.clone(),
                    mode: instance_mode,
                    attributes: instance.attributes,
                });
            }
        }

        StateDocument {
            version: self.version,
            serial: self.serial,
            lineage: self.lineage,
            terraform_version: self.terraform_version,
            resources,
            has_empty_resources,
        }
    }
}

/// `provider["registry.terraform.io/hashicorp/aws"]` -> `aws`, mapped to the
/// engine's provider names. Falls back to the resource type prefix.
fn normalize_provider(raw: &str, resource_type: &str) -> String {
    let inner = raw
        .split_once("[\"")
        .and_then(|(_, rest)| rest.split_once("\"]"))
        .map(|(source, _)| source)
        .unwrap_or(raw);
    let short = inner.rsplit('/').next().unwrap_or_default();

    match short {
        "aws" => "aws".to_string(),
        "azurerm" => "azure".to_string(),
        "google" | "google-beta" => "gcp".to_string(),
        "digitalocean" => "digitalocean".to_string(),
        _ => provider_for_type(resource_type).to_string(),
    }
}
