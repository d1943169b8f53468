//! State discovery.
//!
//! Enumerates state file locations together with the metadata the
//! aggregator needs (workspace, environment, modules, partial flag).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::DiscoveryError;

use super::loader::JsonStateLoader;
use super::models::{is_backup_path, DiscoveredState, StateType};

/// Enumerates known state locations keyed by path.
pub trait StateDiscovery: Send + Sync {
    fn discovered_states(&self) -> Result<BTreeMap<String, DiscoveredState>, DiscoveryError>;
}

/// Discovery over a caller-provided set of states.
#[derive(Debug, Default, Clone)]
pub struct StaticDiscovery {
    states: BTreeMap<String, DiscoveredState>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: DiscoveredState) -> Self {
        self.insert(state);
        self
    }

    pub fn insert(&mut self, state: DiscoveredState) {
        self.states.insert(state.path.clone(), state);
    }
}

impl StateDiscovery for StaticDiscovery {
    fn discovered_states(&self) -> Result<BTreeMap<String, DiscoveredState>, DiscoveryError> {
        Ok(self.states.clone())
    }
}

lazy_static! {
    /// Path markers checked in order; the first match names the environment.
    static ref ENVIRONMENT_MARKERS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"(?:^|[/\\._-])(?:prod|production|prd)(?:[/\\._-]|$)").unwrap(), "production"),
        (Regex::new(r"(?:^|[/\\._-])(?:staging|stage|stg)(?:[/\\._-]|$)").unwrap(), "staging"),
        (Regex::new(r"(?:^|[/\\._-])(?:dev|development)(?:[/\\._-]|$)").unwrap(), "development"),
        (Regex::new(r"(?:^|[/\\._-])(?:test|testing)(?:[/\\._-]|$)").unwrap(), "testing"),
        (Regex::new(r"(?:^|[/\\._-])qa(?:[/\\._-]|$)").unwrap(), "qa"),
    ];

    /// `terraform.tfstate.d/<workspace>/terraform.tfstate`
    static ref WORKSPACE_PATTERN: Regex =
        Regex::new(r"terraform\.tfstate\.d[/\\]([^/\\]+)[/\\]").unwrap();
}

/// Walks a directory tree for `*.tfstate` and `*.tfstate.backup` files.
#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    root: PathBuf,
}

impl DirectoryDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Metadata for one candidate file.
    ///
    /// A file that cannot be read or parsed is still returned, described
    /// from its path alone, so the loader reports the failure. Valid JSON
    /// without a format version is not Terraform state and is skipped.
    fn inspect(&self, path: &Path) -> Option<DiscoveredState> {
        let path_str = path.to_string_lossy().to_string();
        let last_modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let mut state = DiscoveredState {
            state_type: detect_state_type(&path_str),
            workspace: detect_workspace(&path_str),
            environment: detect_environment(&path_str)
                .unwrap_or("unknown")
                .to_string(),
            last_modified,
            is_partial: false,
            modules: Vec::new(),
            path: path_str,
        };

        let document = match std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| JsonStateLoader::parse(path, &bytes).map_err(|e| e.to_string()))
        {
            Ok(d) => d,
            Err(e) => {
                log::warn!("DISCOVERY_UNREADABLE_STATE path={} error={}", state.path, e);
                return Some(state);
            }
        };
        // Terraform state always carries a format version.
        if document.version == 0 {
            log::debug!("DISCOVERY_SKIP_NOT_STATE path={} reason=no_version", state.path);
            return None;
        }

        if detect_environment(&state.path).is_none() {
            if let Some(tag) = document.environment_tag() {
                state.environment = tag;
            }
        }
        state.is_partial = document.is_partial();
        state.modules = document.modules();
        Some(state)
    }
}

impl StateDiscovery for DirectoryDiscovery {
    fn discovered_states(&self) -> Result<BTreeMap<String, DiscoveredState>, DiscoveryError> {
        if !self.root.is_dir() {
            return Err(DiscoveryError::MissingRoot(self.root.clone()));
        }

        let mut states = BTreeMap::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(e.file_type().is_dir() && (name == ".terraform" || name == ".git"))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!(
                        "DISCOVERY_WALK_ERROR root={} error={}",
                        self.root.display(),
                        e
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if !(name.ends_with(".tfstate") || name.ends_with(".tfstate.backup")) {
                continue;
            }
            if let Some(state) = self.inspect(entry.path()) {
                states.insert(state.path.clone(), state);
            }
        }

        log::info!(
            "DISCOVERY_COMPLETE root={} states={}",
            self.root.display(),
            states.len()
        );
        Ok(states)
    }
}

/// Environment named by a path marker, if any.
pub fn detect_environment(path: &str) -> Option<&'static str> {
    let lower = path.to_lowercase();
    ENVIRONMENT_MARKERS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&lower))
        .map(|(_, env)| *env)
}

pub fn detect_workspace(path: &str) -> String {
    WORKSPACE_PATTERN
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "default".to_string())
}

pub fn detect_state_type(path: &str) -> StateType {
    if is_backup_path(path) {
        StateType::Backup
    } else if path.contains("terraform.tfstate.d") {
        StateType::Workspace
    } else if path.contains(".terragrunt-cache") {
        StateType::Terragrunt
    } else if path.contains("modules/") {
        StateType::Module
    } else {
        StateType::Local
    }
}
