//! Multi-state aggregation.
//!
//! A pass runs in order:
//! 1. Load discovered states (canonical files first, then backups)
//! 2. Build the cross-file resource index
//! 3. Classify duplicate groups
//! 4. Detect orphans from backup-vs-current comparison
//! 5. Infer cross-state references
//! 6. Infer state relationships
//! 7. Analyze module usage
//! 8. Compute metrics, issues and recommendations
//!
//! The pass builds a fresh result without touching the published one and
//! swaps it in at the end, so readers are never blocked by a running pass.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::AggregatorConfig;
use crate::error::AggregationError;
use crate::logging::structured::LogContext;
use crate::state::{
    canonical_path_for_backup, provider_for_type, DiscoveredState, StateDiscovery, StateDocument,
    StateLoader,
};

use super::models::{
    AggregationMetrics, AggregationResult, CloudResource, ComparisonResult, CrossStateReference,
    ModuleInfo, OrphanedResource, ResourceLocation,
};
use super::report::{generate_issues, generate_recommendations, IssueInputs};
use super::rules::{are_related, classify_duplicates, find_orphans, find_references, DuplicateClass};

/// Aggregates many state files into one resource index.
pub struct StateAggregator {
    discovery: Arc<dyn StateDiscovery>,
    loader: Arc<dyn StateLoader>,
    config: AggregatorConfig,
    /// Serializes passes; never held by readers.
    pass_lock: Mutex<()>,
    current: RwLock<Arc<AggregationResult>>,
}

impl StateAggregator {
    pub fn new(discovery: Arc<dyn StateDiscovery>, loader: Arc<dyn StateLoader>) -> Self {
        Self::with_config(discovery, loader, AggregatorConfig::default())
    }

    pub fn with_config(
        discovery: Arc<dyn StateDiscovery>,
        loader: Arc<dyn StateLoader>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            discovery,
            loader,
            config,
            pass_lock: Mutex::new(()),
            current: RwLock::new(Arc::new(AggregationResult::default())),
        }
    }

    /// Run a full aggregation pass over every discovered state.
    ///
    /// Per-file load failures are reported as issues; only a failure to
    /// enumerate states fails the pass.
    pub fn aggregate_states(&self) -> Result<Arc<AggregationResult>, AggregationError> {
        let _pass = self.pass_lock.lock();
        let start = Instant::now();

        let pass_id = format!("agg-{}", &Uuid::new_v4().to_string()[..8]);
        let ctx = LogContext::pass(&pass_id);

        let discovered = self.discovery.discovered_states()?;
        log::info!("{} AGGREGATION_START discovered={}", ctx, discovered.len());

        let mut pass = AggregationPass::new(&ctx, &discovered);
        pass.load_all(self.loader.as_ref());
        pass.build_resource_index();
        pass.detect_duplicates();
        pass.find_orphaned_resources();
        pass.analyze_cross_state_references();
        pass.build_state_relationships();
        pass.analyze_modules();

        let mut result = pass.finish(pass_id, &self.config);
        result.metrics.processing_time_ms = start.elapsed().as_millis() as u64;

        log::info!(
            "{} AGGREGATION_COMPLETE states={} resources={} duplicates={} conflicts={} orphans={} references={} issues={} elapsed_ms={}",
            ctx,
            result.metrics.total_states,
            result.metrics.total_resources,
            result.metrics.duplicate_resources,
            result.metrics.conflicting_resources,
            result.metrics.orphaned_resources,
            result.metrics.cross_state_references,
            result.issues.len(),
            result.metrics.processing_time_ms
        );

        let result = Arc::new(result);
        *self.current.write() = Arc::clone(&result);
        Ok(result)
    }

    /// Result of the most recent completed pass.
    pub fn last_result(&self) -> Arc<AggregationResult> {
        Arc::clone(&self.current.read())
    }

    pub fn resource_by_key(&self, key: &str) -> Option<ResourceLocation> {
        self.current.read().all_resources.get(key).cloned()
    }

    pub fn all_resources(&self) -> BTreeMap<String, ResourceLocation> {
        self.current.read().all_resources.clone()
    }

    pub fn duplicate_resources(&self) -> BTreeMap<String, Vec<ResourceLocation>> {
        self.current.read().duplicate_resources.clone()
    }

    pub fn orphaned_resources(&self) -> BTreeMap<String, OrphanedResource> {
        self.current.read().orphaned_resources.clone()
    }

    pub fn modules(&self) -> BTreeMap<String, ModuleInfo> {
        self.current.read().modules.clone()
    }

    pub fn metrics(&self) -> AggregationMetrics {
        self.current.read().metrics.clone()
    }

    /// Compare the indexed resources against resources observed live.
    ///
    /// Cloud resources are matched on `type.name`.
    pub fn compare_with_cloud_resources(&self, cloud: &[CloudResource]) -> ComparisonResult {
        let current = self.current.read();
        compare_index(&current.all_resources, cloud)
    }
}

fn compare_index(
    index: &BTreeMap<String, ResourceLocation>,
    cloud: &[CloudResource],
) -> ComparisonResult {
    let mut result = ComparisonResult {
        state_resources: index.len(),
        cloud_resources: cloud.len(),
        ..ComparisonResult::default()
    };

    let mut cloud_keys = HashSet::new();
    for resource in cloud {
        let key = format!("{}.{}", resource.resource_type, resource.name);
        if index.contains_key(&key) {
            result.in_both.push(key.clone());
        } else {
            result.in_cloud_only.push(key.clone());
        }
        cloud_keys.insert(key);
    }

    result.in_state_only = index
        .keys()
        .filter(|k| !cloud_keys.contains(*k))
        .cloned()
        .collect();

    if !cloud.is_empty() {
        result.coverage_percent = result.in_both.len() as f64 / cloud.len() as f64 * 100.0;
    }

    result.in_state_only.sort();
    result.in_cloud_only.sort();
    result.in_both.sort();
    result
}

/// Working state of one pass. Dropped once the result is published.
struct AggregationPass<'a> {
    ctx: &'a LogContext,
    discovered: &'a BTreeMap<String, DiscoveredState>,
    /// Files contributing to the index.
    states: BTreeMap<String, StateDocument>,
    /// Backups whose canonical file was loaded; used only for orphan detection.
    backups: BTreeMap<String, StateDocument>,
    load_failures: BTreeMap<String, String>,
    environment_states: BTreeMap<String, Vec<String>>,
    workspace_states: BTreeMap<String, Vec<String>>,
    resource_index: BTreeMap<String, ResourceLocation>,
    duplicates: BTreeMap<String, Vec<ResourceLocation>>,
    orphans: BTreeMap<String, OrphanedResource>,
    cross_refs: BTreeMap<String, Vec<CrossStateReference>>,
    relationships: BTreeMap<String, Vec<String>>,
    modules: BTreeMap<String, ModuleInfo>,
    metrics: AggregationMetrics,
}

impl<'a> AggregationPass<'a> {
    fn new(ctx: &'a LogContext, discovered: &'a BTreeMap<String, DiscoveredState>) -> Self {
        Self {
            ctx,
            discovered,
            states: BTreeMap::new(),
            backups: BTreeMap::new(),
            load_failures: BTreeMap::new(),
            environment_states: BTreeMap::new(),
            workspace_states: BTreeMap::new(),
            resource_index: BTreeMap::new(),
            duplicates: BTreeMap::new(),
            orphans: BTreeMap::new(),
            cross_refs: BTreeMap::new(),
            relationships: BTreeMap::new(),
            modules: BTreeMap::new(),
            metrics: AggregationMetrics::default(),
        }
    }

    fn load_all(&mut self, loader: &dyn StateLoader) {
        // Canonical files first so a backup can tell whether its main state loaded.
        let discovered = self.discovered;
        let (backups, canonical): (Vec<&DiscoveredState>, Vec<&DiscoveredState>) =
            discovered.values().partition(|s| s.is_backup());

        for state in canonical {
            if let Some(doc) = self.load_one(loader, state) {
                self.register(state, doc);
            }
        }

        for state in backups {
            let main_loaded = canonical_path_for_backup(&state.path)
                .map(|main| self.states.contains_key(main))
                .unwrap_or(false);
            let Some(doc) = self.load_one(loader, state) else {
                continue;
            };
            if main_loaded {
                log::debug!(
                    "{} STATE_BACKUP_SHADOWED backup={}",
                    self.ctx,
                    state.path
                );
                self.backups.insert(state.path.clone(), doc);
            } else {
                self.register(state, doc);
            }
        }

        self.metrics.total_states = self.states.len();
        self.metrics.failed_states = self.load_failures.len();
    }

    fn load_one(&mut self, loader: &dyn StateLoader, state: &DiscoveredState) -> Option<StateDocument> {
        match loader.load_state_file(Path::new(&state.path)) {
            Ok(doc) => {
                log::debug!(
                    "{} STATE_LOADED resources={}",
                    self.ctx.with_state(&state.path),
                    doc.resources.len()
                );
                Some(doc)
            }
            Err(e) => {
                crate::log_warn!(
                    self.ctx.with_state(&state.path),
                    "STATE_LOAD_FAILED",
                    error = e.to_string()
                );
                self.load_failures.insert(state.path.clone(), e.to_string());
                None
            }
        }
    }

    fn register(&mut self, state: &DiscoveredState, doc: StateDocument) {
        if !state.environment.is_empty() {
            self.environment_states
                .entry(state.environment.clone())
                .or_default()
                .push(state.path.clone());
        }
        if !state.workspace.is_empty() {
            self.workspace_states
                .entry(state.workspace.clone())
                .or_default()
                .push(state.path.clone());
        }
        self.states.insert(state.path.clone(), doc);
    }

    fn build_resource_index(&mut self) {
        let mut total = 0;

        for (path, doc) in &self.states {
            let Some(discovered) = self.discovered.get(path) else {
                continue;
            };
            let mut seen_in_file = HashSet::new();

            for resource in &doc.resources {
                let key = resource.key();
                if !seen_in_file.insert(key.clone()) {
                    log::warn!(
                        "{} RESOURCE_KEY_REPEATED_IN_FILE key={}",
                        self.ctx.with_state(path),
                        key
                    );
                    continue;
                }

                let location = ResourceLocation {
                    state_file: path.clone(),
                    resource_id: resource.id.clone(),
                    resource_type: resource.resource_type.clone(),
                    resource_name: resource.name.clone(),
                    workspace: discovered.workspace.clone(),
                    environment: discovered.environment.clone(),
                    module: resource.module.clone(),
                    provider: resource.provider.clone(),
                    last_modified: discovered.last_modified,
                    is_managed: resource.is_managed(),
                    is_tainted: resource.is_tainted(),
                    has_drift: false,
                };
                total += 1;

                *self
                    .metrics
                    .resources_by_provider
                    .entry(provider_for_type(&resource.resource_type).to_string())
                    .or_default() += 1;

                match self.resource_index.get(&key) {
                    Some(existing) => {
                        let group = self
                            .duplicates
                            .entry(key)
                            .or_insert_with(|| vec![existing.clone()]);
                        group.push(location);
                    }
                    None => {
                        self.resource_index.insert(key, location);
                    }
                }
            }
        }

        self.metrics.total_resources = total;
        self.metrics.unique_resources = self.resource_index.len() - self.duplicates.len();
    }

    fn detect_duplicates(&mut self) {
        self.metrics.duplicate_resources = self.duplicates.len();

        for (key, locations) in self.duplicates.iter_mut() {
            match classify_duplicates(locations) {
                DuplicateClass::MultiEnvironment => {
                    for location in locations.iter_mut() {
                        location.has_drift = false;
                    }
                    if let Some(canonical) = self.resource_index.get_mut(key) {
                        canonical.has_drift = false;
                    }
                }
                DuplicateClass::Conflict => {
                    self.metrics.conflicting_resources += 1;
                    log::warn!(
                        "{} DUPLICATE_CONFLICT key={} states={:?}",
                        self.ctx,
                        key,
                        locations.iter().map(|l| &l.state_file).collect::<Vec<_>>()
                    );
                }
            }
        }
    }

    fn find_orphaned_resources(&mut self) {
        for (backup_path, backup) in &self.backups {
            let Some(main_path) = canonical_path_for_backup(backup_path) else {
                continue;
            };
            let Some(current) = self.states.get(main_path) else {
                continue;
            };

            let last_seen = self.modified_time(backup_path);
            let detected = self.modified_time(main_path);
            for (key, orphan) in find_orphans(backup_path, backup, current, last_seen, detected) {
                log::info!(
                    "{} ORPHAN_DETECTED key={} reason={:?}",
                    self.ctx.with_state(backup_path),
                    key,
                    orphan.likely_reason
                );
                self.orphans.insert(key, orphan);
            }
        }

        self.metrics.orphaned_resources = self.orphans.len();
    }

    fn analyze_cross_state_references(&mut self) {
        for (source_path, source) in &self.states {
            for (target_path, target) in &self.states {
                if source_path == target_path {
                    continue;
                }
                let refs = find_references(source_path, source, target_path, target);
                if !refs.is_empty() {
                    self.cross_refs
                        .entry(source_path.clone())
                        .or_default()
                        .extend(refs);
                }
            }
        }

        self.metrics.cross_state_references = self.cross_refs.values().map(|r| r.len()).sum();
    }

    fn build_state_relationships(&mut self) {
        let discovered = self.discovered;
        for (path_a, a) in discovered {
            for (path_b, b) in discovered {
                if path_a == path_b {
                    continue;
                }
                if are_related(a, b) {
                    self.relationships
                        .entry(path_a.clone())
                        .or_default()
                        .push(path_b.clone());
                }
            }
        }
    }

    fn analyze_modules(&mut self) {
        for (path, doc) in &self.states {
            let mut seen = HashSet::new();
            for resource in &doc.resources {
                if resource.module.is_empty() {
                    continue;
                }
                let first_in_file = seen.insert(resource.module.clone());
                let last_modified = self
                    .discovered
                    .get(path)
                    .map(|d| d.last_modified)
                    .unwrap_or_default();

                let info = self
                    .modules
                    .entry(resource.module.clone())
                    .or_insert_with(|| ModuleInfo {
                        name: resource.module.clone(),
                        source: String::new(),
                        version: String::new(),
                        used_in_states: Vec::new(),
                        resource_count: 0,
                        last_updated: last_modified,
                        dependencies: Vec::new(),
                    });
                info.resource_count += 1;
                if first_in_file {
                    info.used_in_states.push(path.clone());
                    if last_modified > info.last_updated {
                        info.last_updated = last_modified;
                    }
                }
            }
        }
    }

    fn finish(mut self, pass_id: String, config: &AggregatorConfig) -> AggregationResult {
        for (env, states) in &self.environment_states {
            self.metrics
                .states_by_environment
                .insert(env.clone(), states.len());
        }
        for (workspace, states) in &self.workspace_states {
            self.metrics
                .states_by_workspace
                .insert(workspace.clone(), states.len());
        }
        self.metrics.partial_states = self.discovered.values().filter(|s| s.is_partial).count();

        let issues = generate_issues(&IssueInputs {
            duplicates: &self.duplicates,
            orphans: &self.orphans,
            discovered: self.discovered,
            load_failures: &self.load_failures,
        });
        let recommendations = generate_recommendations(
            &self.metrics,
            &self.environment_states,
            &self.modules,
            config.consolidation_threshold,
        );

        AggregationResult {
            pass_id,
            all_resources: self.resource_index,
            duplicate_resources: self.duplicates,
            orphaned_resources: self.orphans,
            cross_state_references: self.cross_refs,
            state_relationships: self.relationships,
            modules: self.modules,
            metrics: self.metrics,
            issues,
            recommendations,
        }
    }

    fn modified_time(&self, path: &str) -> chrono::DateTime<chrono::Utc> {
        self.discovered
            .get(path)
            .map(|d| d.last_modified)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::models::{IssueSeverity, IssueType, RemovalReason};
    use crate::error::{DiscoveryError, StateError};
    use crate::state::{StateResource, StaticDiscovery};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::path::PathBuf;

    /// Loader backed by an in-memory map; unknown paths fail to load.
    #[derive(Default)]
    struct MapLoader {
        docs: HashMap<String, StateDocument>,
    }

    impl MapLoader {
        fn with(mut self, path: &str, resources: Vec<StateResource>) -> Self {
            self.docs
                .insert(path.to_string(), StateDocument::from_resources(resources));
            self
        }
    }

    impl StateLoader for MapLoader {
        fn load_state_file(&self, path: &Path) -> Result<StateDocument, StateError> {
            self.docs
                .get(path.to_string_lossy().as_ref())
                .cloned()
                .ok_or_else(|| StateError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                })
        }
    }

    struct BrokenDiscovery;

    impl StateDiscovery for BrokenDiscovery {
        fn discovered_states(&self) -> Result<BTreeMap<String, DiscoveredState>, DiscoveryError> {
            Err(DiscoveryError::MissingRoot(PathBuf::from("/states")))
        }
    }

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn aggregator(discovery: StaticDiscovery, loader: MapLoader) -> StateAggregator {
        StateAggregator::new(Arc::new(discovery), Arc::new(loader))
    }

    #[test]
    fn test_duplicate_without_environments_is_conflict() {
        let discovery = StaticDiscovery::new()
            .with_state(DiscoveredState::new("team-a/main.tfstate", t0()))
            .with_state(DiscoveredState::new("team-b/main.tfstate", t0()));
        let loader = MapLoader::default()
            .with("team-a/main.tfstate", vec![StateResource::new("i-1", "aws_instance", "web")])
            .with("team-b/main.tfstate", vec![StateResource::new("i-2", "aws_instance", "web")]);

        let result = aggregator(discovery, loader).aggregate_states().unwrap();

        assert_eq!(result.duplicate_resources.len(), 1);
        assert_eq!(result.duplicate_resources["aws_instance.web"].len(), 2);
        assert_eq!(result.metrics.conflicting_resources, 1);
        let critical: Vec<_> = result.issues_of(IssueType::DuplicateResource).collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].severity, IssueSeverity::Critical);
    }

    #[test]
    fn test_duplicate_across_environments_is_intentional() {
        let discovery = StaticDiscovery::new()
            .with_state(DiscoveredState::new("prod/main.tfstate", t0()).with_environment("production"))
            .with_state(DiscoveredState::new("dev/main.tfstate", t0()).with_environment("development"));
        let loader = MapLoader::default()
            .with("prod/main.tfstate", vec![StateResource::new("i-1", "aws_instance", "web")])
            .with("dev/main.tfstate", vec![StateResource::new("i-2", "aws_instance", "web")]);

        let result = aggregator(discovery, loader).aggregate_states().unwrap();

        assert_eq!(result.metrics.duplicate_resources, 1);
        assert_eq!(result.metrics.conflicting_resources, 0);
        assert_eq!(result.issues_of(IssueType::DuplicateResource).count(), 0);
        assert!(result.duplicate_resources["aws_instance.web"]
            .iter()
            .all(|l| !l.has_drift));
    }

    #[test]
    fn test_backup_shadowed_but_used_for_orphans() {
        let discovery = StaticDiscovery::new()
            .with_state(DiscoveredState::new("prod.tfstate", t0()))
            .with_state(DiscoveredState::new("prod.tfstate.backup", t0() - chrono::Duration::days(1)));
        let loader = MapLoader::default()
            .with("prod.tfstate", vec![StateResource::new("vpc-1", "aws_vpc", "main")])
            .with(
                "prod.tfstate.backup",
                vec![
                    StateResource::new("vpc-1", "aws_vpc", "main"),
                    StateResource::new("logs-bucket", "aws_s3_bucket", "logs"),
                ],
            );

        let result = aggregator(discovery, loader).aggregate_states().unwrap();

        assert_eq!(result.metrics.total_states, 1);
        assert!(result.duplicate_resources.is_empty());
        assert_eq!(result.orphaned_resources.len(), 1);
        let orphan = &result.orphaned_resources["aws_s3_bucket.logs"];
        assert_eq!(orphan.last_seen_state, "prod.tfstate.backup");
        assert_eq!(orphan.likely_reason, RemovalReason::ManualRemoval);
        assert_eq!(orphan.removal_detected, t0());
    }

    #[test]
    fn test_backup_indexed_when_main_fails_to_load() {
        let discovery = StaticDiscovery::new()
            .with_state(DiscoveredState::new("prod.tfstate", t0()))
            .with_state(DiscoveredState::new("prod.tfstate.backup", t0()));
        let loader = MapLoader::default().with(
            "prod.tfstate.backup",
            vec![StateResource::new("vpc-1", "aws_vpc", "main")],
        );

        let result = aggregator(discovery, loader).aggregate_states().unwrap();

        assert_eq!(result.metrics.total_states, 1);
        assert_eq!(result.metrics.failed_states, 1);
        assert_eq!(
            result.all_resources["aws_vpc.main"].state_file,
            "prod.tfstate.backup"
        );
        assert_eq!(result.issues_of(IssueType::LoadFailure).count(), 1);
    }

    #[test]
    fn test_discovery_failure_is_fatal() {
        let agg = StateAggregator::new(Arc::new(BrokenDiscovery), Arc::new(MapLoader::default()));
        assert!(matches!(
            agg.aggregate_states(),
            Err(AggregationError::Discovery(_))
        ));
    }

    #[test]
    fn test_cross_references_and_relationships() {
        let discovery = StaticDiscovery::new()
            .with_state(DiscoveredState::new("stack/compute/c.tfstate", t0()))
            .with_state(DiscoveredState::new("stack/n.tfstate", t0()))
            .with_state(DiscoveredState::new("elsewhere/x.tfstate", t0()));
        let loader = MapLoader::default()
            .with(
                "stack/compute/c.tfstate",
                vec![StateResource::new("i-1", "aws_instance", "web")],
            )
            .with(
                "stack/n.tfstate",
                vec![
                    StateResource::new("subnet-1", "aws_subnet", "a"),
                    StateResource::new("kp-1", "aws_key_pair", "ops"),
                ],
            )
            .with("elsewhere/x.tfstate", vec![StateResource::new("z", "aws_vpc", "z")]);

        let result = aggregator(discovery, loader).aggregate_states().unwrap();

        assert_eq!(result.metrics.cross_state_references, 2);
        assert_eq!(result.cross_state_references["stack/compute/c.tfstate"].len(), 2);
        assert!(!result.cross_state_references.contains_key("stack/n.tfstate"));

        assert_eq!(
            result.state_relationships["stack/compute/c.tfstate"],
            vec!["stack/n.tfstate".to_string()]
        );
        assert_eq!(
            result.state_relationships["stack/n.tfstate"],
            vec!["stack/compute/c.tfstate".to_string()]
        );
        assert!(!result.state_relationships.contains_key("elsewhere/x.tfstate"));
    }

    #[test]
    fn test_module_usage_counts_files_once() {
        let discovery = StaticDiscovery::new()
            .with_state(DiscoveredState::new("a/main.tfstate", t0()))
            .with_state(DiscoveredState::new("b/main.tfstate", t0() + chrono::Duration::hours(1)));
        let loader = MapLoader::default()
            .with(
                "a/main.tfstate",
                vec![
                    StateResource::new("s1", "aws_subnet", "one").in_module("module.vpc"),
                    StateResource::new("s2", "aws_subnet", "two").in_module("module.vpc"),
                ],
            )
            .with(
                "b/main.tfstate",
                vec![StateResource::new("s3", "aws_subnet", "three").in_module("module.vpc")],
            );

        let agg = aggregator(discovery, loader);
        let result = agg.aggregate_states().unwrap();

        let vpc = &result.modules["module.vpc"];
        assert_eq!(vpc.used_in_states, vec!["a/main.tfstate", "b/main.tfstate"]);
        assert_eq!(vpc.resource_count, 3);
        assert_eq!(vpc.last_updated, t0() + chrono::Duration::hours(1));
        assert!(result
            .recommendations
            .contains(&"Good: 1 modules are reused across states".to_string()));
        assert_eq!(agg.modules().len(), 1);
    }

    #[test]
    fn test_repeated_key_in_one_file_indexed_once() {
        let discovery = StaticDiscovery::new().with_state(DiscoveredState::new("a.tfstate", t0()));
        let loader = MapLoader::default().with(
            "a.tfstate",
            vec![
                StateResource::new("i-1", "aws_instance", "web"),
                StateResource::new("i-1", "aws_instance", "web"),
            ],
        );

        let result = aggregator(discovery, loader).aggregate_states().unwrap();
        assert_eq!(result.metrics.total_resources, 1);
        assert!(result.duplicate_resources.is_empty());
    }

    #[test]
    fn test_readers_see_last_published_pass() {
        let discovery = StaticDiscovery::new().with_state(DiscoveredState::new("a.tfstate", t0()));
        let loader =
            MapLoader::default().with("a.tfstate", vec![StateResource::new("i-1", "aws_instance", "web")]);
        let agg = aggregator(discovery, loader);

        assert!(agg.resource_by_key("aws_instance.web").is_none());
        let result = agg.aggregate_states().unwrap();
        assert_eq!(agg.last_result().pass_id, result.pass_id);
        assert_eq!(
            agg.resource_by_key("aws_instance.web").unwrap().resource_id,
            "i-1"
        );
        assert_eq!(agg.metrics().total_resources, 1);
        assert_eq!(agg.all_resources().len(), 1);
        assert!(agg.duplicate_resources().is_empty());
        assert!(agg.orphaned_resources().is_empty());
    }

    #[test]
    fn test_compare_with_cloud_resources() {
        let discovery = StaticDiscovery::new().with_state(DiscoveredState::new("a.tfstate", t0()));
        let loader = MapLoader::default().with(
            "a.tfstate",
            vec![
                StateResource::new("i-1", "aws_instance", "web"),
                StateResource::new("vpc-1", "aws_vpc", "main"),
            ],
        );
        let agg = aggregator(discovery, loader);
        agg.aggregate_states().unwrap();

        let cloud = vec![
            CloudResource {
                id: "i-1".to_string(),
                resource_type: "aws_instance".to_string(),
                name: "web".to_string(),
            },
            CloudResource {
                id: "b-1".to_string(),
                resource_type: "aws_s3_bucket".to_string(),
                name: "assets".to_string(),
            },
        ];
        let cmp = agg.compare_with_cloud_resources(&cloud);
        assert_eq!(cmp.in_both, vec!["aws_instance.web"]);
        assert_eq!(cmp.in_cloud_only, vec!["aws_s3_bucket.assets"]);
        assert_eq!(cmp.in_state_only, vec!["aws_vpc.main"]);
        assert!((cmp.coverage_percent - 50.0).abs() < f64::EPSILON);
    }
}
