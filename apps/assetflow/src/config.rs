//! # Project Configuration
//!
//! Parses the TOML project file that declares assets, sources and checks,
//! and turns it into the definitions accepted by `AssetGraph::from_assets`.
//!
//! ```toml
//! [settings]
//! state_path = "assetflow.redb"
//!
//! [[asset]]
//! key = "warehouse/orders"
//! deps = ["raw/orders"]
//! preset = "eager"
//! partitions = { type = "time_window", cadence = "daily", start = "2024-01-01T00:00:00" }
//!
//! [[source]]
//! key = "raw/orders"
//!
//! [[check]]
//! name = "not_empty"
//! asset = "warehouse/orders"
//! ```

use assetflow_core::{
    AssetCheckSpec, AssetChecksDefinition, AssetFlowError, AssetInput, AssetKey, AssetSpec,
    AssetsDefinition, Condition, NodeDefinition, PartitionMapping, PartitionsDefinition,
    SourceAsset,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, AssetFlowError>;

/// Maximum project file size (4 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 4 * 1024 * 1024;

// =============================================================================
// SCHEMA
// =============================================================================

/// A project file.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub settings: Settings,
    #[serde(rename = "asset")]
    pub assets: Vec<AssetConfig>,
    #[serde(rename = "multi_asset")]
    pub multi_assets: Vec<MultiAssetConfig>,
    #[serde(rename = "source")]
    pub sources: Vec<SourceConfig>,
    #[serde(rename = "check")]
    pub checks: Vec<CheckConfig>,
}

/// Project-wide settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// State database, relative to the project file.
    pub state_path: Option<PathBuf>,
    /// Snapshots kept per asset after each committed tick.
    pub keep_snapshots: Option<usize>,
}

/// Declarative fields shared by every produced asset.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpecConfig {
    pub key: String,
    pub deps: Vec<String>,
    pub group: Option<String>,
    pub description: Option<String>,
    pub code_version: Option<String>,
    pub owners: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
    /// Full condition tree.
    pub condition: Option<Condition>,
    /// Named condition, e.g. `eager`.
    pub preset: Option<String>,
}

/// One `[[asset]]` table: a single asset with its own op.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AssetConfig {
    #[serde(flatten)]
    pub spec: SpecConfig,
    #[serde(default)]
    pub partitions: Option<PartitionsDefinition>,
    /// Partition mapping per parent key.
    #[serde(default)]
    pub mappings: BTreeMap<String, PartitionMapping>,
    #[serde(default)]
    pub location: Option<String>,
}

/// One `[[multi_asset]]` table: several assets produced by one op.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MultiAssetConfig {
    pub name: String,
    #[serde(default)]
    pub outputs: Vec<SpecConfig>,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
    #[serde(default)]
    pub can_subset: bool,
    #[serde(default)]
    pub partitions: Option<PartitionsDefinition>,
    #[serde(default)]
    pub mappings: BTreeMap<String, PartitionMapping>,
    #[serde(default)]
    pub location: Option<String>,
}

/// One `[[source]]` table.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub key: String,
    pub observable: bool,
    pub group: Option<String>,
    pub description: Option<String>,
    pub partitions: Option<PartitionsDefinition>,
    pub location: Option<String>,
}

/// One `[[check]]` table.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct CheckConfig {
    pub name: String,
    pub asset: String,
    pub deps: Vec<String>,
    pub blocking: bool,
}

// =============================================================================
// LOADING
// =============================================================================

impl ProjectConfig {
    /// Load a project file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| {
            AssetFlowError::ConfigError(format!("Cannot read '{}': {e}", path.display()))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(AssetFlowError::ConfigError(format!(
                "Project file size {} bytes exceeds maximum allowed {MAX_CONFIG_FILE_SIZE} bytes",
                metadata.len()
            )));
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AssetFlowError::IoError(format!("Read project file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Parse project TOML.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| AssetFlowError::ConfigError(e.to_string()))
    }

    /// State database path: the configured one resolved against `project_dir`,
    /// or `assetflow.redb` next to the project file.
    pub fn state_path(&self, project_dir: &Path) -> PathBuf {
        match &self.settings.state_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => project_dir.join(path),
            None => project_dir.join("assetflow.redb"),
        }
    }

    /// Every definition declared by the project.
    pub fn definitions(&self) -> Result<Vec<AssetInput>> {
        let mut inputs = Vec::new();
        for asset in &self.assets {
            inputs.push(asset.to_definition()?.into());
        }
        for multi in &self.multi_assets {
            inputs.push(multi.to_definition()?.into());
        }
        for source in &self.sources {
            inputs.push(source.to_source()?.into());
        }
        for check in &self.checks {
            inputs.push(AssetChecksDefinition::single(check.to_spec()?).into());
        }
        tracing::debug!(definitions = inputs.len(), "project loaded");
        Ok(inputs)
    }
}

// =============================================================================
// CONVERSION
// =============================================================================

fn parse_key(field: &str, raw: &str) -> Result<AssetKey> {
    let key = AssetKey::from_user_string(raw);
    if key.is_empty() {
        return Err(AssetFlowError::ConfigError(format!(
            "{field} '{raw}' is not a valid asset key"
        )));
    }
    Ok(key)
}

fn parse_deps(deps: &[String]) -> Result<BTreeSet<AssetKey>> {
    deps.iter().map(|dep| parse_key("dependency", dep)).collect()
}

fn preset(name: &str) -> Result<Condition> {
    match name {
        "eager" => Ok(Condition::eager()),
        "missing" => Ok(Condition::missing()),
        "on_parent_update" => Ok(Condition::any_deps_match(Condition::newly_updated())
            & !Condition::any_deps_match(Condition::in_progress())
            & !Condition::in_progress()),
        other => Err(AssetFlowError::ConfigError(format!(
            "unknown condition preset '{other}' (expected eager, missing, on_parent_update)"
        ))),
    }
}

impl SpecConfig {
    fn condition(&self) -> Result<Option<Condition>> {
        let condition = match (&self.condition, &self.preset) {
            (Some(_), Some(_)) => {
                return Err(AssetFlowError::ConfigError(format!(
                    "asset '{}' sets both condition and preset",
                    self.key
                )));
            }
            (Some(condition), None) => Some(condition.clone()),
            (None, Some(name)) => Some(preset(name)?),
            (None, None) => None,
        };
        if let Some(condition) = &condition {
            condition.validate()?;
        }
        Ok(condition)
    }

    fn to_spec(&self) -> Result<AssetSpec> {
        let mut spec = AssetSpec::new(parse_key("asset key", &self.key)?);
        spec.group_name.clone_from(&self.group);
        spec.description.clone_from(&self.description);
        spec.code_version.clone_from(&self.code_version);
        spec.owners.clone_from(&self.owners);
        spec.tags.clone_from(&self.tags);
        spec.metadata.clone_from(&self.metadata);
        spec.automation_condition = self.condition()?;
        Ok(spec)
    }
}

impl AssetConfig {
    pub fn to_definition(&self) -> Result<AssetsDefinition> {
        let spec = self.spec.to_spec()?;
        let deps = parse_deps(&self.spec.deps)?;
        let op = NodeDefinition::op(
            spec.key.to_node_name(),
            deps.iter().map(AssetKey::to_node_name).collect::<Vec<_>>(),
            ["result"],
        );

        let mut builder = AssetsDefinition::builder(op).output("result", spec);
        for dep in deps {
            builder = builder.input(dep.to_node_name(), dep);
        }
        for (parent, mapping) in &self.mappings {
            builder = builder.partition_mapping(parse_key("mapping parent", parent)?, mapping.clone());
        }
        if let Some(partitions) = &self.partitions {
            partitions.validate()?;
            builder = builder.partitions(partitions.clone());
        }
        if let Some(location) = &self.location {
            builder = builder.location(location.clone());
        }
        builder.build()
    }
}

impl MultiAssetConfig {
    pub fn to_definition(&self) -> Result<AssetsDefinition> {
        if self.outputs.is_empty() {
            return Err(AssetFlowError::ConfigError(format!(
                "multi_asset '{}' declares no outputs",
                self.name
            )));
        }

        let mut specs = Vec::new();
        let mut inputs = BTreeSet::new();
        for output in &self.outputs {
            let deps = parse_deps(&output.deps)?;
            inputs.extend(deps.iter().cloned());
            specs.push((output.to_spec()?, deps));
        }
        let checks: Vec<AssetCheckSpec> = self
            .checks
            .iter()
            .map(CheckConfig::to_spec)
            .collect::<Result<_>>()?;
        for check in &checks {
            inputs.extend(check.additional_deps.iter().cloned());
        }

        let output_names = specs
            .iter()
            .map(|(spec, _)| spec.key.to_node_name())
            .chain(checks.iter().map(check_output_name));
        let op = NodeDefinition::op(
            self.name.clone(),
            inputs.iter().map(AssetKey::to_node_name).collect::<Vec<_>>(),
            output_names.collect::<Vec<_>>(),
        );

        let mut builder = AssetsDefinition::builder(op).can_subset(self.can_subset);
        for dep in &inputs {
            builder = builder.input(dep.to_node_name(), dep.clone());
        }
        for (spec, deps) in specs {
            let key = spec.key.clone();
            builder = builder.output(key.to_node_name(), spec).internal_deps(key, deps);
        }
        for check in checks {
            builder = builder.check(check_output_name(&check), check);
        }
        for (parent, mapping) in &self.mappings {
            builder = builder.partition_mapping(parse_key("mapping parent", parent)?, mapping.clone());
        }
        if let Some(partitions) = &self.partitions {
            partitions.validate()?;
            builder = builder.partitions(partitions.clone());
        }
        if let Some(location) = &self.location {
            builder = builder.location(location.clone());
        }
        builder.build()
    }
}

fn check_output_name(check: &AssetCheckSpec) -> String {
    format!("{}__check__{}", check.asset_key.to_node_name(), check.name)
}

impl SourceConfig {
    pub fn to_source(&self) -> Result<SourceAsset> {
        let mut source = SourceAsset::new(parse_key("source key", &self.key)?);
        if self.observable {
            source = source.observable();
        }
        source.spec.group_name.clone_from(&self.group);
        source.spec.description.clone_from(&self.description);
        if let Some(partitions) = &self.partitions {
            partitions.validate()?;
        }
        source.partitions_def.clone_from(&self.partitions);
        source.location.clone_from(&self.location);
        Ok(source)
    }
}

impl CheckConfig {
    pub fn to_spec(&self) -> Result<AssetCheckSpec> {
        if self.name.is_empty() {
            return Err(AssetFlowError::ConfigError(format!(
                "check on '{}' has no name",
                self.asset
            )));
        }
        let mut spec = AssetCheckSpec::new(self.name.clone(), parse_key("check asset", &self.asset)?);
        spec.additional_deps = parse_deps(&self.deps)?.into_iter().collect();
        spec.blocking = self.blocking;
        Ok(spec)
    }
}

// =============================================================================
// TESTS
// =============================================================================
