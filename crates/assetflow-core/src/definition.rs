//! # Asset Definitions
//!
//! Independently authored inputs to graph construction:
//! - `AssetsDefinition`: one executable body producing one or more assets
//!   and checks
//! - `SourceAsset`: an externally produced asset, optionally observable
//! - `AssetChecksDefinition`: checks with their own body and no assets
//!
//! All three implement `AssetLike`, the capability set construction reads.
//! Normalization turns every input into an `AssetsDefinition`.

use crate::condition::Condition;
use crate::node_def::NodeDefinition;
use crate::partitions::{PartitionMapping, PartitionsDefinition};
use crate::primitives::{AUTO_CREATED_STUB_METADATA_KEY, DEFAULT_GROUP_NAME, DEFAULT_OUTPUT_NAME};
use crate::types::{AssetCheckKey, AssetFlowError, AssetKey, EntityKey, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SPECS
// =============================================================================

/// Declarative properties of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub key: AssetKey,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub code_version: Option<String>,
    #[serde(default)]
    pub automation_condition: Option<Condition>,
}

impl AssetSpec {
    #[must_use]
    pub fn new(key: impl Into<AssetKey>) -> Self {
        Self {
            key: key.into(),
            group_name: None,
            description: None,
            tags: BTreeMap::new(),
            owners: Vec::new(),
            metadata: BTreeMap::new(),
            code_version: None,
            automation_condition: None,
        }
    }

    #[must_use]
    pub fn group(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = Some(group_name.into());
        self
    }

    #[must_use]
    pub fn automation(mut self, condition: Condition) -> Self {
        self.automation_condition = Some(condition);
        self
    }

    #[must_use]
    pub fn code_version(mut self, version: impl Into<String>) -> Self {
        self.code_version = Some(version.into());
        self
    }
}

/// A data-quality check on `asset_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetCheckSpec {
    pub name: String,
    pub asset_key: AssetKey,
    #[serde(default)]
    pub additional_deps: Vec<AssetKey>,
    #[serde(default)]
    pub blocking: bool,
}

impl AssetCheckSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, asset_key: impl Into<AssetKey>) -> Self {
        Self {
            name: name.into(),
            asset_key: asset_key.into(),
            additional_deps: Vec::new(),
            blocking: false,
        }
    }

    #[must_use]
    pub fn key(&self) -> AssetCheckKey {
        AssetCheckKey::new(self.asset_key.clone(), self.name.clone())
    }
}

/// What running a definition's body does to its assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    Materialization,
    Observation,
    Unexecutable,
}

// =============================================================================
// CAPABILITY
// =============================================================================

/// Capabilities graph construction reads from any input definition.
pub trait AssetLike {
    /// Keys of the assets this definition produces.
    fn asset_keys(&self) -> BTreeSet<AssetKey>;
    /// Keys of the assets this definition reads.
    fn dependency_keys(&self) -> BTreeSet<AssetKey>;
    /// Checks this definition executes.
    fn check_specs(&self) -> Vec<AssetCheckSpec>;
    fn partitions_def(&self) -> Option<&PartitionsDefinition>;
    /// Whether a strict subset of the outputs may be executed.
    fn can_subset(&self) -> bool;
    fn has_executable_body(&self) -> bool;
    /// Normalize into an `AssetsDefinition`.
    fn into_assets_definition(self) -> Result<AssetsDefinition>;
}

// =============================================================================
// ASSETS DEFINITION
// =============================================================================

/// An executable body and the assets/checks bound to its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetsDefinition {
    node_def: Option<NodeDefinition>,
    keys_by_input_name: BTreeMap<String, AssetKey>,
    keys_by_output_name: BTreeMap<String, AssetKey>,
    specs_by_key: BTreeMap<AssetKey, AssetSpec>,
    check_specs_by_output_name: BTreeMap<String, AssetCheckSpec>,
    partitions_def: Option<PartitionsDefinition>,
    partition_mappings: BTreeMap<AssetKey, PartitionMapping>,
    internal_asset_deps: BTreeMap<AssetKey, BTreeSet<AssetKey>>,
    can_subset: bool,
    execution_type: ExecutionType,
    location: Option<String>,
}

impl AssetsDefinition {
    /// Start building a definition around `node_def`.
    #[must_use]
    pub fn builder(node_def: impl Into<NodeDefinition>) -> AssetsDefinitionBuilder {
        AssetsDefinitionBuilder::new(Some(node_def.into()))
    }

    /// Single-asset definition with a generated op reading `deps`.
    ///
    /// The op is named after the key; each dep gets an input named after
    /// the dep's key.
    pub fn single<I>(spec: AssetSpec, deps: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<AssetKey>,
    {
        let deps: Vec<AssetKey> = deps.into_iter().map(Into::into).collect();
        let inputs: Vec<String> = deps.iter().map(AssetKey::to_node_name).collect();
        let op = NodeDefinition::op(spec.key.to_node_name(), inputs, [DEFAULT_OUTPUT_NAME]);
        let mut builder = Self::builder(op).output(DEFAULT_OUTPUT_NAME, spec);
        for dep in deps {
            builder = builder.input(dep.to_node_name(), dep);
        }
        builder.build()
    }

    /// Unexecutable external definition synthesized for a dangling reference.
    #[must_use]
    pub fn stub(key: AssetKey) -> Self {
        let mut spec = AssetSpec::new(key.clone());
        spec.metadata.insert(
            AUTO_CREATED_STUB_METADATA_KEY.to_string(),
            "true".to_string(),
        );
        let mut specs_by_key = BTreeMap::new();
        specs_by_key.insert(key, spec);
        Self {
            node_def: None,
            keys_by_input_name: BTreeMap::new(),
            keys_by_output_name: BTreeMap::new(),
            specs_by_key,
            check_specs_by_output_name: BTreeMap::new(),
            partitions_def: None,
            partition_mappings: BTreeMap::new(),
            internal_asset_deps: BTreeMap::new(),
            can_subset: false,
            execution_type: ExecutionType::Unexecutable,
            location: None,
        }
    }

    #[must_use]
    pub fn node_def(&self) -> Option<&NodeDefinition> {
        self.node_def.as_ref()
    }

    #[must_use]
    pub fn keys_by_input_name(&self) -> &BTreeMap<String, AssetKey> {
        &self.keys_by_input_name
    }

    #[must_use]
    pub fn keys_by_output_name(&self) -> &BTreeMap<String, AssetKey> {
        &self.keys_by_output_name
    }

    #[must_use]
    pub fn check_specs_by_output_name(&self) -> &BTreeMap<String, AssetCheckSpec> {
        &self.check_specs_by_output_name
    }

    #[must_use]
    pub fn spec(&self, key: &AssetKey) -> Option<&AssetSpec> {
        self.specs_by_key.get(key)
    }

    #[must_use]
    pub fn check_keys(&self) -> BTreeSet<AssetCheckKey> {
        self.check_specs_by_output_name
            .values()
            .map(AssetCheckSpec::key)
            .collect()
    }

    /// Asset and check keys together.
    #[must_use]
    pub fn entity_keys(&self) -> BTreeSet<EntityKey> {
        self.specs_by_key
            .keys()
            .cloned()
            .map(EntityKey::Asset)
            .chain(self.check_keys().into_iter().map(EntityKey::Check))
            .collect()
    }

    /// Parents of `key`: its declared internal deps, or every input.
    #[must_use]
    pub fn dependency_keys_for(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        match self.internal_asset_deps.get(key) {
            Some(deps) => deps.clone(),
            None => self.keys_by_input_name.values().cloned().collect(),
        }
    }

    /// Partition mapping declared for the edge from `parent`.
    #[must_use]
    pub fn partition_mapping_for(&self, parent: &AssetKey) -> Option<&PartitionMapping> {
        self.partition_mappings.get(parent)
    }

    #[must_use]
    pub fn execution_type(&self) -> ExecutionType {
        self.execution_type
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    #[must_use]
    pub fn is_materializable(&self) -> bool {
        self.execution_type == ExecutionType::Materialization && self.node_def.is_some()
    }

    #[must_use]
    pub fn is_observable(&self) -> bool {
        self.execution_type == ExecutionType::Observation && self.node_def.is_some()
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.execution_type != ExecutionType::Unexecutable && self.node_def.is_some()
    }

    /// Group of `key`, or the default group.
    #[must_use]
    pub fn group_name(&self, key: &AssetKey) -> &str {
        self.spec(key)
            .and_then(|spec| spec.group_name.as_deref())
            .unwrap_or(DEFAULT_GROUP_NAME)
    }

    /// Sort key used for deterministic ordering and alias assignment.
    #[must_use]
    pub fn ordering_key(&self) -> (Vec<AssetKey>, Vec<AssetCheckKey>) {
        (
            self.specs_by_key.keys().cloned().collect(),
            self.check_keys().into_iter().collect(),
        )
    }

    /// Replace dependency references according to `replacements`.
    ///
    /// Input bindings, internal deps, check deps and partition mappings are rewritten.
    pub(crate) fn rewrite_dependencies(&mut self, replacements: &BTreeMap<AssetKey, AssetKey>) {
        if replacements.is_empty() {
            return;
        }
        let replace = |key: &AssetKey| replacements.get(key).unwrap_or(key).clone();
        for key in self.keys_by_input_name.values_mut() {
            *key = replace(key);
        }
        for deps in self.internal_asset_deps.values_mut() {
            *deps = deps.iter().map(replace).collect();
        }
        for spec in self.check_specs_by_output_name.values_mut() {
            for dep in &mut spec.additional_deps {
                *dep = replace(dep);
            }
        }
        self.partition_mappings = std::mem::take(&mut self.partition_mappings)
            .into_iter()
            .map(|(key, mapping)| (replace(&key), mapping))
            .collect();
    }
}

impl AssetLike for AssetsDefinition {
    fn asset_keys(&self) -> BTreeSet<AssetKey> {
        self.specs_by_key.keys().cloned().collect()
    }

    fn dependency_keys(&self) -> BTreeSet<AssetKey> {
        let mut deps: BTreeSet<AssetKey> = self.keys_by_input_name.values().cloned().collect();
        deps.extend(self.internal_asset_deps.values().flatten().cloned());
        deps
    }

    fn check_specs(&self) -> Vec<AssetCheckSpec> {
        self.check_specs_by_output_name.values().cloned().collect()
    }

    fn partitions_def(&self) -> Option<&PartitionsDefinition> {
        self.partitions_def.as_ref()
    }

    fn can_subset(&self) -> bool {
        self.can_subset
    }

    fn has_executable_body(&self) -> bool {
        self.is_executable()
    }

    fn into_assets_definition(self) -> Result<AssetsDefinition> {
        Ok(self)
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for `AssetsDefinition`; `build` validates the wiring.
#[derive(Debug, Clone)]
pub struct AssetsDefinitionBuilder {
    definition: AssetsDefinition,
    output_specs: Vec<(String, AssetSpec)>,
}

impl AssetsDefinitionBuilder {
    fn new(node_def: Option<NodeDefinition>) -> Self {
        Self {
            definition: AssetsDefinition {
                node_def,
                keys_by_input_name: BTreeMap::new(),
                keys_by_output_name: BTreeMap::new(),
                specs_by_key: BTreeMap::new(),
                check_specs_by_output_name: BTreeMap::new(),
                partitions_def: None,
                partition_mappings: BTreeMap::new(),
                internal_asset_deps: BTreeMap::new(),
                can_subset: false,
                execution_type: ExecutionType::Materialization,
                location: None,
            },
            output_specs: Vec::new(),
        }
    }

    /// Bind `spec` to the node output `output_name`.
    #[must_use]
    pub fn output(mut self, output_name: impl Into<String>, spec: AssetSpec) -> Self {
        self.output_specs.push((output_name.into(), spec));
        self
    }

    /// Bind the node input `input_name` to the asset `key`.
    #[must_use]
    pub fn input(mut self, input_name: impl Into<String>, key: impl Into<AssetKey>) -> Self {
        self.definition
            .keys_by_input_name
            .insert(input_name.into(), key.into());
        self
    }

    /// Bind a check to the node output `output_name`.
    #[must_use]
    pub fn check(mut self, output_name: impl Into<String>, spec: AssetCheckSpec) -> Self {
        self.definition
            .check_specs_by_output_name
            .insert(output_name.into(), spec);
        self
    }

    #[must_use]
    pub fn partitions(mut self, partitions_def: PartitionsDefinition) -> Self {
        self.definition.partitions_def = Some(partitions_def);
        self
    }

    #[must_use]
    pub fn partition_mapping(mut self, parent: impl Into<AssetKey>, mapping: PartitionMapping) -> Self {
        self.definition
            .partition_mappings
            .insert(parent.into(), mapping);
        self
    }

    /// Restrict the parents of `key` to `deps` instead of every input.
    #[must_use]
    pub fn internal_deps<I>(mut self, key: impl Into<AssetKey>, deps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<AssetKey>,
    {
        self.definition
            .internal_asset_deps
            .insert(key.into(), deps.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn can_subset(mut self, can_subset: bool) -> Self {
        self.definition.can_subset = can_subset;
        self
    }

    #[must_use]
    pub fn execution_type(mut self, execution_type: ExecutionType) -> Self {
        self.definition.execution_type = execution_type;
        self
    }

    /// Code location that hosts this definition.
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.definition.location = Some(location.into());
        self
    }

    pub fn build(self) -> Result<AssetsDefinition> {
        let mut definition = self.definition;
        let node_name = definition
            .node_def
            .as_ref()
            .map(|node| node.name().to_string())
            .unwrap_or_default();

        for (output_name, spec) in self.output_specs {
            if definition.specs_by_key.contains_key(&spec.key) {
                return Err(AssetFlowError::InvalidDefinition(format!(
                    "definition '{node_name}' binds asset {} twice",
                    spec.key
                )));
            }
            if definition
                .keys_by_output_name
                .insert(output_name.clone(), spec.key.clone())
                .is_some()
            {
                return Err(AssetFlowError::InvalidDefinition(format!(
                    "definition '{node_name}' binds output '{output_name}' twice"
                )));
            }
            definition.specs_by_key.insert(spec.key.clone(), spec);
        }

        if let Some(node) = &definition.node_def {
            let inputs = node.input_names();
            let outputs = node.output_names();
            if let Some(name) = definition
                .keys_by_input_name
                .keys()
                .find(|name| !inputs.contains(name.as_str()))
            {
                return Err(AssetFlowError::InvalidDefinition(format!(
                    "node '{node_name}' has no input '{name}'"
                )));
            }
            if let Some(name) = definition
                .keys_by_output_name
                .keys()
                .chain(definition.check_specs_by_output_name.keys())
                .find(|name| !outputs.contains(name.as_str()))
            {
                return Err(AssetFlowError::InvalidDefinition(format!(
                    "node '{node_name}' has no output '{name}'"
                )));
            }
            let check_outputs: BTreeSet<&String> =
                definition.check_specs_by_output_name.keys().collect();
            if let Some(name) = definition
                .keys_by_output_name
                .keys()
                .find(|name| check_outputs.contains(name))
            {
                return Err(AssetFlowError::InvalidDefinition(format!(
                    "output '{name}' of '{node_name}' is bound to both an asset and a check"
                )));
            }
        }

        if let Some(key) = definition
            .internal_asset_deps
            .keys()
            .find(|key| !definition.specs_by_key.contains_key(*key))
        {
            return Err(AssetFlowError::InvalidDefinition(format!(
                "internal deps declared for {key}, which '{node_name}' does not produce"
            )));
        }

        // Check deps must reach the node through an input or be produced by it.
        let bound: BTreeSet<&AssetKey> = definition
            .keys_by_input_name
            .values()
            .chain(definition.specs_by_key.keys())
            .collect();
        if let Some((output_name, dep)) = definition
            .check_specs_by_output_name
            .iter()
            .flat_map(|(output_name, spec)| {
                spec.additional_deps.iter().map(move |dep| (output_name, dep))
            })
            .find(|(_, dep)| !bound.contains(dep))
        {
            return Err(AssetFlowError::InvalidDefinition(format!(
                "check output '{output_name}' of '{node_name}' depends on {dep}, which is not an input"
            )));
        }

        if definition.specs_by_key.is_empty() && definition.check_specs_by_output_name.is_empty() {
            return Err(AssetFlowError::InvalidDefinition(format!(
                "definition '{node_name}' produces no assets or checks"
            )));
        }

        if let Some(partitions_def) = &definition.partitions_def {
            partitions_def.validate()?;
        }
        for spec in definition.specs_by_key.values() {
            if let Some(condition) = &spec.automation_condition {
                condition.validate()?;
            }
        }

        Ok(definition)
    }
}

// =============================================================================
// SOURCE ASSETS
// =============================================================================

/// An asset produced outside the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAsset {
    pub spec: AssetSpec,
    #[serde(default)]
    pub partitions_def: Option<PartitionsDefinition>,
    /// Observable sources carry an observation body.
    #[serde(default)]
    pub observable: bool,
    #[serde(default)]
    pub location: Option<String>,
}

impl SourceAsset {
    #[must_use]
    pub fn new(key: impl Into<AssetKey>) -> Self {
        Self {
            spec: AssetSpec::new(key),
            partitions_def: None,
            observable: false,
            location: None,
        }
    }

    #[must_use]
    pub fn observable(mut self) -> Self {
        self.observable = true;
        self
    }
}

impl AssetLike for SourceAsset {
    fn asset_keys(&self) -> BTreeSet<AssetKey> {
        BTreeSet::from([self.spec.key.clone()])
    }

    fn dependency_keys(&self) -> BTreeSet<AssetKey> {
        BTreeSet::new()
    }

    fn check_specs(&self) -> Vec<AssetCheckSpec> {
        Vec::new()
    }

    fn partitions_def(&self) -> Option<&PartitionsDefinition> {
        self.partitions_def.as_ref()
    }

    fn can_subset(&self) -> bool {
        false
    }

    fn has_executable_body(&self) -> bool {
        self.observable
    }

    fn into_assets_definition(self) -> Result<AssetsDefinition> {
        let node_def = self.observable.then(|| {
            NodeDefinition::op(
                format!("observe_{}", self.spec.key.to_node_name()),
                Vec::<String>::new(),
                [DEFAULT_OUTPUT_NAME],
            )
        });
        let execution_type = if self.observable {
            ExecutionType::Observation
        } else {
            ExecutionType::Unexecutable
        };
        let mut builder = AssetsDefinitionBuilder::new(node_def)
            .output(DEFAULT_OUTPUT_NAME, self.spec)
            .execution_type(execution_type);
        if let Some(partitions_def) = self.partitions_def {
            builder = builder.partitions(partitions_def);
        }
        if let Some(location) = self.location {
            builder = builder.location(location);
        }
        builder.build()
    }
}

// =============================================================================
// CHECK-ONLY DEFINITIONS
// =============================================================================

/// Checks executed by their own body, producing no assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetChecksDefinition {
    pub node_def: NodeDefinition,
    pub check_specs_by_output_name: BTreeMap<String, AssetCheckSpec>,
    pub keys_by_input_name: BTreeMap<String, AssetKey>,
}

impl AssetChecksDefinition {
    /// One check with a generated op reading the target and its extra deps.
    #[must_use]
    pub fn single(spec: AssetCheckSpec) -> Self {
        let mut keys_by_input_name = BTreeMap::new();
        keys_by_input_name.insert(spec.asset_key.to_node_name(), spec.asset_key.clone());
        for dep in &spec.additional_deps {
            keys_by_input_name.insert(dep.to_node_name(), dep.clone());
        }
        let node_def = NodeDefinition::op(
            format!("{}_{}", spec.asset_key.to_node_name(), spec.name),
            keys_by_input_name.keys().cloned().collect::<Vec<_>>(),
            [DEFAULT_OUTPUT_NAME],
        );
        let mut check_specs_by_output_name = BTreeMap::new();
        check_specs_by_output_name.insert(DEFAULT_OUTPUT_NAME.to_string(), spec);
        Self {
            node_def,
            check_specs_by_output_name,
            keys_by_input_name,
        }
    }
}

impl AssetLike for AssetChecksDefinition {
    fn asset_keys(&self) -> BTreeSet<AssetKey> {
        BTreeSet::new()
    }

    fn dependency_keys(&self) -> BTreeSet<AssetKey> {
        self.keys_by_input_name.values().cloned().collect()
    }

    fn check_specs(&self) -> Vec<AssetCheckSpec> {
        self.check_specs_by_output_name.values().cloned().collect()
    }

    fn partitions_def(&self) -> Option<&PartitionsDefinition> {
        None
    }

    fn can_subset(&self) -> bool {
        false
    }

    fn has_executable_body(&self) -> bool {
        true
    }

    fn into_assets_definition(self) -> Result<AssetsDefinition> {
        let mut builder = AssetsDefinitionBuilder::new(Some(self.node_def));
        for (input_name, key) in self.keys_by_input_name {
            builder = builder.input(input_name, key);
        }
        for (output_name, spec) in self.check_specs_by_output_name {
            builder = builder.check(output_name, spec);
        }
        builder.build()
    }
}

// =============================================================================
// HETEROGENEOUS INPUT
// =============================================================================

/// Any definition accepted by graph construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetInput {
    Assets(AssetsDefinition),
    Source(SourceAsset),
    Checks(AssetChecksDefinition),
}

impl From<AssetsDefinition> for AssetInput {
    fn from(definition: AssetsDefinition) -> Self {
        Self::Assets(definition)
    }
}

impl From<SourceAsset> for AssetInput {
    fn from(source: SourceAsset) -> Self {
        Self::Source(source)
    }
}

impl From<AssetChecksDefinition> for AssetInput {
    fn from(checks: AssetChecksDefinition) -> Self {
        Self::Checks(checks)
    }
}

impl AssetLike for AssetInput {
    fn asset_keys(&self) -> BTreeSet<AssetKey> {
        match self {
            Self::Assets(d) => d.asset_keys(),
            Self::Source(s) => s.asset_keys(),
            Self::Checks(c) => c.asset_keys(),
        }
    }

    fn dependency_keys(&self) -> BTreeSet<AssetKey> {
        match self {
            Self::Assets(d) => d.dependency_keys(),
            Self::Source(s) => s.dependency_keys(),
            Self::Checks(c) => c.dependency_keys(),
        }
    }

    fn check_specs(&self) -> Vec<AssetCheckSpec> {
        match self {
            Self::Assets(d) => d.check_specs(),
            Self::Source(s) => s.check_specs(),
            Self::Checks(c) => c.check_specs(),
        }
    }

    fn partitions_def(&self) -> Option<&PartitionsDefinition> {
        match self {
            Self::Assets(d) => d.partitions_def(),
            Self::Source(s) => s.partitions_def(),
            Self::Checks(c) => c.partitions_def(),
        }
    }

    fn can_subset(&self) -> bool {
        match self {
            Self::Assets(d) => d.can_subset(),
            Self::Source(s) => s.can_subset(),
            Self::Checks(c) => c.can_subset(),
        }
    }

    fn has_executable_body(&self) -> bool {
        match self {
            Self::Assets(d) => d.has_executable_body(),
            Self::Source(s) => s.has_executable_body(),
            Self::Checks(c) => c.has_executable_body(),
        }
    }

    fn into_assets_definition(self) -> Result<AssetsDefinition> {
        match self {
            Self::Assets(d) => d.into_assets_definition(),
            Self::Source(s) => s.into_assets_definition(),
            Self::Checks(c) => c.into_assets_definition(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
