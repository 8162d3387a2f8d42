//! # Asset Graph
//!
//! The immutable dependency graph built from a set of definitions.
//!
//! ## Layout
//!
//! - `AssetNode`: key, parent/child key sets, shared owning definition
//! - `AssetGraph`: flat node table plus every lookup index, all computed
//!   once during construction (see `build`)
//!
//! Adjacency holds keys only; nodes never reference each other directly.
//! The graph is `Send + Sync` and read concurrently by tick evaluation.

mod build;
mod execution_set;
mod same_run;

pub use same_run::materializable_in_same_run;

use crate::condition::Condition;
use crate::definition::{AssetLike, AssetsDefinition};
use crate::partitions::{
    EdgePartitions, PartitionMapping, PartitionUniverse, PartitionsDefinition,
    infer_partition_mapping,
};
use crate::primitives::AUTO_CREATED_STUB_METADATA_KEY;
use crate::types::{
    AssetCheckKey, AssetFlowError, AssetKey, EntityKey, NodeInputHandle, NodeOutputHandle, Result,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// ASSET NODE
// =============================================================================

/// One asset in the graph.
///
/// Declarative properties are read through the owning definition.
#[derive(Debug, Clone)]
pub struct AssetNode {
    key: AssetKey,
    parent_keys: BTreeSet<AssetKey>,
    child_keys: BTreeSet<AssetKey>,
    definition: Arc<AssetsDefinition>,
    check_keys: BTreeSet<AssetCheckKey>,
}

impl AssetNode {
    #[must_use]
    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    /// Keys this asset reads. May contain the node's own key.
    #[must_use]
    pub fn parent_keys(&self) -> &BTreeSet<AssetKey> {
        &self.parent_keys
    }

    /// Keys that read this asset. May contain the node's own key.
    #[must_use]
    pub fn child_keys(&self) -> &BTreeSet<AssetKey> {
        &self.child_keys
    }

    /// Parents other than the node itself.
    pub fn parents_excluding_self(&self) -> impl Iterator<Item = &AssetKey> {
        self.parent_keys.iter().filter(move |key| **key != self.key)
    }

    #[must_use]
    pub fn definition(&self) -> &Arc<AssetsDefinition> {
        &self.definition
    }

    /// Checks targeting this asset.
    #[must_use]
    pub fn check_keys(&self) -> &BTreeSet<AssetCheckKey> {
        &self.check_keys
    }

    #[must_use]
    pub fn partitions_def(&self) -> Option<&PartitionsDefinition> {
        self.definition.partitions_def()
    }

    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        self.partitions_def().is_some()
    }

    #[must_use]
    pub fn is_materializable(&self) -> bool {
        self.definition.is_materializable()
    }

    #[must_use]
    pub fn is_observable(&self) -> bool {
        self.definition.is_observable()
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.definition.is_executable()
    }

    /// Produced outside the graph (not materializable here).
    #[must_use]
    pub fn is_external(&self) -> bool {
        !self.is_materializable()
    }

    /// Synthesized for a dangling dependency reference.
    #[must_use]
    pub fn is_auto_created_stub(&self) -> bool {
        self.metadata()
            .and_then(|metadata| metadata.get(AUTO_CREATED_STUB_METADATA_KEY))
            .is_some_and(|value| value == "true")
    }

    #[must_use]
    pub fn group_name(&self) -> &str {
        self.definition.group_name(&self.key)
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.definition
            .spec(&self.key)
            .and_then(|spec| spec.description.as_deref())
    }

    #[must_use]
    pub fn tags(&self) -> Option<&BTreeMap<String, String>> {
        self.definition.spec(&self.key).map(|spec| &spec.tags)
    }

    #[must_use]
    pub fn owners(&self) -> &[String] {
        self.definition
            .spec(&self.key)
            .map(|spec| spec.owners.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn metadata(&self) -> Option<&BTreeMap<String, String>> {
        self.definition.spec(&self.key).map(|spec| &spec.metadata)
    }

    #[must_use]
    pub fn code_version(&self) -> Option<&str> {
        self.definition
            .spec(&self.key)
            .and_then(|spec| spec.code_version.as_deref())
    }

    #[must_use]
    pub fn automation_condition(&self) -> Option<&Condition> {
        self.definition
            .spec(&self.key)
            .and_then(|spec| spec.automation_condition.as_ref())
    }

    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.definition.location()
    }

    /// Every partition of this asset at `now`.
    pub fn universe(&self, now: DateTime<Utc>) -> Result<PartitionUniverse> {
        PartitionUniverse::for_definition(self.partitions_def(), now)
    }
}

// =============================================================================
// ASSET GRAPH
// =============================================================================

/// Immutable asset dependency graph with its lookup indices.
#[derive(Debug, Clone, Default)]
pub struct AssetGraph {
    nodes: BTreeMap<AssetKey, AssetNode>,
    definitions: Vec<Arc<AssetsDefinition>>,
    definitions_by_check_key: BTreeMap<AssetCheckKey, Arc<AssetsDefinition>>,
    definitions_by_alias: BTreeMap<String, Arc<AssetsDefinition>>,
    asset_keys_by_output_handle: BTreeMap<NodeOutputHandle, AssetKey>,
    check_keys_by_output_handle: BTreeMap<NodeOutputHandle, AssetCheckKey>,
    output_handles_by_check_key: BTreeMap<AssetCheckKey, NodeOutputHandle>,
    asset_keys_by_input_handle: BTreeMap<NodeInputHandle, AssetKey>,
    dependents_by_op_output: BTreeMap<NodeOutputHandle, BTreeSet<EntityKey>>,
    asset_check_keys: BTreeSet<AssetCheckKey>,
    topological_levels: Vec<Vec<AssetKey>>,
    locality_aware: bool,
}

impl AssetGraph {
    /// Node for `key`.
    #[must_use]
    pub fn get(&self, key: &AssetKey) -> Option<&AssetNode> {
        self.nodes.get(key)
    }

    /// Node for `key`, or `AssetNotFound`.
    pub fn node(&self, key: &AssetKey) -> Result<&AssetNode> {
        self.nodes
            .get(key)
            .ok_or_else(|| AssetFlowError::AssetNotFound(key.clone()))
    }

    #[must_use]
    pub fn contains(&self, key: &AssetKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// All nodes in key order.
    pub fn nodes(&self) -> impl Iterator<Item = &AssetNode> {
        self.nodes.values()
    }

    pub fn asset_keys(&self) -> impl Iterator<Item = &AssetKey> {
        self.nodes.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deduplicated definitions in deterministic order. Includes stubs.
    #[must_use]
    pub fn definitions(&self) -> &[Arc<AssetsDefinition>] {
        &self.definitions
    }

    /// Every check key in the graph.
    #[must_use]
    pub fn asset_check_keys(&self) -> &BTreeSet<AssetCheckKey> {
        &self.asset_check_keys
    }

    /// Definition executing `check_key`.
    pub fn check_definition(&self, check_key: &AssetCheckKey) -> Result<&Arc<AssetsDefinition>> {
        self.definitions_by_check_key
            .get(check_key)
            .ok_or_else(|| AssetFlowError::CheckNotFound(check_key.clone()))
    }

    /// Definition invoked under the top-level node alias `alias`.
    #[must_use]
    pub fn definition_for_alias(&self, alias: &str) -> Option<&Arc<AssetsDefinition>> {
        self.definitions_by_alias.get(alias)
    }

    /// Top-level node aliases in order.
    pub fn node_aliases(&self) -> impl Iterator<Item = &str> {
        self.definitions_by_alias.keys().map(String::as_str)
    }

    /// Asset produced at `handle` (outer or leaf level).
    pub fn get_for_node_output(&self, handle: &NodeOutputHandle) -> Result<&AssetNode> {
        let key = self
            .asset_keys_by_output_handle
            .get(handle)
            .ok_or_else(|| AssetFlowError::OutputHandleNotFound(handle.clone()))?;
        self.node(key)
    }

    /// Check produced at `handle` (outer or leaf level).
    #[must_use]
    pub fn check_key_for_node_output(&self, handle: &NodeOutputHandle) -> Option<&AssetCheckKey> {
        self.check_keys_by_output_handle.get(handle)
    }

    /// Leaf output that produces `check_key`.
    #[must_use]
    pub fn node_output_handle_for_check(&self, check_key: &AssetCheckKey) -> Option<&NodeOutputHandle> {
        self.output_handles_by_check_key.get(check_key)
    }

    /// Asset whose data arrives at `handle` (outer or leaf level).
    #[must_use]
    pub fn asset_key_for_node_input(&self, handle: &NodeInputHandle) -> Option<&AssetKey> {
        self.asset_keys_by_input_handle.get(handle)
    }

    /// Assets and checks that require the leaf op output `handle`.
    #[must_use]
    pub fn dependents_of_op_output(&self, handle: &NodeOutputHandle) -> Option<&BTreeSet<EntityKey>> {
        self.dependents_by_op_output.get(handle)
    }

    /// Topological wavefronts: every parent of a key sits in an earlier level.
    /// Self-edges are ignored.
    #[must_use]
    pub fn topological_levels(&self) -> &[Vec<AssetKey>] {
        &self.topological_levels
    }

    /// Whether any definition declares a code location.
    #[must_use]
    pub fn is_locality_aware(&self) -> bool {
        self.locality_aware
    }

    /// Partition mapping for the edge `parent -> child`: declared, or inferred.
    pub fn partition_mapping(&self, child: &AssetKey, parent: &AssetKey) -> Result<PartitionMapping> {
        let child_node = self.node(child)?;
        let parent_node = self.node(parent)?;
        Ok(child_node
            .definition
            .partition_mapping_for(parent)
            .cloned()
            .unwrap_or_else(|| {
                infer_partition_mapping(child_node.partitions_def(), parent_node.partitions_def())
            }))
    }

    /// Partition context of the edge `parent -> child`.
    pub fn edge_partitions<'a>(
        &'a self,
        child: &AssetKey,
        child_universe: &'a PartitionUniverse,
        parent: &AssetKey,
        parent_universe: &'a PartitionUniverse,
    ) -> Result<EdgePartitions<'a>> {
        Ok(EdgePartitions {
            child_def: self.node(child)?.partitions_def(),
            child_universe,
            parent_def: self.node(parent)?.partitions_def(),
            parent_universe,
        })
    }

    /// Every key upstream of `key` (excluding `key`).
    pub fn upstream_keys(&self, key: &AssetKey) -> Result<BTreeSet<AssetKey>> {
        self.closure(key, |node| node.parent_keys())
    }

    /// Every key downstream of `key` (excluding `key`).
    pub fn downstream_keys(&self, key: &AssetKey) -> Result<BTreeSet<AssetKey>> {
        self.closure(key, |node| node.child_keys())
    }

    fn closure<F>(&self, start: &AssetKey, next: F) -> Result<BTreeSet<AssetKey>>
    where
        F: Fn(&AssetNode) -> &BTreeSet<AssetKey>,
    {
        let mut seen = BTreeSet::new();
        let mut worklist = vec![self.node(start)?];
        while let Some(node) = worklist.pop() {
            for key in next(node) {
                if key != start && seen.insert(key.clone()) {
                    worklist.push(self.node(key)?);
                }
            }
        }
        Ok(seen)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{AssetSpec, SourceAsset};

    fn chain() -> AssetGraph {
        AssetGraph::from_assets([
            AssetsDefinition::single(AssetSpec::new("a"), Vec::<AssetKey>::new()).expect("a"),
            AssetsDefinition::single(AssetSpec::new("b").group("mart"), ["a"]).expect("b"),
            AssetsDefinition::single(AssetSpec::new("c"), ["b"]).expect("c"),
        ])
        .expect("graph")
    }

    #[test]
    fn node_properties_read_through_definition() {
        let graph = chain();
        let b = graph.node(&AssetKey::from("b")).expect("b");
        assert_eq!(b.group_name(), "mart");
        assert!(b.is_materializable());
        assert!(!b.is_external());
        assert!(!b.is_auto_created_stub());
        assert_eq!(
            graph.node(&AssetKey::from("a")).expect("a").group_name(),
            "default"
        );
    }

    #[test]
    fn upstream_and_downstream_closures() {
        let graph = chain();
        let upstream = graph.upstream_keys(&AssetKey::from("c")).expect("upstream");
        assert_eq!(
            upstream,
            BTreeSet::from([AssetKey::from("a"), AssetKey::from("b")])
        );
        let downstream = graph.downstream_keys(&AssetKey::from("a")).expect("downstream");
        assert_eq!(downstream.len(), 2);
    }

    #[test]
    fn missing_key_lookup_is_error() {
        let graph = chain();
        assert!(matches!(
            graph.node(&AssetKey::from("zzz")),
            Err(AssetFlowError::AssetNotFound(_))
        ));
        assert!(graph.get(&AssetKey::from("zzz")).is_none());
    }

    #[test]
    fn mapping_is_inferred_when_undeclared() {
        let graph = chain();
        let mapping = graph
            .partition_mapping(&AssetKey::from("b"), &AssetKey::from("a"))
            .expect("mapping");
        assert_eq!(mapping, PartitionMapping::Identity);
    }

    #[test]
    fn source_assets_are_external() {
        let graph = AssetGraph::from_assets([
            crate::definition::AssetInput::from(SourceAsset::new("raw")),
            AssetsDefinition::single(AssetSpec::new("clean"), ["raw"])
                .expect("clean")
                .into(),
        ])
        .expect("graph");
        let raw = graph.node(&AssetKey::from("raw")).expect("raw");
        assert!(raw.is_external());
        assert!(!raw.is_auto_created_stub());
    }
}
