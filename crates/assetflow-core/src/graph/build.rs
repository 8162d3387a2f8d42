//! # Graph Construction
//!
//! `AssetGraph::from_assets` turns heterogeneous definitions into the
//! immutable graph. Phases run in a fixed order:
//!
//! 1. duplicate detection
//! 2. normalization and relative dependency resolution
//! 3. stub synthesis for dangling references
//! 4. deterministic ordering
//! 5. adjacency and check binding
//! 6. node alias assignment and execution-node flattening
//! 7. topological levels
//!
//! The result is identical for any permutation of the input.

use super::{AssetGraph, AssetNode};
use crate::definition::{AssetInput, AssetLike, AssetsDefinition};
use crate::node_def::{
    LeafGraph, resolve_input_to_destinations, resolve_output_to_destinations,
    resolve_output_to_origin,
};
use crate::resolution::resolve_definition_dependencies;
use crate::types::{
    AssetCheckKey, AssetFlowError, AssetKey, EntityKey, NodeHandle, NodeInputHandle,
    NodeOutputHandle, Result,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Handle indices contributed by one flattened definition.
#[derive(Default)]
struct FlattenedHandles {
    asset_outputs: Vec<(NodeOutputHandle, AssetKey)>,
    check_outputs: Vec<(NodeOutputHandle, AssetCheckKey)>,
    check_origins: Vec<(AssetCheckKey, NodeOutputHandle)>,
    inputs: Vec<(NodeInputHandle, AssetKey)>,
    dependents: BTreeMap<NodeOutputHandle, BTreeSet<EntityKey>>,
}

impl AssetGraph {
    /// Build a graph from any mix of definitions.
    ///
    /// # Errors
    ///
    /// - `InvalidDefinition` when a key is produced twice
    /// - `AmbiguousDependency` when a relative reference matches several keys
    /// - `FlatteningFailed` naming every malformed definition (by alias)
    /// - `CycleDetected` when distinct assets depend on each other
    pub fn from_assets<I, A>(inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<AssetInput>,
    {
        let inputs: Vec<AssetInput> = inputs.into_iter().map(Into::into).collect();
        check_duplicates(&inputs)?;

        let mut definitions = inputs
            .into_iter()
            .map(AssetLike::into_assets_definition)
            .collect::<Result<Vec<_>>>()?;

        let defined: BTreeSet<AssetKey> = definitions
            .iter()
            .flat_map(AssetLike::asset_keys)
            .collect();
        for definition in &mut definitions {
            resolve_definition_dependencies(definition, &defined)?;
        }

        let mut referenced: BTreeSet<AssetKey> = BTreeSet::new();
        for definition in &definitions {
            referenced.extend(definition.dependency_keys());
            referenced.extend(definition.check_specs().into_iter().map(|spec| spec.asset_key));
        }
        let stubs: Vec<AssetsDefinition> = referenced
            .difference(&defined)
            .cloned()
            .map(AssetsDefinition::stub)
            .collect();
        if !stubs.is_empty() {
            tracing::debug!(count = stubs.len(), "synthesized stub assets");
        }
        definitions.extend(stubs);
        definitions.sort_by_cached_key(AssetsDefinition::ordering_key);

        let definitions: Vec<Arc<AssetsDefinition>> =
            definitions.into_iter().map(Arc::new).collect();

        let mut graph = Self {
            locality_aware: definitions.iter().any(|d| d.location().is_some()),
            ..Self::default()
        };
        graph.build_adjacency(&definitions);
        graph.bind_checks(&definitions);
        graph.flatten_definitions(&definitions)?;
        graph.definitions = definitions;
        graph.topological_levels = topological_levels(&graph.nodes)?;

        tracing::debug!(
            assets = graph.nodes.len(),
            checks = graph.asset_check_keys.len(),
            levels = graph.topological_levels.len(),
            "asset graph built"
        );
        Ok(graph)
    }

    fn build_adjacency(&mut self, definitions: &[Arc<AssetsDefinition>]) {
        let mut parents: BTreeMap<AssetKey, BTreeSet<AssetKey>> = BTreeMap::new();
        let mut owners: BTreeMap<AssetKey, &Arc<AssetsDefinition>> = BTreeMap::new();
        for definition in definitions {
            for key in definition.asset_keys() {
                parents.insert(key.clone(), definition.dependency_keys_for(&key));
                owners.insert(key, definition);
            }
        }

        let mut children: BTreeMap<AssetKey, BTreeSet<AssetKey>> = BTreeMap::new();
        for (child, parent_keys) in &parents {
            for parent in parent_keys {
                children
                    .entry(parent.clone())
                    .or_default()
                    .insert(child.clone());
            }
        }

        for (key, parent_keys) in parents {
            let Some(definition) = owners.get(&key) else {
                continue;
            };
            let node = AssetNode {
                child_keys: children.remove(&key).unwrap_or_default(),
                parent_keys,
                definition: Arc::clone(definition),
                check_keys: BTreeSet::new(),
                key: key.clone(),
            };
            self.nodes.insert(key, node);
        }
    }

    fn bind_checks(&mut self, definitions: &[Arc<AssetsDefinition>]) {
        for definition in definitions {
            for check_key in definition.check_keys() {
                if let Some(node) = self.nodes.get_mut(&check_key.asset_key) {
                    node.check_keys.insert(check_key.clone());
                }
                self.definitions_by_check_key
                    .insert(check_key.clone(), Arc::clone(definition));
                self.asset_check_keys.insert(check_key);
            }
        }
    }

    fn flatten_definitions(&mut self, definitions: &[Arc<AssetsDefinition>]) -> Result<()> {
        let mut name_counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut failures: BTreeMap<String, AssetFlowError> = BTreeMap::new();

        for definition in definitions {
            let Some(node_def) = definition.node_def() else {
                continue;
            };
            let count = name_counts.entry(node_def.name()).or_default();
            *count += 1;
            let alias = if *count == 1 {
                node_def.name().to_string()
            } else {
                format!("{}_{count}", node_def.name())
            };

            match flatten(&alias, definition) {
                Ok(handles) => self.absorb(handles),
                Err(error) => {
                    failures.insert(alias.clone(), error);
                }
            }
            self.definitions_by_alias
                .insert(alias, Arc::clone(definition));
        }

        for (alias, error) in &failures {
            tracing::warn!(alias = %alias, error = %error, "definition failed to flatten");
        }
        if failures.len() <= 1 {
            return failures.into_values().next().map_or(Ok(()), Err);
        }
        let aliases: Vec<&str> = failures.keys().map(String::as_str).collect();
        let reasons: Vec<String> = failures
            .iter()
            .map(|(alias, error)| match error {
                AssetFlowError::FlatteningFailed { reason, .. } => format!("{alias}: {reason}"),
                other => format!("{alias}: {other}"),
            })
            .collect();
        Err(AssetFlowError::FlatteningFailed {
            definition: aliases.join(", "),
            reason: reasons.join("; "),
        })
    }

    fn absorb(&mut self, handles: FlattenedHandles) {
        self.asset_keys_by_output_handle.extend(handles.asset_outputs);
        self.check_keys_by_output_handle.extend(handles.check_outputs);
        self.output_handles_by_check_key.extend(handles.check_origins);
        self.asset_keys_by_input_handle.extend(handles.inputs);
        for (handle, keys) in handles.dependents {
            self.dependents_by_op_output
                .entry(handle)
                .or_default()
                .extend(keys);
        }
    }
}

fn check_duplicates(inputs: &[AssetInput]) -> Result<()> {
    let mut seen_assets = BTreeSet::new();
    let mut seen_checks = BTreeSet::new();
    for input in inputs {
        for key in input.asset_keys() {
            if !seen_assets.insert(key.clone()) {
                return Err(AssetFlowError::InvalidDefinition(format!(
                    "asset {key} is produced by more than one definition"
                )));
            }
        }
        for spec in input.check_specs() {
            let key = spec.key();
            if !seen_checks.insert(key.clone()) {
                return Err(AssetFlowError::InvalidDefinition(format!(
                    "check {key} is produced by more than one definition"
                )));
            }
        }
    }
    Ok(())
}

/// Resolve every outer handle of `definition`, invoked as `alias`, to leaf level.
fn flatten(alias: &str, definition: &AssetsDefinition) -> Result<FlattenedHandles> {
    let mut handles = FlattenedHandles::default();
    let Some(node_def) = definition.node_def() else {
        return Ok(handles);
    };
    let root = NodeHandle::root(alias);
    let mut direct: BTreeMap<NodeOutputHandle, BTreeSet<EntityKey>> = BTreeMap::new();

    for (output_name, key) in definition.keys_by_output_name() {
        let outer = NodeOutputHandle::new(root.clone(), output_name.clone());
        let origin = resolve_output_to_origin(&outer, node_def)?;
        for input in resolve_output_to_destinations(&outer, node_def)? {
            handles.inputs.push((input, key.clone()));
        }
        direct
            .entry(origin.clone())
            .or_default()
            .insert(EntityKey::Asset(key.clone()));
        handles.asset_outputs.push((outer, key.clone()));
        handles.asset_outputs.push((origin, key.clone()));
    }

    for (output_name, spec) in definition.check_specs_by_output_name() {
        let check_key = spec.key();
        let outer = NodeOutputHandle::new(root.clone(), output_name.clone());
        let origin = resolve_output_to_origin(&outer, node_def)?;
        direct
            .entry(origin.clone())
            .or_default()
            .insert(EntityKey::Check(check_key.clone()));
        handles.check_outputs.push((outer, check_key.clone()));
        handles.check_outputs.push((origin.clone(), check_key.clone()));
        handles.check_origins.push((check_key, origin));
    }

    for (input_name, key) in definition.keys_by_input_name() {
        let outer = NodeInputHandle::new(root.clone(), input_name.clone());
        for destination in resolve_input_to_destinations(&outer, node_def)? {
            handles.inputs.push((destination, key.clone()));
        }
        handles.inputs.push((outer, key.clone()));
    }

    let leaf = LeafGraph::build(&root, node_def)?;
    handles.dependents = leaf.propagate_dependents(&root, &direct)?;
    Ok(handles)
}

/// Kahn wavefronts over parent edges, ignoring self-edges.
fn topological_levels(nodes: &BTreeMap<AssetKey, AssetNode>) -> Result<Vec<Vec<AssetKey>>> {
    let mut in_degree: BTreeMap<&AssetKey, usize> = nodes
        .iter()
        .map(|(key, node)| (key, node.parents_excluding_self().count()))
        .collect();

    let mut levels = Vec::new();
    let mut current: Vec<&AssetKey> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(key, _)| *key)
        .collect();

    let mut placed = 0usize;
    while !current.is_empty() {
        let mut next = BTreeSet::new();
        for key in &current {
            let Some(node) = nodes.get(*key) else {
                continue;
            };
            for child in node.child_keys().iter().filter(|child| *child != *key) {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        next.insert(child);
                    }
                }
            }
        }
        placed += current.len();
        levels.push(current.iter().map(|key| (*key).clone()).collect());
        current = next.into_iter().collect();
    }

    if placed != nodes.len() {
        let mut cycle: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(key, _)| key.to_user_string())
            .collect();
        cycle.sort();
        return Err(AssetFlowError::CycleDetected(cycle));
    }
    Ok(levels)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::definition::{AssetCheckSpec, AssetChecksDefinition, AssetSpec, SourceAsset};
    use crate::node_def::{GraphDefinition, NodeDefinition};
    use crate::primitives::AUTO_CREATED_STUB_METADATA_KEY;

    fn single(key: &str, deps: &[&str]) -> AssetInput {
        AssetsDefinition::single(AssetSpec::new(key), deps.iter().copied())
            .expect("definition")
            .into()
    }

    #[test]
    fn dangling_reference_becomes_stub() {
        let graph = AssetGraph::from_assets([single("b", &["ghost"])]).expect("graph");
        let ghost = graph.node(&AssetKey::from("ghost")).expect("stub");
        assert!(ghost.is_auto_created_stub());
        assert!(!ghost.is_executable());
        assert_eq!(
            ghost.metadata().and_then(|m| m.get(AUTO_CREATED_STUB_METADATA_KEY)),
            Some(&"true".to_string())
        );
        assert!(ghost.child_keys().contains(&AssetKey::from("b")));
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let result = AssetGraph::from_assets([
            single("a", &[]),
            AssetInput::from(SourceAsset::new("a")),
        ]);
        assert!(matches!(result, Err(AssetFlowError::InvalidDefinition(_))));
    }

    #[test]
    fn cycle_between_distinct_assets_is_rejected() {
        let result = AssetGraph::from_assets([single("a", &["b"]), single("b", &["a"])]);
        match result {
            Err(AssetFlowError::CycleDetected(keys)) => {
                assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_allowed() {
        let graph = AssetGraph::from_assets([single("a", &["a"])]).expect("graph");
        let node = graph.node(&AssetKey::from("a")).expect("a");
        assert!(node.parent_keys().contains(&AssetKey::from("a")));
        assert_eq!(node.parents_excluding_self().count(), 0);
        assert_eq!(graph.topological_levels().len(), 1);
    }

    #[test]
    fn colliding_node_names_get_suffixes_in_key_order() {
        let op = || NodeDefinition::op("compute", Vec::<String>::new(), ["result"]);
        let build = |key: &str| -> AssetInput {
            AssetsDefinition::builder(op())
                .output("result", AssetSpec::new(key))
                .build()
                .expect("definition")
                .into()
        };
        let graph =
            AssetGraph::from_assets([build("zeta"), build("alpha"), build("mid")]).expect("graph");
        let alias_of = |key: &str| {
            graph
                .node_aliases()
                .find(|alias| {
                    graph
                        .definition_for_alias(alias)
                        .is_some_and(|d| d.asset_keys().contains(&AssetKey::from(key)))
                })
                .map(str::to_string)
        };
        assert_eq!(alias_of("alpha").as_deref(), Some("compute"));
        assert_eq!(alias_of("mid").as_deref(), Some("compute_2"));
        assert_eq!(alias_of("zeta").as_deref(), Some("compute_3"));

        let handle = NodeOutputHandle::new(NodeHandle::root("compute_3"), "result");
        assert_eq!(
            graph.get_for_node_output(&handle).expect("node").key(),
            &AssetKey::from("zeta")
        );
    }

    #[test]
    fn nested_graph_handles_resolve_to_leaves() {
        let inner = GraphDefinition::new("inner")
            .node("agg", NodeDefinition::op("agg", ["rows"], ["total"]))
            .map_input("rows", "agg", "rows")
            .map_output("summary", "agg", "total");
        let outer = GraphDefinition::new("pipeline")
            .node("clean", NodeDefinition::op("clean", ["raw"], ["out"]))
            .node("inner", inner)
            .edge("clean", "out", "inner", "rows")
            .map_input("raw", "clean", "raw")
            .map_output("cleaned", "clean", "out")
            .map_output("summary", "inner", "summary");
        let definition = AssetsDefinition::builder(outer)
            .output("cleaned", AssetSpec::new("cleaned"))
            .output("summary", AssetSpec::new("summary"))
            .input("raw", "raw")
            .build()
            .expect("definition");
        let graph = AssetGraph::from_assets([definition]).expect("graph");

        let root = NodeHandle::root("pipeline");
        let leaf_total = NodeOutputHandle::new(root.child("inner").child("agg"), "total");
        assert_eq!(
            graph.get_for_node_output(&leaf_total).expect("node").key(),
            &AssetKey::from("summary")
        );

        let leaf_raw = NodeInputHandle::new(root.child("clean"), "raw");
        assert_eq!(
            graph.asset_key_for_node_input(&leaf_raw),
            Some(&AssetKey::from("raw"))
        );
        let leaf_rows = NodeInputHandle::new(root.child("inner").child("agg"), "rows");
        assert_eq!(
            graph.asset_key_for_node_input(&leaf_rows),
            Some(&AssetKey::from("cleaned"))
        );

        let clean_out = NodeOutputHandle::new(root.child("clean"), "out");
        let dependents = graph.dependents_of_op_output(&clean_out).expect("dependents");
        assert!(dependents.contains(&EntityKey::Asset(AssetKey::from("cleaned"))));
        assert!(dependents.contains(&EntityKey::Asset(AssetKey::from("summary"))));
    }

    #[test]
    fn malformed_wiring_reports_alias() {
        let broken = GraphDefinition::new("broken")
            .node("step", NodeDefinition::op("step", Vec::<String>::new(), ["out"]))
            .map_output("other", "step", "out");
        let definition = AssetsDefinition::builder(
            GraphDefinition::new("broken")
                .node("step", NodeDefinition::op("step", Vec::<String>::new(), ["out"]))
                .map_output("x", "step", "out")
                .map_output("y", "step", "missing"),
        )
        .output("x", AssetSpec::new("x"))
        .output("y", AssetSpec::new("y"))
        .build()
        .expect("definition");
        let result = AssetGraph::from_assets([
            AssetInput::from(definition),
            AssetsDefinition::builder(broken)
                .output("other", AssetSpec::new("fine"))
                .build()
                .expect("definition")
                .into(),
        ]);
        match result {
            Err(AssetFlowError::FlatteningFailed { definition, .. }) => {
                assert_eq!(definition, "broken_2");
            }
            other => panic!("expected flattening failure, got {other:?}"),
        }
    }

    #[test]
    fn every_malformed_definition_is_reported() {
        let broken = |key: &str| {
            AssetInput::from(AssetsDefinition::builder(
                GraphDefinition::new("bad")
                    .node("step", NodeDefinition::op("step", Vec::<String>::new(), ["out"]))
                    .map_output(key, "step", "missing"),
            )
            .output(key, AssetSpec::new(key))
            .build()
            .expect("definition"))
        };
        let result = AssetGraph::from_assets([broken("b"), broken("a"), single("fine", &[])]);
        match result {
            Err(AssetFlowError::FlatteningFailed { definition, reason }) => {
                assert_eq!(definition, "bad, bad_2");
                assert!(reason.starts_with("bad: "));
                assert!(reason.contains("; bad_2: "));
            }
            other => panic!("expected flattening failure, got {other:?}"),
        }
    }

    #[test]
    fn checks_bind_to_target_asset() {
        let spec = AssetCheckSpec::new("not_null", "orders");
        let graph = AssetGraph::from_assets([
            single("orders", &[]),
            AssetInput::from(AssetChecksDefinition::single(spec.clone())),
        ])
        .expect("graph");
        let orders = graph.node(&AssetKey::from("orders")).expect("orders");
        assert!(orders.check_keys().contains(&spec.key()));
        assert!(graph.check_definition(&spec.key()).is_ok());
        assert!(graph.node_output_handle_for_check(&spec.key()).is_some());
    }

    #[test]
    fn check_on_undefined_asset_creates_stub() {
        let spec = AssetCheckSpec::new("fresh", "elsewhere");
        let graph =
            AssetGraph::from_assets([AssetChecksDefinition::single(spec)]).expect("graph");
        assert!(
            graph
                .node(&AssetKey::from("elsewhere"))
                .expect("stub")
                .is_auto_created_stub()
        );
    }

    #[test]
    fn levels_respect_dependencies() {
        let graph = AssetGraph::from_assets([
            single("c", &["a", "b"]),
            single("b", &["a"]),
            single("a", &[]),
        ])
        .expect("graph");
        let levels = graph.topological_levels();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec![AssetKey::from("a")]);
        assert_eq!(levels[2], vec![AssetKey::from("c")]);
    }
}
