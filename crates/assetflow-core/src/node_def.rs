//! # Execution Node Definitions
//!
//! The executable body of a definition: a single op, or a graph of nested
//! nodes wired by dependency edges and input/output mappings.
//!
//! The resolvers in this module flatten a nested graph down to its leaf ops.
//! All traversals are explicit worklists bounded by `MAX_SUBGRAPH_DEPTH`;
//! malformed wiring is reported as `FlatteningFailed` naming the outermost
//! node alias.

use crate::primitives::MAX_SUBGRAPH_DEPTH;
use crate::types::{AssetFlowError, NodeHandle, NodeInputHandle, NodeOutputHandle, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// DEFINITIONS
// =============================================================================

/// A leaf computation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpDefinition {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// `from_node.from_output` feeds `to_node.to_input` inside one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from_node: String,
    pub from_output: String,
    pub to_node: String,
    pub to_input: String,
}

/// A graph input forwarded to an input of an inner node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMapping {
    pub graph_input: String,
    pub node: String,
    pub input: String,
}

/// A graph output produced by an output of an inner node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMapping {
    pub graph_output: String,
    pub node: String,
    pub output: String,
}

/// A composite node: named inner invocations plus their wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub name: String,
    /// Inner invocations keyed by invocation name.
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeDefinition>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
    #[serde(default)]
    pub input_mappings: Vec<InputMapping>,
    #[serde(default)]
    pub output_mappings: Vec<OutputMapping>,
}

impl GraphDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: BTreeMap::new(),
            dependencies: Vec::new(),
            input_mappings: Vec::new(),
            output_mappings: Vec::new(),
        }
    }

    /// Invoke `definition` under `alias`.
    #[must_use]
    pub fn node(mut self, alias: impl Into<String>, definition: impl Into<NodeDefinition>) -> Self {
        self.nodes.insert(alias.into(), definition.into());
        self
    }

    /// Wire `from.output` into `to.input`.
    #[must_use]
    pub fn edge(mut self, from: &str, output: &str, to: &str, input: &str) -> Self {
        self.dependencies.push(DependencyEdge {
            from_node: from.to_string(),
            from_output: output.to_string(),
            to_node: to.to_string(),
            to_input: input.to_string(),
        });
        self
    }

    /// Forward graph input `graph_input` to `node.input`.
    #[must_use]
    pub fn map_input(mut self, graph_input: &str, node: &str, input: &str) -> Self {
        self.input_mappings.push(InputMapping {
            graph_input: graph_input.to_string(),
            node: node.to_string(),
            input: input.to_string(),
        });
        self
    }

    /// Expose `node.output` as graph output `graph_output`.
    #[must_use]
    pub fn map_output(mut self, graph_output: &str, node: &str, output: &str) -> Self {
        self.output_mappings.push(OutputMapping {
            graph_output: graph_output.to_string(),
            node: node.to_string(),
            output: output.to_string(),
        });
        self
    }
}

/// The executable body of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDefinition {
    Op(OpDefinition),
    Graph(GraphDefinition),
}

impl From<OpDefinition> for NodeDefinition {
    fn from(op: OpDefinition) -> Self {
        Self::Op(op)
    }
}

impl From<GraphDefinition> for NodeDefinition {
    fn from(graph: GraphDefinition) -> Self {
        Self::Graph(graph)
    }
}

impl NodeDefinition {
    /// Single op with the given interface.
    #[must_use]
    pub fn op<I, O>(name: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self::Op(OpDefinition {
            name: name.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Op(op) => &op.name,
            Self::Graph(graph) => &graph.name,
        }
    }

    /// Names of the inputs this node exposes.
    #[must_use]
    pub fn input_names(&self) -> BTreeSet<&str> {
        match self {
            Self::Op(op) => op.inputs.iter().map(String::as_str).collect(),
            Self::Graph(graph) => graph
                .input_mappings
                .iter()
                .map(|m| m.graph_input.as_str())
                .collect(),
        }
    }

    /// Names of the outputs this node exposes.
    #[must_use]
    pub fn output_names(&self) -> BTreeSet<&str> {
        match self {
            Self::Op(op) => op.outputs.iter().map(String::as_str).collect(),
            Self::Graph(graph) => graph
                .output_mappings
                .iter()
                .map(|m| m.graph_output.as_str())
                .collect(),
        }
    }
}

// =============================================================================
// RESOLVERS
// =============================================================================

fn flatten_error(handle: &NodeHandle, reason: String) -> AssetFlowError {
    AssetFlowError::FlatteningFailed {
        definition: handle.root_name().unwrap_or_default().to_string(),
        reason,
    }
}

fn check_depth(handle: &NodeHandle) -> Result<()> {
    if handle.depth() > MAX_SUBGRAPH_DEPTH {
        return Err(flatten_error(
            handle,
            format!("nesting at {handle} exceeds depth {MAX_SUBGRAPH_DEPTH}"),
        ));
    }
    Ok(())
}

fn inner_node<'a>(
    graph: &'a GraphDefinition,
    handle: &NodeHandle,
    name: &str,
) -> Result<&'a NodeDefinition> {
    graph.nodes.get(name).ok_or_else(|| {
        flatten_error(
            handle,
            format!("graph '{}' at {handle} has no node named '{name}'", graph.name),
        )
    })
}

/// Every leaf op input that receives the data flowing into `handle`.
///
/// An input with no inner mapping has no destinations.
pub fn resolve_input_to_destinations(
    handle: &NodeInputHandle,
    definition: &NodeDefinition,
) -> Result<Vec<NodeInputHandle>> {
    let mut destinations = BTreeSet::new();
    let mut worklist = vec![(handle.clone(), definition)];

    while let Some((current, def)) = worklist.pop() {
        check_depth(&current.node_handle)?;
        match def {
            NodeDefinition::Op(op) => {
                if !op.inputs.contains(&current.input_name) {
                    return Err(flatten_error(
                        &current.node_handle,
                        format!("op '{}' has no input '{}'", op.name, current.input_name),
                    ));
                }
                destinations.insert(current);
            }
            NodeDefinition::Graph(graph) => {
                for mapping in graph
                    .input_mappings
                    .iter()
                    .filter(|m| m.graph_input == current.input_name)
                {
                    let inner = inner_node(graph, &current.node_handle, &mapping.node)?;
                    worklist.push((
                        NodeInputHandle::new(
                            current.node_handle.child(&mapping.node),
                            mapping.input.clone(),
                        ),
                        inner,
                    ));
                }
            }
        }
    }

    Ok(destinations.into_iter().collect())
}

/// One graph level crossed while resolving an output to its origin.
struct OriginStep<'a> {
    graph_handle: NodeHandle,
    graph: &'a GraphDefinition,
    mapping: &'a OutputMapping,
}

fn output_origin_chain<'a>(
    handle: &NodeOutputHandle,
    definition: &'a NodeDefinition,
) -> Result<(NodeOutputHandle, Vec<OriginStep<'a>>)> {
    let mut chain = Vec::new();
    let mut current = handle.clone();
    let mut def = definition;

    loop {
        check_depth(&current.node_handle)?;
        match def {
            NodeDefinition::Op(op) => {
                if !op.outputs.contains(&current.output_name) {
                    return Err(flatten_error(
                        &current.node_handle,
                        format!("op '{}' has no output '{}'", op.name, current.output_name),
                    ));
                }
                return Ok((current, chain));
            }
            NodeDefinition::Graph(graph) => {
                let mut mappings = graph
                    .output_mappings
                    .iter()
                    .filter(|m| m.graph_output == current.output_name);
                let mapping = match (mappings.next(), mappings.next()) {
                    (Some(mapping), None) => mapping,
                    (None, _) => {
                        return Err(flatten_error(
                            &current.node_handle,
                            format!(
                                "graph '{}' does not map output '{}'",
                                graph.name, current.output_name
                            ),
                        ));
                    }
                    (Some(_), Some(_)) => {
                        return Err(flatten_error(
                            &current.node_handle,
                            format!(
                                "graph '{}' maps output '{}' more than once",
                                graph.name, current.output_name
                            ),
                        ));
                    }
                };
                def = inner_node(graph, &current.node_handle, &mapping.node)?;
                let next = NodeOutputHandle::new(
                    current.node_handle.child(&mapping.node),
                    mapping.output.clone(),
                );
                chain.push(OriginStep {
                    graph_handle: current.node_handle,
                    graph,
                    mapping,
                });
                current = next;
            }
        }
    }
}

/// The single leaf op output that produces the data of `handle`.
pub fn resolve_output_to_origin(
    handle: &NodeOutputHandle,
    definition: &NodeDefinition,
) -> Result<NodeOutputHandle> {
    output_origin_chain(handle, definition).map(|(origin, _)| origin)
}

/// Every leaf op input inside the node that consumes the data of `handle`.
///
/// Consumers are collected at each graph level crossed on the way to the
/// origin, so siblings of a deeply nested producer are included.
pub fn resolve_output_to_destinations(
    handle: &NodeOutputHandle,
    definition: &NodeDefinition,
) -> Result<Vec<NodeInputHandle>> {
    let (_, chain) = output_origin_chain(handle, definition)?;
    let mut destinations = BTreeSet::new();

    for step in chain {
        for edge in step.graph.dependencies.iter().filter(|e| {
            e.from_node == step.mapping.node && e.from_output == step.mapping.output
        }) {
            let target = inner_node(step.graph, &step.graph_handle, &edge.to_node)?;
            let input = NodeInputHandle::new(
                step.graph_handle.child(&edge.to_node),
                edge.to_input.clone(),
            );
            destinations.extend(resolve_input_to_destinations(&input, target)?);
        }
    }

    Ok(destinations.into_iter().collect())
}

// =============================================================================
// LEAF GRAPH
// =============================================================================

/// Leaf ops of a node and the leaf-to-leaf data edges between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafGraph {
    /// Output names of every leaf op, keyed by handle.
    pub ops: BTreeMap<NodeHandle, Vec<String>>,
    /// Producer output to consumer input.
    pub edges: BTreeSet<(NodeOutputHandle, NodeInputHandle)>,
}

impl LeafGraph {
    /// Flatten `definition` invoked at `root`.
    pub fn build(root: &NodeHandle, definition: &NodeDefinition) -> Result<Self> {
        let mut leaf = Self::default();
        let mut worklist = vec![(root.clone(), definition)];

        while let Some((handle, def)) = worklist.pop() {
            check_depth(&handle)?;
            match def {
                NodeDefinition::Op(op) => {
                    leaf.ops.insert(handle, op.outputs.clone());
                }
                NodeDefinition::Graph(graph) => {
                    for edge in &graph.dependencies {
                        let producer = inner_node(graph, &handle, &edge.from_node)?;
                        let consumer = inner_node(graph, &handle, &edge.to_node)?;
                        let origin = resolve_output_to_origin(
                            &NodeOutputHandle::new(
                                handle.child(&edge.from_node),
                                edge.from_output.clone(),
                            ),
                            producer,
                        )?;
                        let inputs = resolve_input_to_destinations(
                            &NodeInputHandle::new(
                                handle.child(&edge.to_node),
                                edge.to_input.clone(),
                            ),
                            consumer,
                        )?;
                        for input in inputs {
                            leaf.edges.insert((origin.clone(), input));
                        }
                    }
                    for (name, inner) in &graph.nodes {
                        worklist.push((handle.child(name), inner));
                    }
                }
            }
        }

        Ok(leaf)
    }

    /// For every leaf output, the keys that transitively depend on it.
    ///
    /// `direct` holds the keys each output produces itself. Ops are visited
    /// in reverse topological order so each op sees its consumers' totals.
    pub fn propagate_dependents<K: Ord + Clone>(
        &self,
        root: &NodeHandle,
        direct: &BTreeMap<NodeOutputHandle, BTreeSet<K>>,
    ) -> Result<BTreeMap<NodeOutputHandle, BTreeSet<K>>> {
        let mut consumers: BTreeMap<&NodeOutputHandle, BTreeSet<&NodeHandle>> = BTreeMap::new();
        let mut downstream_ops: BTreeMap<&NodeHandle, BTreeSet<&NodeHandle>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&NodeHandle, usize> =
            self.ops.keys().map(|handle| (handle, 0)).collect();

        for (output, input) in &self.edges {
            consumers
                .entry(output)
                .or_default()
                .insert(&input.node_handle);
            if downstream_ops
                .entry(&output.node_handle)
                .or_default()
                .insert(&input.node_handle)
            {
                *in_degree.entry(&input.node_handle).or_default() += 1;
            }
        }

        let mut order = Vec::with_capacity(self.ops.len());
        let mut ready: Vec<&NodeHandle> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(handle, _)| *handle)
            .collect();
        while let Some(handle) = ready.pop() {
            order.push(handle);
            for next in downstream_ops.get(handle).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push(*next);
                    }
                }
            }
        }
        if order.len() != in_degree.len() {
            return Err(flatten_error(root, "leaf ops form a cycle".to_string()));
        }

        let mut result: BTreeMap<NodeOutputHandle, BTreeSet<K>> = BTreeMap::new();
        for handle in order.into_iter().rev() {
            let Some(outputs) = self.ops.get(handle) else {
                continue;
            };
            for output_name in outputs {
                let output = NodeOutputHandle::new(handle.clone(), output_name.clone());
                let mut keys = direct.get(&output).cloned().unwrap_or_default();
                for consumer in consumers.get(&output).into_iter().flatten() {
                    for consumer_output in self.ops.get(*consumer).into_iter().flatten() {
                        let consumer_handle =
                            NodeOutputHandle::new((*consumer).clone(), consumer_output.clone());
                        if let Some(downstream) = result.get(&consumer_handle) {
                            keys.extend(downstream.iter().cloned());
                        }
                    }
                }
                result.insert(output, keys);
            }
        }

        Ok(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================
