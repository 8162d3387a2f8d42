//! Same-run compatibility between a child and one of its parents.

use super::AssetGraph;
use crate::types::AssetKey;

/// Whether `child` and `parent` can be materialized within one run.
///
/// Requires both materializable, identical partitioning, a simple edge
/// mapping for partitioned parents, and matching locations when the graph
/// is locality-aware. Unknown keys yield `false`.
#[must_use]
pub fn materializable_in_same_run(graph: &AssetGraph, child: &AssetKey, parent: &AssetKey) -> bool {
    let (Some(child_node), Some(parent_node)) = (graph.get(child), graph.get(parent)) else {
        return false;
    };
    if !child_node.is_materializable() || !parent_node.is_materializable() {
        return false;
    }
    if child_node.partitions_def() != parent_node.partitions_def() {
        return false;
    }
    if parent_node.is_partitioned() {
        match graph.partition_mapping(child, parent) {
            Ok(mapping) if mapping.is_simple() => {}
            _ => return false,
        }
    }
    !graph.is_locality_aware() || child_node.location() == parent_node.location()
}
