//! Execution sets: the entities that must run together with a given one.

use super::AssetGraph;
use crate::definition::{AssetLike, AssetsDefinition};
use crate::types::{AssetFlowError, AssetKey, EntityKey, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

impl AssetGraph {
    fn owning_definition(&self, entity: &EntityKey) -> Result<&Arc<AssetsDefinition>> {
        match entity {
            EntityKey::Asset(key) => Ok(self.node(key)?.definition()),
            EntityKey::Check(key) => self.check_definition(key),
        }
    }

    /// Every asset and check key that must execute together with `entity`.
    ///
    /// A non-subsettable definition producing several entities yields all of
    /// them; otherwise the result is the singleton.
    pub fn execution_set(&self, entity: &EntityKey) -> Result<BTreeSet<EntityKey>> {
        let definition = self.owning_definition(entity)?;
        let entities = definition.entity_keys();
        if !definition.can_subset() && entities.len() > 1 {
            Ok(entities)
        } else {
            Ok(BTreeSet::from([entity.clone()]))
        }
    }

    /// Asset keys of `execution_set` for an asset.
    pub fn execution_set_asset_keys(&self, key: &AssetKey) -> Result<BTreeSet<AssetKey>> {
        Ok(self
            .execution_set(&EntityKey::Asset(key.clone()))?
            .into_iter()
            .filter_map(|entity| match entity {
                EntityKey::Asset(key) => Some(key),
                EntityKey::Check(_) => None,
            })
            .collect())
    }

    /// Whether `selection` can run without splitting a non-subsettable set.
    pub fn can_subset_to(&self, selection: &BTreeSet<EntityKey>) -> Result<bool> {
        for entity in selection {
            if !self.execution_set(entity)?.is_subset(selection) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Execution set of the entity produced at a node alias and output name.
    pub fn execution_set_for_output(&self, alias: &str, output_name: &str) -> Result<BTreeSet<EntityKey>> {
        let definition = self.definition_for_alias(alias).ok_or_else(|| {
            AssetFlowError::InvalidDefinition(format!("no definition invoked as '{alias}'"))
        })?;
        if let Some(key) = definition.keys_by_output_name().get(output_name) {
            return self.execution_set(&EntityKey::Asset(key.clone()));
        }
        if let Some(spec) = definition.check_specs_by_output_name().get(output_name) {
            return self.execution_set(&EntityKey::Check(spec.key()));
        }
        Err(AssetFlowError::InvalidDefinition(format!(
            "'{alias}' has no output '{output_name}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use crate::definition::{AssetCheckSpec, AssetSpec, AssetsDefinition};
    use crate::graph::AssetGraph;
    use crate::node_def::NodeDefinition;
    use crate::types::{AssetKey, EntityKey};
    use std::collections::BTreeSet;

    fn multi(can_subset: bool) -> AssetGraph {
        let op = NodeDefinition::op("multi", Vec::<String>::new(), ["x", "y", "check"]);
        let definition = AssetsDefinition::builder(op)
            .output("x", AssetSpec::new("x"))
            .output("y", AssetSpec::new("y"))
            .check("check", AssetCheckSpec::new("positive", "x"))
            .can_subset(can_subset)
            .build()
            .expect("definition");
        AssetGraph::from_assets([definition]).expect("graph")
    }

    #[test]
    fn non_subsettable_definition_runs_together() {
        let graph = multi(false);
        let set = graph
            .execution_set(&EntityKey::Asset(AssetKey::from("x")))
            .expect("set");
        assert_eq!(set.len(), 3);
        assert_eq!(
            graph
                .execution_set_asset_keys(&AssetKey::from("y"))
                .expect("keys"),
            BTreeSet::from([AssetKey::from("x"), AssetKey::from("y")])
        );
    }

    #[test]
    fn subsettable_definition_yields_singleton() {
        let graph = multi(true);
        let entity = EntityKey::Asset(AssetKey::from("x"));
        assert_eq!(
            graph.execution_set(&entity).expect("set"),
            BTreeSet::from([entity])
        );
    }

    #[test]
    fn partial_selection_of_fixed_set_cannot_subset() {
        let graph = multi(false);
        let partial = BTreeSet::from([EntityKey::Asset(AssetKey::from("x"))]);
        assert!(!graph.can_subset_to(&partial).expect("check"));
        let full = graph
            .execution_set(&EntityKey::Asset(AssetKey::from("x")))
            .expect("set");
        assert!(graph.can_subset_to(&full).expect("check"));
    }

    #[test]
    fn lookup_by_output_handle() {
        let graph = multi(false);
        let set = graph.execution_set_for_output("multi", "check").expect("set");
        assert!(set.contains(&EntityKey::Asset(AssetKey::from("y"))));
        assert!(graph.execution_set_for_output("multi", "nope").is_err());
    }
}
