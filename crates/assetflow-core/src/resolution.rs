//! # Relative Dependency Resolution
//!
//! A dependency reference that does not name a defined key is tried
//! relative to each key the owning definition produces: `prefix(key) + ref`.
//! - one distinct defined candidate: the reference resolves to it
//! - several: `AmbiguousDependency`
//! - none: the reference is kept and later becomes a stub

use crate::definition::{AssetLike, AssetsDefinition};
use crate::types::{AssetFlowError, AssetKey, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Resolve the dependency references of `definition` against `defined`.
///
/// Returns the replacements applied (reference -> resolved key).
pub fn resolve_definition_dependencies(
    definition: &mut AssetsDefinition,
    defined: &BTreeSet<AssetKey>,
) -> Result<BTreeMap<AssetKey, AssetKey>> {
    let mut owned_keys = definition.asset_keys();
    owned_keys.extend(
        definition
            .check_specs()
            .into_iter()
            .map(|spec| spec.asset_key),
    );

    let mut replacements = BTreeMap::new();
    for reference in definition.dependency_keys() {
        if defined.contains(&reference) {
            continue;
        }
        let candidates: BTreeSet<AssetKey> = owned_keys
            .iter()
            .map(|owned| reference.with_prefix(owned.prefix()))
            .filter(|candidate| defined.contains(candidate))
            .collect();

        let mut iter = candidates.iter();
        match (iter.next(), iter.next()) {
            (Some(resolved), None) => {
                replacements.insert(reference, resolved.clone());
            }
            (Some(_), Some(_)) => {
                return Err(AssetFlowError::AmbiguousDependency {
                    definition: describe(definition),
                    input: reference.to_user_string(),
                    candidates: candidates.iter().map(AssetKey::to_user_string).collect(),
                });
            }
            (None, _) => {}
        }
    }

    definition.rewrite_dependencies(&replacements);
    Ok(replacements)
}

fn describe(definition: &AssetsDefinition) -> String {
    match definition.node_def() {
        Some(node) => node.name().to_string(),
        None => definition
            .asset_keys()
            .into_iter()
            .next()
            .map(|key| key.to_user_string())
            .unwrap_or_default(),
    }
}
