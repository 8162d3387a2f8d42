//! Leaf conditions: facts read from the status provider, prior snapshots
//! and this tick's earlier requests.

use super::context::AssetContext;
use crate::condition::{Condition, parse_cron, previous_cron_boundary};
use crate::partitions::PartitionUniverse;
use crate::subset::AssetSubset;
use crate::types::{AssetFlowError, AssetKey, Result};
use std::collections::BTreeMap;

impl AssetContext<'_, '_> {
    pub(super) fn evaluate_operand(
        &self,
        target: &AssetKey,
        condition: &Condition,
        candidate: &AssetSubset,
        universe: &PartitionUniverse,
        metadata: &mut BTreeMap<String, String>,
    ) -> Result<AssetSubset> {
        let tick = self.tick;
        let provider = tick.provider;

        match condition {
            Condition::Missing => {
                let materialized = provider.materialized(target)?;
                Ok(candidate.difference(&materialized, universe))
            }
            Condition::InProgress => {
                Ok(candidate.intersection(&provider.in_progress(target)?, universe))
            }
            Condition::ExecutionFailed => {
                Ok(candidate.intersection(&provider.failed(target)?, universe))
            }
            Condition::NewlyUpdated => {
                let Some(cutoff) = self.previous.and_then(|state| state.evaluated_at()) else {
                    metadata.insert("cutoff".to_string(), "no previous evaluation".to_string());
                    return Ok(AssetSubset::Empty);
                };
                metadata.insert("cutoff".to_string(), cutoff.to_rfc3339());
                AssetSubset::filter(candidate, universe, |partition| {
                    Ok(provider
                        .last_updated(target, partition)?
                        .is_some_and(|updated| updated > cutoff))
                })
            }
            Condition::UpdatedSinceCron { cron_schedule } => {
                let schedule = parse_cron(cron_schedule)?;
                let Some(boundary) = previous_cron_boundary(&schedule, tick.now) else {
                    return Ok(AssetSubset::Empty);
                };
                metadata.insert("boundary".to_string(), boundary.to_rfc3339());
                AssetSubset::filter(candidate, universe, |partition| {
                    Ok(provider
                        .last_updated(target, partition)?
                        .is_some_and(|updated| updated >= boundary))
                })
            }
            Condition::ParentNewer => AssetSubset::filter(candidate, universe, |partition| {
                self.parent_newer(target, partition, universe)
            }),
            Condition::RequestedPreviousTick => {
                let previous = tick
                    .previous_states
                    .get(target)
                    .map(|state| state.requested(universe))
                    .unwrap_or_default();
                Ok(previous.intersection(candidate, universe))
            }
            Condition::RequestedThisTick => {
                if target == self.root {
                    return Ok(AssetSubset::Empty);
                }
                let requested = tick.completed.get(target).cloned().unwrap_or_default();
                Ok(requested.intersection(candidate, universe))
            }
            Condition::InLatestTimeWindow { lookback_seconds } => {
                let node = tick.graph.node(target)?;
                let Some(partitions_def) = node.partitions_def().filter(|def| def.is_time_window())
                else {
                    return Ok(candidate.clone());
                };
                match lookback_seconds {
                    None => Ok(partitions_def
                        .last_key(universe)
                        .map(|key| AssetSubset::from_keys([key]))
                        .unwrap_or_default()
                        .intersection(candidate, universe)),
                    Some(seconds) => {
                        let cutoff = tick.now.timestamp().saturating_sub(*seconds);
                        AssetSubset::filter(candidate, universe, |partition| match partition {
                            Some(key) => partitions_def.window(key).map(|(_, end)| end > cutoff),
                            None => Ok(true),
                        })
                    }
                }
            }
            other => Err(AssetFlowError::InvalidCondition(format!(
                "'{}' is not an operand",
                other.name()
            ))),
        }
    }

    /// Whether some partition of a parent mapped from `partition` was
    /// updated after `partition` itself. False when `partition` never updated.
    fn parent_newer(
        &self,
        target: &AssetKey,
        partition: Option<&str>,
        universe: &PartitionUniverse,
    ) -> Result<bool> {
        let tick = self.tick;
        let provider = tick.provider;
        let Some(updated) = provider.last_updated(target, partition)? else {
            return Ok(false);
        };
        let single = match partition {
            Some(key) => AssetSubset::from_keys([key]),
            None => AssetSubset::All,
        };

        for parent in tick.graph.node(target)?.parents_excluding_self() {
            let Ok(parent_universe) = tick.universe(parent) else {
                continue;
            };
            let mapping = tick.graph.partition_mapping(target, parent)?;
            let edge = tick
                .graph
                .edge_partitions(target, universe, parent, parent_universe)?;
            let Ok(upstream) = mapping.upstream_subset(&single, &edge) else {
                continue;
            };
            let parent_partitions: Vec<Option<String>> = match parent_universe {
                PartitionUniverse::Unpartitioned => {
                    if upstream.is_all(parent_universe) {
                        vec![None]
                    } else {
                        Vec::new()
                    }
                }
                PartitionUniverse::Partitioned(_) => {
                    upstream.keys(parent_universe).into_iter().map(Some).collect()
                }
            };
            for parent_partition in parent_partitions {
                if provider
                    .last_updated(parent, parent_partition.as_deref())?
                    .is_some_and(|parent_updated| parent_updated > updated)
                {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
