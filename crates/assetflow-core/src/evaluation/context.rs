//! # Condition Tree Evaluation
//!
//! `TickContext` holds the read-only facts of one tick; `AssetContext`
//! walks one asset's condition tree against them and records a
//! `ConditionNodeState` for every node it visits.
//!
//! Candidates flow top-down, true subsets bottom-up:
//! - AND narrows the candidate for each successive operand
//! - OR evaluates every operand over the full candidate
//! - NOT is candidate minus operand
//! - dependency operators translate the candidate to each parent's
//!   partitions and back through the edge mapping
//! - trigger-since-target evaluates trigger and reset over the whole
//!   universe and carries its memory to the next tick

use super::state::{AssetEvaluationState, ConditionNodeState};
use super::status::StatusProvider;
use super::{AssetOutcome, ConditionResult};
use crate::condition::{Condition, ConditionId, dep_label};
use crate::graph::AssetGraph;
use crate::partitions::PartitionUniverse;
use crate::subset::AssetSubset;
use crate::types::{AssetFlowError, AssetKey, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Read-only facts shared by every asset evaluated in one tick.
pub(super) struct TickContext<'a> {
    pub graph: &'a AssetGraph,
    pub provider: &'a dyn StatusProvider,
    pub tick: u64,
    pub now: DateTime<Utc>,
    pub universes: &'a BTreeMap<AssetKey, PartitionUniverse>,
    pub previous_states: &'a BTreeMap<AssetKey, AssetEvaluationState>,
    /// Requested subsets of assets in earlier levels of this tick.
    pub completed: &'a BTreeMap<AssetKey, AssetSubset>,
    /// Assets whose evaluation failed earlier in this tick.
    pub failed: &'a BTreeMap<AssetKey, String>,
}

impl TickContext<'_> {
    pub fn universe(&self, key: &AssetKey) -> Result<&PartitionUniverse> {
        self.universes
            .get(key)
            .ok_or_else(|| AssetFlowError::AssetNotFound(key.clone()))
    }

    /// Evaluate the automation condition of `key`, if it has one.
    pub fn evaluate_asset(&self, key: &AssetKey) -> Result<Option<AssetOutcome>> {
        let node = self.graph.node(key)?;
        let Some(condition) = node.automation_condition() else {
            return Ok(None);
        };
        let universe = self.universe(key)?;

        let mut context = AssetContext {
            tick: self,
            root: key,
            previous: self.previous_states.get(key),
            node_states: BTreeMap::new(),
        };
        let evaluation = context.evaluate(
            key,
            condition,
            ConditionId::root(condition),
            &AssetSubset::All.canonical(universe),
        )?;

        let requested = if node.is_executable() {
            evaluation.true_subset.clone()
        } else {
            AssetSubset::Empty
        };
        let state = AssetEvaluationState {
            asset_key: key.clone(),
            tick: self.tick,
            evaluation_timestamp: self.now.timestamp_millis(),
            tree_signature: condition.signature(),
            requested_subset: requested.clone(),
            node_states: context.node_states,
        };
        Ok(Some(AssetOutcome {
            key: key.clone(),
            requested,
            evaluation,
            state,
        }))
    }
}

/// Outcome of evaluating a dependency operator's operand for one parent.
enum DepOutcome {
    Evaluated(AssetSubset, ConditionResult),
    /// Conservatively false for this parent, with the reason.
    Unsatisfied(String),
}

/// Evaluation of one asset's condition tree.
pub(super) struct AssetContext<'t, 'a> {
    pub(super) tick: &'t TickContext<'a>,
    /// Asset that owns the condition tree.
    pub(super) root: &'t AssetKey,
    /// Previous snapshot of `root`.
    pub(super) previous: Option<&'a AssetEvaluationState>,
    node_states: BTreeMap<ConditionId, ConditionNodeState>,
}

impl AssetContext<'_, '_> {
    /// Evaluate `condition` over the partitions of `target` in `candidate`.
    pub(super) fn evaluate(
        &mut self,
        target: &AssetKey,
        condition: &Condition,
        id: ConditionId,
        candidate: &AssetSubset,
    ) -> Result<ConditionResult> {
        let tick = self.tick;
        let universe = tick.universe(target)?;
        let candidate = candidate.canonical(universe);
        let mut metadata = BTreeMap::new();
        let mut children = Vec::new();
        let mut retained = None;

        let true_subset = match condition {
            Condition::And { .. } => {
                let mut current = candidate.clone();
                for (label, operand) in condition.labelled_children() {
                    let child = self.evaluate(target, operand, id.child(&label, operand), &current)?;
                    current = current.intersection(&child.true_subset, universe);
                    children.push(child);
                }
                current
            }
            Condition::Or { .. } => {
                let mut union = AssetSubset::Empty;
                for (label, operand) in condition.labelled_children() {
                    let child =
                        self.evaluate(target, operand, id.child(&label, operand), &candidate)?;
                    union = union.union(&child.true_subset, universe);
                    children.push(child);
                }
                union.intersection(&candidate, universe)
            }
            Condition::Not { operand } => {
                let child =
                    self.evaluate(target, operand, id.child("operand", operand), &candidate)?;
                let negated = candidate.difference(&child.true_subset, universe);
                children.push(child);
                negated
            }
            Condition::AllDeps { operand } => {
                self.evaluate_deps(target, operand, &id, &candidate, true, &mut children, &mut metadata)?
            }
            Condition::AnyDeps { operand } => {
                self.evaluate_deps(target, operand, &id, &candidate, false, &mut children, &mut metadata)?
            }
            Condition::TriggerSinceTarget { trigger, reset } => {
                let everything = AssetSubset::All.canonical(universe);
                let fired = self.evaluate(target, trigger, id.child("trigger", trigger), &everything)?;
                let cleared = self.evaluate(target, reset, id.child("reset", reset), &everything)?;
                let prior = self
                    .previous
                    .and_then(|state| state.retained(&id, universe))
                    .unwrap_or_default();
                let memory = prior
                    .union(&fired.true_subset, universe)
                    .difference(&cleared.true_subset, universe);
                metadata.insert(
                    "memory_size".to_string(),
                    memory.size(universe).to_string(),
                );
                children.push(fired);
                children.push(cleared);
                let true_subset = memory.intersection(&candidate, universe);
                retained = Some(memory);
                true_subset
            }
            _ => self.evaluate_operand(target, condition, &candidate, universe, &mut metadata)?,
        };

        self.node_states.insert(
            id.clone(),
            ConditionNodeState {
                true_subset: true_subset.clone(),
                candidate_subset: candidate.clone(),
                retained_subset: retained,
                metadata: metadata.clone(),
            },
        );
        Ok(ConditionResult {
            id,
            label: condition.name(),
            true_subset,
            candidate_subset: candidate,
            metadata,
            children,
        })
    }

    fn evaluate_deps(
        &mut self,
        target: &AssetKey,
        operand: &Condition,
        id: &ConditionId,
        candidate: &AssetSubset,
        require_all: bool,
        children: &mut Vec<ConditionResult>,
        metadata: &mut BTreeMap<String, String>,
    ) -> Result<AssetSubset> {
        let tick = self.tick;
        let universe = tick.universe(target)?;
        let node = tick.graph.node(target)?;
        let mut combined = if require_all {
            candidate.clone()
        } else {
            AssetSubset::Empty
        };

        for parent in node.parents_excluding_self() {
            let label = dep_label(parent);
            let child_id = id.child(&label, operand);
            let mapped = match self.evaluate_dep(target, parent, operand, child_id, candidate)? {
                DepOutcome::Evaluated(subset, child) => {
                    children.push(child);
                    subset
                }
                DepOutcome::Unsatisfied(reason) => {
                    metadata.insert(label, reason);
                    AssetSubset::Empty
                }
            };
            combined = if require_all {
                combined.intersection(&mapped, universe)
            } else {
                combined.union(&mapped, universe)
            };
        }
        Ok(combined)
    }

    fn evaluate_dep(
        &mut self,
        target: &AssetKey,
        parent: &AssetKey,
        operand: &Condition,
        id: ConditionId,
        candidate: &AssetSubset,
    ) -> Result<DepOutcome> {
        let tick = self.tick;
        if let Some(reason) = tick.failed.get(parent) {
            return Ok(DepOutcome::Unsatisfied(format!(
                "parent evaluation failed: {reason}"
            )));
        }
        let graph = tick.graph;
        let universe = tick.universe(target)?;
        let parent_universe = tick.universe(parent)?;
        let mapping = graph.partition_mapping(target, parent)?;
        let edge = graph.edge_partitions(target, universe, parent, parent_universe)?;

        let parent_candidate = match mapping.upstream_subset(candidate, &edge) {
            Ok(subset) => subset,
            Err(error) => return Ok(DepOutcome::Unsatisfied(error.to_string())),
        };
        let child = self.evaluate(parent, operand, id, &parent_candidate)?;
        match mapping.downstream_subset(&child.true_subset, &edge) {
            Ok(subset) => Ok(DepOutcome::Evaluated(
                subset.intersection(candidate, universe),
                child,
            )),
            Err(error) => Ok(DepOutcome::Unsatisfied(error.to_string())),
        }
    }
}
