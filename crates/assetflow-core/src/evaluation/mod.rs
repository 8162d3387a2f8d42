//! # Tick Evaluation
//!
//! One tick evaluates the automation condition of every asset that has one
//! and decides which partitions to request.
//!
//! ## Order
//!
//! Assets are evaluated in topological levels. Assets inside a level are
//! independent and run in parallel (rayon); each level completes before the
//! next one starts, so dependency operators and `requested_this_tick` always
//! see their parents' results.
//!
//! ## Failure isolation
//!
//! An asset whose evaluation errors is recorded in `TickResult::failures`,
//! requests nothing and writes no new state. Dependency operators on its
//! children treat it as unsatisfied.
//!
//! ## Cancellation
//!
//! A `CancelToken` is checked before each level. A cancelled tick returns
//! `TickAbandoned` and produces no states.

mod context;
mod operands;
mod state;
mod status;

pub use state::{AssetEvaluationState, ConditionNodeState};
pub use status::{StatusProvider, StatusSnapshot};

use crate::condition::ConditionId;
use crate::graph::AssetGraph;
use crate::storage::EvaluationStateStore;
use crate::subset::AssetSubset;
use crate::types::{AssetFlowError, AssetKey, Result};
use chrono::{DateTime, Utc};
use context::TickContext;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// =============================================================================
// RESULTS
// =============================================================================

/// Evaluation result of one condition node, with its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionResult {
    pub id: ConditionId,
    pub label: String,
    pub true_subset: AssetSubset,
    pub candidate_subset: AssetSubset,
    pub metadata: BTreeMap<String, String>,
    pub children: Vec<ConditionResult>,
}

impl ConditionResult {
    /// Number of nodes in this result tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}

/// Everything decided in one tick.
#[derive(Debug, Clone)]
pub struct TickResult {
    pub tick: u64,
    pub evaluated_at: DateTime<Utc>,
    /// Requested subset of every evaluated asset.
    pub requested: BTreeMap<AssetKey, AssetSubset>,
    pub evaluations: BTreeMap<AssetKey, ConditionResult>,
    /// New snapshots, one per successfully evaluated asset.
    pub states: BTreeMap<AssetKey, AssetEvaluationState>,
    /// Assets whose evaluation failed, with the error message.
    pub failures: BTreeMap<AssetKey, String>,
}

impl TickResult {
    fn new(tick: u64, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            tick,
            evaluated_at,
            requested: BTreeMap::new(),
            evaluations: BTreeMap::new(),
            states: BTreeMap::new(),
            failures: BTreeMap::new(),
        }
    }

    /// Requested subsets that select at least one partition.
    pub fn non_empty_requests(&self) -> impl Iterator<Item = (&AssetKey, &AssetSubset)> {
        self.requested
            .iter()
            .filter(|(_, subset)| !matches!(subset, AssetSubset::Empty))
    }

    fn record_failure(&mut self, key: &AssetKey, error: &AssetFlowError) {
        tracing::warn!(tick = self.tick, asset = %key, error = %error, "asset evaluation failed");
        self.failures.insert(key.clone(), error.to_string());
        self.requested.insert(key.clone(), AssetSubset::Empty);
    }

    fn absorb(&mut self, outcome: AssetOutcome) {
        self.requested.insert(outcome.key.clone(), outcome.requested);
        self.evaluations.insert(outcome.key.clone(), outcome.evaluation);
        self.states.insert(outcome.key, outcome.state);
    }
}

/// Result of evaluating one asset.
struct AssetOutcome {
    key: AssetKey,
    requested: AssetSubset,
    evaluation: ConditionResult,
    state: AssetEvaluationState,
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Shared flag that abandons a running tick before its next level.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// =============================================================================
// EVALUATOR
// =============================================================================

/// Evaluates ticks of one graph against one status provider.
pub struct TickEvaluator<'a> {
    graph: &'a AssetGraph,
    provider: &'a dyn StatusProvider,
    cancel: CancelToken,
}

impl std::fmt::Debug for TickEvaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickEvaluator")
            .field("assets", &self.graph.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<'a> TickEvaluator<'a> {
    #[must_use]
    pub fn new(graph: &'a AssetGraph, provider: &'a dyn StatusProvider) -> Self {
        Self {
            graph,
            provider,
            cancel: CancelToken::new(),
        }
    }

    /// Use `cancel` to abandon ticks from another thread.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Evaluate tick `tick` at `now`, given the latest snapshot of each asset.
    ///
    /// # Errors
    ///
    /// Only `TickAbandoned`; per-asset errors land in `TickResult::failures`.
    pub fn evaluate(
        &self,
        tick: u64,
        now: DateTime<Utc>,
        previous_states: &BTreeMap<AssetKey, AssetEvaluationState>,
    ) -> Result<TickResult> {
        let span = tracing::debug_span!("tick", tick);
        let _guard = span.enter();

        let mut result = TickResult::new(tick, now);
        let mut universes = BTreeMap::new();
        for node in self.graph.nodes() {
            match node.universe(now) {
                Ok(universe) => {
                    universes.insert(node.key().clone(), universe);
                }
                Err(error) => result.record_failure(node.key(), &error),
            }
        }

        for (index, level) in self.graph.topological_levels().iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(tick, level = index, "tick abandoned");
                return Err(AssetFlowError::TickAbandoned(tick));
            }

            let context = TickContext {
                graph: self.graph,
                provider: self.provider,
                tick,
                now,
                universes: &universes,
                previous_states,
                completed: &result.requested,
                failed: &result.failures,
            };
            let outcomes: Vec<(&AssetKey, Result<Option<AssetOutcome>>)> = level
                .par_iter()
                .filter(|key| !context.failed.contains_key(*key))
                .map(|key| (key, context.evaluate_asset(key)))
                .collect();

            for (key, outcome) in outcomes {
                match outcome {
                    Ok(Some(outcome)) => result.absorb(outcome),
                    Ok(None) => {}
                    Err(error) => result.record_failure(key, &error),
                }
            }
        }

        tracing::debug!(
            tick,
            evaluated = result.evaluations.len(),
            requested = result.non_empty_requests().count(),
            failed = result.failures.len(),
            "tick evaluated"
        );
        Ok(result)
    }

    /// Evaluate the tick after the store's latest and commit its states.
    pub fn evaluate_and_commit<S>(&self, store: &mut S, now: DateTime<Utc>) -> Result<TickResult>
    where
        S: EvaluationStateStore + ?Sized,
    {
        let tick = store
            .latest_tick()?
            .map_or(0, |latest| latest.saturating_add(1));
        let previous = store.load_all_latest()?;
        let result = self.evaluate(tick, now, &previous)?;
        store.commit_tick(tick, &result.states)?;
        Ok(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::definition::{AssetSpec, AssetsDefinition};
    use crate::partitions::{PartitionMapping, PartitionsDefinition};
    use crate::storage::MemoryStateStore;
    use chrono::{NaiveDate, TimeZone};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("time")
    }

    fn key(name: &str) -> AssetKey {
        AssetKey::from(name)
    }

    fn asset(name: &str, deps: &[&str], condition: Option<Condition>) -> AssetsDefinition {
        let mut spec = AssetSpec::new(name);
        spec.automation_condition = condition;
        AssetsDefinition::single(spec, deps.iter().copied()).expect("definition")
    }

    #[test]
    fn missing_asset_is_requested_once_under_eager() {
        let graph = AssetGraph::from_assets([asset("a", &[], Some(Condition::eager()))])
            .expect("graph");
        let status = StatusSnapshot::new();
        let evaluator = TickEvaluator::new(&graph, &status);
        let mut store = MemoryStateStore::new();

        let first = evaluator.evaluate_and_commit(&mut store, at(1_000)).expect("tick 0");
        assert_eq!(first.requested[&key("a")], AssetSubset::All);

        let second = evaluator.evaluate_and_commit(&mut store, at(1_060)).expect("tick 1");
        assert_eq!(second.tick, 1);
        assert_eq!(second.requested[&key("a")], AssetSubset::Empty);
    }

    #[test]
    fn and_narrows_candidate_for_later_operands() {
        let condition = Condition::missing() & Condition::in_progress();
        let graph = AssetGraph::from_assets([asset("a", &[], Some(condition))]).expect("graph");
        let mut status = StatusSnapshot::new();
        status.record_update(&key("a"), None, at(10));
        let result = TickEvaluator::new(&graph, &status)
            .evaluate(0, at(100), &BTreeMap::new())
            .expect("tick");
        let root = &result.evaluations[&key("a")];
        assert_eq!(root.children[1].candidate_subset, AssetSubset::Empty);
    }

    #[test]
    fn any_deps_uses_parent_status() {
        let condition = Condition::any_deps_match(Condition::missing());
        let graph = AssetGraph::from_assets([
            asset("up", &[], None),
            asset("down", &["up"], Some(condition)),
        ])
        .expect("graph");
        let status = StatusSnapshot::new();
        let result = TickEvaluator::new(&graph, &status)
            .evaluate(0, at(100), &BTreeMap::new())
            .expect("tick");
        assert_eq!(result.requested[&key("down")], AssetSubset::All);
        assert!(!result.requested.contains_key(&key("up")));
    }

    #[test]
    fn all_deps_without_parents_is_vacuously_true() {
        let graph = AssetGraph::from_assets([asset(
            "a",
            &[],
            Some(Condition::all_deps_match(Condition::missing())),
        )])
        .expect("graph");
        let status = StatusSnapshot::new();
        let result = TickEvaluator::new(&graph, &status)
            .evaluate(0, at(100), &BTreeMap::new())
            .expect("tick");
        assert_eq!(result.requested[&key("a")], AssetSubset::All);
    }

    #[test]
    fn newly_updated_compares_against_previous_evaluation() {
        let condition = Condition::any_deps_match(Condition::newly_updated());
        let graph = AssetGraph::from_assets([
            asset("up", &[], None),
            asset("down", &["up"], Some(condition)),
        ])
        .expect("graph");
        let mut status = StatusSnapshot::new();
        let mut store = MemoryStateStore::new();

        let first = TickEvaluator::new(&graph, &status)
            .evaluate_and_commit(&mut store, at(100))
            .expect("tick 0");
        assert_eq!(first.requested[&key("down")], AssetSubset::Empty);

        status.record_update(&key("up"), None, at(150));
        let second = TickEvaluator::new(&graph, &status)
            .evaluate_and_commit(&mut store, at(200))
            .expect("tick 1");
        assert_eq!(second.requested[&key("down")], AssetSubset::All);

        let third = TickEvaluator::new(&graph, &status)
            .evaluate_and_commit(&mut store, at(300))
            .expect("tick 2");
        assert_eq!(third.requested[&key("down")], AssetSubset::Empty);
    }

    fn daily_asset(name: &str, condition: Condition) -> AssetsDefinition {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        AssetsDefinition::builder(crate::node_def::NodeDefinition::op(
            name,
            Vec::<String>::new(),
            ["result"],
        ))
        .output("result", AssetSpec::new(name).automation(condition))
        .partitions(PartitionsDefinition::daily(start))
        .build()
        .expect("definition")
    }

    #[test]
    fn negation_complements_within_partitions() {
        let now = Utc
            .with_ymd_and_hms(2024, 1, 4, 12, 0, 0)
            .single()
            .expect("time");
        let mut status = StatusSnapshot::new();
        status.record_update(&key("never"), Some("2024-01-02"), at(10));
        status.record_update(&key("always"), Some("2024-01-02"), at(10));
        let graph = AssetGraph::from_assets([
            daily_asset("never", Condition::missing() & !Condition::missing()),
            daily_asset("always", Condition::missing() | !Condition::missing()),
        ])
        .expect("graph");
        let universe = graph
            .node(&key("always"))
            .expect("node")
            .universe(now)
            .expect("universe");

        let result = TickEvaluator::new(&graph, &status)
            .evaluate(0, now, &BTreeMap::new())
            .expect("tick");

        assert!(result.requested[&key("never")].is_empty(&universe));
        let always = &result.evaluations[&key("always")];
        assert!(always.candidate_subset.is_all(&universe));
        assert!(always.true_subset.equivalent(&always.candidate_subset, &universe));
        assert!(result.requested[&key("always")].is_all(&universe));
        assert_eq!(
            result.evaluations[&key("never")].children[0].true_subset,
            AssetSubset::from_keys(["2024-01-01", "2024-01-03"])
        );
    }

    #[test]
    fn trigger_memory_persists_until_reset() {
        let condition = Condition::execution_failed().since(Condition::newly_updated());
        let graph = AssetGraph::from_assets([asset("a", &[], Some(condition))]).expect("graph");
        let mut status = StatusSnapshot::new();
        status.mark_failed(&key("a"), None);
        let mut store = MemoryStateStore::new();

        let first = TickEvaluator::new(&graph, &status)
            .evaluate_and_commit(&mut store, at(100))
            .expect("tick 0");
        assert_eq!(first.requested[&key("a")], AssetSubset::All);

        let mut recovered = StatusSnapshot::new();
        let second = TickEvaluator::new(&graph, &recovered)
            .evaluate_and_commit(&mut store, at(200))
            .expect("tick 1");
        assert_eq!(second.requested[&key("a")], AssetSubset::All);

        recovered.record_update(&key("a"), None, at(250));
        let third = TickEvaluator::new(&graph, &recovered)
            .evaluate_and_commit(&mut store, at(300))
            .expect("tick 2");
        assert_eq!(third.requested[&key("a")], AssetSubset::Empty);
    }

    #[test]
    fn snapshot_ids_outside_the_tree_are_ignored() {
        let condition = Condition::execution_failed().since(Condition::newly_updated());
        let graph = AssetGraph::from_assets([asset("a", &[], Some(condition))]).expect("graph");
        let mut failed = StatusSnapshot::new();
        failed.mark_failed(&key("a"), None);
        let first = TickEvaluator::new(&graph, &failed)
            .evaluate(0, at(100), &BTreeMap::new())
            .expect("tick 0");
        assert_eq!(first.requested[&key("a")], AssetSubset::All);

        // Drop the stateful node and add an entry no current node owns.
        let mut state = first.states[&key("a")].clone();
        let memory_id = state
            .node_states
            .iter()
            .find(|(_, node)| node.retained_subset.is_some())
            .map(|(id, _)| id.clone())
            .expect("stateful node");
        let mut foreign = state.node_states[&memory_id].clone();
        foreign.retained_subset = Some(AssetSubset::All);
        state.node_states.remove(&memory_id);
        state
            .node_states
            .insert(crate::condition::ConditionId("renamed/since".to_string()), foreign);
        let previous = BTreeMap::from([(key("a"), state)]);

        let recovered = StatusSnapshot::new();
        let second = TickEvaluator::new(&graph, &recovered)
            .evaluate(1, at(200), &previous)
            .expect("tick 1");
        assert!(second.failures.is_empty());
        assert_eq!(second.requested[&key("a")], AssetSubset::Empty);
        let memory = &second.states[&key("a")].node_states[&memory_id];
        assert_eq!(memory.retained_subset, Some(AssetSubset::Empty));

        // With the memory intact, the same tick keeps the request alive.
        let intact = BTreeMap::from([(key("a"), first.states[&key("a")].clone())]);
        let kept = TickEvaluator::new(&graph, &recovered)
            .evaluate(1, at(200), &intact)
            .expect("tick 1");
        assert_eq!(kept.requested[&key("a")], AssetSubset::All);
    }

    #[test]
    fn parent_newer_requires_child_timestamp() {
        let graph = AssetGraph::from_assets([
            asset("up", &[], None),
            asset("down", &["up"], Some(Condition::parent_newer())),
        ])
        .expect("graph");
        let mut status = StatusSnapshot::new();
        status.record_update(&key("up"), None, at(50));
        let evaluate = |status: &StatusSnapshot| {
            TickEvaluator::new(&graph, status)
                .evaluate(0, at(100), &BTreeMap::new())
                .expect("tick")
                .requested[&key("down")]
                .clone()
        };
        assert_eq!(evaluate(&status), AssetSubset::Empty);
        status.record_update(&key("down"), None, at(40));
        assert_eq!(evaluate(&status), AssetSubset::All);
        status.record_update(&key("down"), None, at(60));
        assert_eq!(evaluate(&status), AssetSubset::Empty);
    }

    #[test]
    fn requested_this_tick_sees_earlier_levels() {
        let graph = AssetGraph::from_assets([
            asset("up", &[], Some(Condition::missing())),
            asset(
                "down",
                &["up"],
                Some(Condition::any_deps_match(Condition::requested_this_tick())),
            ),
        ])
        .expect("graph");
        let status = StatusSnapshot::new();
        let result = TickEvaluator::new(&graph, &status)
            .evaluate(0, at(100), &BTreeMap::new())
            .expect("tick");
        assert_eq!(result.requested[&key("down")], AssetSubset::All);
    }

    #[test]
    fn latest_time_window_selects_last_partition() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let definition = AssetsDefinition::builder(crate::node_def::NodeDefinition::op(
            "daily",
            Vec::<String>::new(),
            ["result"],
        ))
        .output(
            "result",
            AssetSpec::new("daily").automation(
                Condition::in_latest_time_window(None) & Condition::missing(),
            ),
        )
        .partitions(PartitionsDefinition::daily(start))
        .build()
        .expect("definition");
        let graph = AssetGraph::from_assets([definition]).expect("graph");
        let now = Utc
            .with_ymd_and_hms(2024, 1, 4, 12, 0, 0)
            .single()
            .expect("time");
        let status = StatusSnapshot::new();
        let result = TickEvaluator::new(&graph, &status)
            .evaluate(0, now, &BTreeMap::new())
            .expect("tick");
        assert_eq!(
            result.requested[&key("daily")],
            AssetSubset::from_keys(["2024-01-03"])
        );
    }

    #[test]
    fn failing_asset_is_isolated() {
        struct Flaky(StatusSnapshot);
        impl StatusProvider for Flaky {
            fn materialized(&self, key: &AssetKey) -> Result<AssetSubset> {
                if key.to_user_string() == "broken" {
                    return Err(AssetFlowError::StatusUnavailable("offline".to_string()));
                }
                self.0.materialized(key)
            }
            fn in_progress(&self, key: &AssetKey) -> Result<AssetSubset> {
                self.0.in_progress(key)
            }
            fn failed(&self, key: &AssetKey) -> Result<AssetSubset> {
                self.0.failed(key)
            }
            fn last_updated(
                &self,
                key: &AssetKey,
                partition: Option<&str>,
            ) -> Result<Option<DateTime<Utc>>> {
                self.0.last_updated(key, partition)
            }
        }

        let graph = AssetGraph::from_assets([
            asset("broken", &[], Some(Condition::missing())),
            asset("fine", &[], Some(Condition::missing())),
            asset(
                "child",
                &["broken"],
                Some(Condition::any_deps_match(Condition::requested_this_tick())),
            ),
        ])
        .expect("graph");
        let status = Flaky(StatusSnapshot::new());
        let result = TickEvaluator::new(&graph, &status)
            .evaluate(0, at(100), &BTreeMap::new())
            .expect("tick");

        assert!(result.failures.contains_key(&key("broken")));
        assert!(!result.states.contains_key(&key("broken")));
        assert_eq!(result.requested[&key("broken")], AssetSubset::Empty);
        assert_eq!(result.requested[&key("fine")], AssetSubset::All);
        assert_eq!(result.requested[&key("child")], AssetSubset::Empty);
        let child = &result.evaluations[&key("child")];
        assert!(child.metadata.contains_key("dep:broken"));
    }

    #[test]
    fn cancelled_tick_is_abandoned() {
        let graph = AssetGraph::from_assets([asset("a", &[], Some(Condition::missing()))])
            .expect("graph");
        let status = StatusSnapshot::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = TickEvaluator::new(&graph, &status)
            .with_cancellation(cancel)
            .evaluate(7, at(100), &BTreeMap::new());
        assert!(matches!(result, Err(AssetFlowError::TickAbandoned(7))));
    }

    #[test]
    fn dependency_mapping_translates_partitions() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("date");
        let daily = PartitionsDefinition::daily(start);
        let up = AssetsDefinition::builder(crate::node_def::NodeDefinition::op(
            "up",
            Vec::<String>::new(),
            ["result"],
        ))
        .output("result", AssetSpec::new("up"))
        .partitions(daily.clone())
        .build()
        .expect("up");
        let down = AssetsDefinition::builder(crate::node_def::NodeDefinition::op(
            "down",
            ["up"],
            ["result"],
        ))
        .output(
            "result",
            AssetSpec::new("down")
                .automation(Condition::all_deps_match(!Condition::missing())),
        )
        .input("up", "up")
        .partitions(daily)
        .partition_mapping(
            "up",
            PartitionMapping::TimeWindow {
                start_offset: -1,
                end_offset: -1,
            },
        )
        .build()
        .expect("down");
        let graph = AssetGraph::from_assets([up, down]).expect("graph");
        let mut status = StatusSnapshot::new();
        status.record_update(&key("up"), Some("2024-01-01"), at(10));
        let now = Utc
            .with_ymd_and_hms(2024, 1, 4, 0, 0, 0)
            .single()
            .expect("time");
        let result = TickEvaluator::new(&graph, &status)
            .evaluate(0, now, &BTreeMap::new())
            .expect("tick");
        assert_eq!(
            result.requested[&key("down")],
            AssetSubset::from_keys(["2024-01-02"])
        );
    }
}
