//! # Evaluation State
//!
//! Per-asset snapshot written at the end of a tick and read by the next one.
//!
//! Node entries are keyed by structural `ConditionId`. Entries whose id no
//! longer exists in the current tree are ignored; ids missing from a
//! snapshot mean "no prior result". Subsets are re-canonicalized against the
//! current universe when read, so keys that left the universe are dropped.

use crate::condition::ConditionId;
use crate::partitions::PartitionUniverse;
use crate::subset::AssetSubset;
use crate::types::AssetKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of one condition node at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionNodeState {
    pub true_subset: AssetSubset,
    pub candidate_subset: AssetSubset,
    /// Memory carried to the next tick by stateful nodes.
    pub retained_subset: Option<AssetSubset>,
    pub metadata: BTreeMap<String, String>,
}

/// Snapshot of one asset's evaluation at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEvaluationState {
    pub asset_key: AssetKey,
    pub tick: u64,
    /// Unix milliseconds of the evaluation.
    pub evaluation_timestamp: i64,
    /// Signature of the whole condition tree.
    pub tree_signature: String,
    pub requested_subset: AssetSubset,
    pub node_states: BTreeMap<ConditionId, ConditionNodeState>,
}

impl AssetEvaluationState {
    /// When the evaluation ran.
    #[must_use]
    pub fn evaluated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.evaluation_timestamp)
    }

    /// Requested subset restricted to `universe`.
    #[must_use]
    pub fn requested(&self, universe: &PartitionUniverse) -> AssetSubset {
        self.requested_subset.canonical(universe)
    }

    /// Memory retained by the stateful node `id`, restricted to `universe`.
    #[must_use]
    pub fn retained(&self, id: &ConditionId, universe: &PartitionUniverse) -> Option<AssetSubset> {
        self.node_states
            .get(id)
            .and_then(|state| state.retained_subset.as_ref())
            .map(|subset| subset.canonical(universe))
    }
}
