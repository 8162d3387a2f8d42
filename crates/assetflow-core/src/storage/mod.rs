//! # Evaluation State Storage
//!
//! Snapshots are stored per (asset, tick) and are write-once: a tick is
//! committed in one atomic step, and a second write to the same
//! (asset, tick) is refused. Loading returns the latest snapshot of each
//! asset; an undecodable snapshot is logged and treated as a cold start.
//!
//! - `MemoryStateStore`: in-process, for tests and dry runs
//! - `RedbStateStore`: disk-backed, survives restarts

mod redb_state;

pub use redb_state::RedbStateStore;

use crate::evaluation::AssetEvaluationState;
use crate::formats::{state_from_bytes, state_to_bytes};
use crate::types::{AssetFlowError, AssetKey, Result};
use std::collections::BTreeMap;

/// Storage of evaluation snapshots across ticks.
pub trait EvaluationStateStore {
    /// Highest committed tick.
    fn latest_tick(&self) -> Result<Option<u64>>;

    /// Latest snapshot of `key`, if any decodes.
    fn load_latest(&self, key: &AssetKey) -> Result<Option<AssetEvaluationState>>;

    /// Latest snapshot of every stored asset.
    fn load_all_latest(&self) -> Result<BTreeMap<AssetKey, AssetEvaluationState>>;

    /// Commit every snapshot of `tick` atomically.
    ///
    /// Fails with `StateAlreadyWritten` (writing nothing) when any
    /// (asset, tick) pair already exists.
    fn commit_tick(
        &mut self,
        tick: u64,
        states: &BTreeMap<AssetKey, AssetEvaluationState>,
    ) -> Result<()>;

    /// Keep the newest `keep` snapshots of each asset. Returns how many were removed.
    fn prune(&mut self, keep: usize) -> Result<usize>;
}

/// Decode a stored snapshot, logging and dropping it when corrupt.
fn decode_or_cold_start(key: &AssetKey, tick: u64, bytes: &[u8]) -> Option<AssetEvaluationState> {
    match state_from_bytes(bytes) {
        Ok(state) => Some(state),
        Err(error) => {
            tracing::warn!(asset = %key, tick, error = %error, "discarding undecodable snapshot");
            None
        }
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// Snapshot store held in process memory. Snapshots are kept encoded.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    snapshots: BTreeMap<AssetKey, BTreeMap<u64, Vec<u8>>>,
    latest_tick: Option<u64>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots across all assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EvaluationStateStore for MemoryStateStore {
    fn latest_tick(&self) -> Result<Option<u64>> {
        Ok(self.latest_tick)
    }

    fn load_latest(&self, key: &AssetKey) -> Result<Option<AssetEvaluationState>> {
        Ok(self
            .snapshots
            .get(key)
            .and_then(|ticks| ticks.iter().next_back())
            .and_then(|(tick, bytes)| decode_or_cold_start(key, *tick, bytes)))
    }

    fn load_all_latest(&self) -> Result<BTreeMap<AssetKey, AssetEvaluationState>> {
        let mut latest = BTreeMap::new();
        for key in self.snapshots.keys() {
            if let Some(state) = self.load_latest(key)? {
                latest.insert(key.clone(), state);
            }
        }
        Ok(latest)
    }

    fn commit_tick(
        &mut self,
        tick: u64,
        states: &BTreeMap<AssetKey, AssetEvaluationState>,
    ) -> Result<()> {
        let mut encoded = Vec::with_capacity(states.len());
        for (key, state) in states {
            if self
                .snapshots
                .get(key)
                .is_some_and(|ticks| ticks.contains_key(&tick))
            {
                return Err(AssetFlowError::StateAlreadyWritten {
                    asset: key.clone(),
                    tick,
                });
            }
            encoded.push((key.clone(), state_to_bytes(state)?));
        }

        for (key, bytes) in encoded {
            self.snapshots.entry(key).or_default().insert(tick, bytes);
        }
        self.latest_tick = self.latest_tick.max(Some(tick));
        Ok(())
    }

    fn prune(&mut self, keep: usize) -> Result<usize> {
        let mut removed = 0usize;
        for ticks in self.snapshots.values_mut() {
            while ticks.len() > keep {
                if ticks.pop_first().is_none() {
                    break;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subset::AssetSubset;

    fn state(key: &str, tick: u64) -> AssetEvaluationState {
        AssetEvaluationState {
            asset_key: AssetKey::from(key),
            tick,
            evaluation_timestamp: 1_000 * i64::try_from(tick).unwrap_or_default(),
            tree_signature: "sig".to_string(),
            requested_subset: AssetSubset::All,
            node_states: BTreeMap::new(),
        }
    }

    fn tick_states(tick: u64, keys: &[&str]) -> BTreeMap<AssetKey, AssetEvaluationState> {
        keys.iter()
            .map(|key| (AssetKey::from(*key), state(key, tick)))
            .collect()
    }

    #[test]
    fn latest_snapshot_wins() {
        let mut store = MemoryStateStore::new();
        store.commit_tick(0, &tick_states(0, &["a", "b"])).expect("tick 0");
        store.commit_tick(1, &tick_states(1, &["a"])).expect("tick 1");

        assert_eq!(store.latest_tick().expect("latest"), Some(1));
        let latest = store.load_all_latest().expect("load");
        assert_eq!(latest[&AssetKey::from("a")].tick, 1);
        assert_eq!(latest[&AssetKey::from("b")].tick, 0);
    }

    #[test]
    fn second_write_is_refused_atomically() {
        let mut store = MemoryStateStore::new();
        store.commit_tick(0, &tick_states(0, &["b"])).expect("tick 0");
        let result = store.commit_tick(0, &tick_states(0, &["a", "b"]));
        assert!(matches!(
            result,
            Err(AssetFlowError::StateAlreadyWritten { tick: 0, .. })
        ));
        assert!(store.load_latest(&AssetKey::from("a")).expect("load").is_none());
    }

    #[test]
    fn empty_tick_advances_latest() {
        let mut store = MemoryStateStore::new();
        store.commit_tick(4, &BTreeMap::new()).expect("commit");
        assert_eq!(store.latest_tick().expect("latest"), Some(4));
        assert!(store.is_empty());
    }

    #[test]
    fn prune_keeps_newest() {
        let mut store = MemoryStateStore::new();
        for tick in 0..5 {
            store.commit_tick(tick, &tick_states(tick, &["a"])).expect("commit");
        }
        assert_eq!(store.prune(2).expect("prune"), 3);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store
                .load_latest(&AssetKey::from("a"))
                .expect("load")
                .map(|s| s.tick),
            Some(4)
        );
    }

    #[test]
    fn corrupt_snapshot_is_cold_start() {
        let mut store = MemoryStateStore::new();
        store
            .snapshots
            .entry(AssetKey::from("a"))
            .or_default()
            .insert(0, b"garbage".to_vec());
        assert!(store.load_latest(&AssetKey::from("a")).expect("load").is_none());
    }
}
