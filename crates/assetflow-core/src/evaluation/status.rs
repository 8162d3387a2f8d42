//! Materialization and run status facts consumed by operand conditions.

use crate::subset::AssetSubset;
use crate::types::{AssetKey, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Source of materialization and run status for operand conditions.
///
/// `None` partitions address unpartitioned assets. Implementations are
/// shared across the parallel evaluation of one level.
pub trait StatusProvider: Send + Sync {
    /// Partitions with at least one materialization or observation.
    fn materialized(&self, key: &AssetKey) -> Result<AssetSubset>;

    /// Partitions targeted by a run that has not finished.
    fn in_progress(&self, key: &AssetKey) -> Result<AssetSubset>;

    /// Partitions whose latest run failed.
    fn failed(&self, key: &AssetKey) -> Result<AssetSubset>;

    /// Time of the latest materialization or observation.
    fn last_updated(&self, key: &AssetKey, partition: Option<&str>) -> Result<Option<DateTime<Utc>>>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AssetStatus {
    updated: BTreeMap<Option<String>, DateTime<Utc>>,
    in_progress: BTreeSet<Option<String>>,
    failed: BTreeSet<Option<String>>,
}

/// In-memory status table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    assets: BTreeMap<AssetKey, AssetStatus>,
}

impl StatusSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a materialization or observation at `at`. Keeps the latest time.
    pub fn record_update(&mut self, key: &AssetKey, partition: Option<&str>, at: DateTime<Utc>) {
        let updated = &mut self.assets.entry(key.clone()).or_default().updated;
        let entry = updated.entry(partition.map(str::to_string)).or_insert(at);
        if *entry < at {
            *entry = at;
        }
    }

    pub fn mark_in_progress(&mut self, key: &AssetKey, partition: Option<&str>) {
        self.assets
            .entry(key.clone())
            .or_default()
            .in_progress
            .insert(partition.map(str::to_string));
    }

    pub fn mark_failed(&mut self, key: &AssetKey, partition: Option<&str>) {
        self.assets
            .entry(key.clone())
            .or_default()
            .failed
            .insert(partition.map(str::to_string));
    }

    fn subset(partitions: impl Iterator<Item = Option<String>>) -> AssetSubset {
        let mut keys = BTreeSet::new();
        for partition in partitions {
            match partition {
                None => return AssetSubset::All,
                Some(key) => {
                    keys.insert(key);
                }
            }
        }
        AssetSubset::Partitions(keys)
    }
}

impl StatusProvider for StatusSnapshot {
    fn materialized(&self, key: &AssetKey) -> Result<AssetSubset> {
        Ok(self
            .assets
            .get(key)
            .map(|status| Self::subset(status.updated.keys().cloned()))
            .unwrap_or_default())
    }

    fn in_progress(&self, key: &AssetKey) -> Result<AssetSubset> {
        Ok(self
            .assets
            .get(key)
            .map(|status| Self::subset(status.in_progress.iter().cloned()))
            .unwrap_or_default())
    }

    fn failed(&self, key: &AssetKey) -> Result<AssetSubset> {
        Ok(self
            .assets
            .get(key)
            .map(|status| Self::subset(status.failed.iter().cloned()))
            .unwrap_or_default())
    }

    fn last_updated(&self, key: &AssetKey, partition: Option<&str>) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .assets
            .get(key)
            .and_then(|status| status.updated.get(&partition.map(str::to_string)))
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitions::PartitionUniverse;
    use chrono::TimeZone;

    #[test]
    fn latest_update_wins() {
        let key = AssetKey::from("a");
        let early = Utc.timestamp_opt(100, 0).single().expect("time");
        let late = Utc.timestamp_opt(200, 0).single().expect("time");
        let mut status = StatusSnapshot::new();
        status.record_update(&key, None, late);
        status.record_update(&key, None, early);
        assert_eq!(status.last_updated(&key, None).expect("lookup"), Some(late));
        assert_eq!(status.materialized(&key).expect("lookup"), AssetSubset::All);
    }

    #[test]
    fn partition_sets_become_subsets() {
        let key = AssetKey::from("p");
        let mut status = StatusSnapshot::new();
        status.mark_in_progress(&key, Some("x"));
        let universe = PartitionUniverse::Partitioned(
            ["x", "y"].into_iter().map(str::to_string).collect(),
        );
        assert_eq!(
            status.in_progress(&key).expect("lookup").canonical(&universe),
            AssetSubset::from_keys(["x"])
        );
        assert!(status.failed(&key).expect("lookup").is_empty(&universe));
    }
}
