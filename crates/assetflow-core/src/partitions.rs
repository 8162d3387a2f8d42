//! # Partitions
//!
//! Partition definitions, per-tick partition universes, and the mappings
//! that translate subsets across a dependency edge.
//!
//! ## Time windows
//!
//! Time-window partitions are anchored at `start` and step by their cadence.
//! Only complete windows (end <= now) exist. Keys are zero-padded so that
//! lexicographic order equals chronological order:
//! - daily: `%Y-%m-%d`
//! - hourly: `%Y-%m-%d-%H:%M`
//!
//! ## Mappings
//!
//! A mapping translates a child subset to the parent partitions it reads
//! (`upstream_subset`) and a parent subset to the child partitions that read
//! any of them (`downstream_subset`). Only `Identity` and `TimeWindow` are
//! simple enough for parent and child to share a run.

use crate::primitives::MAX_PARTITIONS_PER_ASSET;
use crate::subset::AssetSubset;
use crate::types::{AssetFlowError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const DAILY_FORMAT: &str = "%Y-%m-%d";
const HOURLY_FORMAT: &str = "%Y-%m-%d-%H:%M";

// =============================================================================
// PARTITIONS DEFINITION
// =============================================================================

/// Step between consecutive time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Hourly,
    Daily,
}

impl Cadence {
    /// Window length in seconds.
    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::Hourly => 3_600,
            Self::Daily => 86_400,
        }
    }
}

/// How an asset is partitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionsDefinition {
    /// A fixed, ordered list of keys.
    Static { keys: Vec<String> },
    /// Consecutive windows starting at `start`.
    TimeWindow { cadence: Cadence, start: NaiveDateTime },
}

impl PartitionsDefinition {
    #[must_use]
    pub fn daily(start: NaiveDate) -> Self {
        Self::TimeWindow {
            cadence: Cadence::Daily,
            start: start.and_time(chrono::NaiveTime::MIN),
        }
    }

    #[must_use]
    pub fn hourly(start: NaiveDateTime) -> Self {
        Self::TimeWindow {
            cadence: Cadence::Hourly,
            start,
        }
    }

    #[must_use]
    pub fn static_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Static {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the definition is well formed.
    ///
    /// Static keys must be unique and non-empty; time-window starts must be
    /// aligned to their cadence.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Static { keys } => {
                let mut seen = BTreeSet::new();
                for key in keys {
                    if key.is_empty() {
                        return Err(AssetFlowError::InvalidDefinition(
                            "static partition keys must be non-empty".to_string(),
                        ));
                    }
                    if !seen.insert(key.as_str()) {
                        return Err(AssetFlowError::InvalidDefinition(format!(
                            "duplicate static partition key '{key}'"
                        )));
                    }
                }
                if keys.len() > MAX_PARTITIONS_PER_ASSET {
                    return Err(AssetFlowError::InvalidDefinition(format!(
                        "{} static partition keys exceed the limit of {MAX_PARTITIONS_PER_ASSET}",
                        keys.len()
                    )));
                }
                Ok(())
            }
            Self::TimeWindow { cadence, start } => {
                let aligned = match cadence {
                    Cadence::Hourly => start.minute() == 0 && start.second() == 0,
                    Cadence::Daily => start.time() == chrono::NaiveTime::MIN,
                };
                if aligned && start.nanosecond() == 0 {
                    Ok(())
                } else {
                    Err(AssetFlowError::InvalidDefinition(format!(
                        "time window start {start} is not aligned to a {cadence:?} boundary"
                    )))
                }
            }
        }
    }

    /// Returns true for time-window definitions.
    #[must_use]
    pub fn is_time_window(&self) -> bool {
        matches!(self, Self::TimeWindow { .. })
    }

    /// All partition keys that exist at `now`, in definition order.
    pub fn partition_keys(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        match self {
            Self::Static { keys } => Ok(keys.clone()),
            Self::TimeWindow { cadence, start } => {
                let step = cadence.seconds();
                let elapsed = now.timestamp().saturating_sub(start.and_utc().timestamp());
                let count = elapsed.div_euclid(step).max(0);
                let count = usize::try_from(count).unwrap_or(usize::MAX);
                if count > MAX_PARTITIONS_PER_ASSET {
                    return Err(AssetFlowError::InvalidDefinition(format!(
                        "time window definition starting {start} has {count} partitions, limit is {MAX_PARTITIONS_PER_ASSET}"
                    )));
                }
                (0..count as i64)
                    .map(|index| self.key_at_index(*cadence, *start, index))
                    .collect()
            }
        }
    }

    /// The universe of this definition at `now`.
    pub fn universe(&self, now: DateTime<Utc>) -> Result<PartitionUniverse> {
        Ok(PartitionUniverse::Partitioned(
            self.partition_keys(now)?.into_iter().collect(),
        ))
    }

    /// The last key (in definition order) present in `universe`.
    #[must_use]
    pub fn last_key(&self, universe: &PartitionUniverse) -> Option<String> {
        let present = universe.keys()?;
        match self {
            Self::Static { keys } => keys.iter().rev().find(|k| present.contains(*k)).cloned(),
            Self::TimeWindow { .. } => present.iter().next_back().cloned(),
        }
    }

    /// `[start, end)` of a time-window key as Unix seconds.
    pub fn window(&self, key: &str) -> Result<(i64, i64)> {
        let Self::TimeWindow { cadence, start } = self else {
            return Err(AssetFlowError::InvalidPartitionKey(format!(
                "'{key}' is not a time window key"
            )));
        };
        let parsed = match cadence {
            Cadence::Daily => NaiveDate::parse_from_str(key, DAILY_FORMAT)
                .map(|date| date.and_time(chrono::NaiveTime::MIN)),
            Cadence::Hourly => NaiveDateTime::parse_from_str(key, HOURLY_FORMAT),
        }
        .map_err(|e| AssetFlowError::InvalidPartitionKey(format!("'{key}': {e}")))?;

        let step = cadence.seconds();
        let window_start = parsed.and_utc().timestamp();
        let offset = window_start.saturating_sub(start.and_utc().timestamp());
        if offset < 0 || offset.rem_euclid(step) != 0 {
            return Err(AssetFlowError::InvalidPartitionKey(format!(
                "'{key}' is outside the windows starting at {start}"
            )));
        }
        Ok((window_start, window_start.saturating_add(step)))
    }

    /// Keys of the windows overlapping `[lo, hi)` (Unix seconds), clipped to
    /// windows at or after `start`. Existence at a given time is not checked.
    pub fn keys_overlapping(&self, lo: i64, hi: i64) -> Result<Vec<String>> {
        let Self::TimeWindow { cadence, start } = self else {
            return Err(AssetFlowError::PartitionMappingFailed(
                "time range lookup on a static partitions definition".to_string(),
            ));
        };
        if lo >= hi {
            return Ok(Vec::new());
        }
        let step = cadence.seconds();
        let anchor = start.and_utc().timestamp();
        let first = lo.saturating_sub(anchor).div_euclid(step).max(0);
        let last = hi.saturating_sub(anchor).saturating_sub(1).div_euclid(step);
        if last < first {
            return Ok(Vec::new());
        }
        if last.saturating_sub(first) >= MAX_PARTITIONS_PER_ASSET as i64 {
            return Err(AssetFlowError::PartitionMappingFailed(format!(
                "time range spans more than {MAX_PARTITIONS_PER_ASSET} windows"
            )));
        }
        (first..=last)
            .map(|index| self.key_at_index(*cadence, *start, index))
            .collect()
    }

    fn key_at_index(&self, cadence: Cadence, start: NaiveDateTime, index: i64) -> Result<String> {
        let offset = chrono::TimeDelta::try_seconds(index.saturating_mul(cadence.seconds()))
            .ok_or_else(|| {
                AssetFlowError::InvalidPartitionKey(format!("window index {index} out of range"))
            })?;
        let window_start = start.checked_add_signed(offset).ok_or_else(|| {
            AssetFlowError::InvalidPartitionKey(format!("window index {index} out of range"))
        })?;
        let format = match cadence {
            Cadence::Daily => DAILY_FORMAT,
            Cadence::Hourly => HOURLY_FORMAT,
        };
        Ok(window_start.format(format).to_string())
    }
}

// =============================================================================
// PARTITION UNIVERSE
// =============================================================================

/// Every partition of one asset at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionUniverse {
    Unpartitioned,
    Partitioned(BTreeSet<String>),
}

impl PartitionUniverse {
    /// Universe of an asset with the given (optional) definition.
    pub fn for_definition(
        partitions_def: Option<&PartitionsDefinition>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        match partitions_def {
            None => Ok(Self::Unpartitioned),
            Some(def) => def.universe(now),
        }
    }

    #[must_use]
    pub fn is_partitioned(&self) -> bool {
        matches!(self, Self::Partitioned(_))
    }

    /// The key set, for partitioned universes.
    #[must_use]
    pub fn keys(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Unpartitioned => None,
            Self::Partitioned(keys) => Some(keys),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys().is_some_and(|keys| keys.contains(key))
    }
}

// =============================================================================
// PARTITION MAPPINGS
// =============================================================================

/// How the partitions of a child asset depend on those of one parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionMapping {
    /// Same key on both sides.
    Identity,
    /// Child window shifted by whole parent windows.
    TimeWindow {
        #[serde(default)]
        start_offset: i64,
        #[serde(default)]
        end_offset: i64,
    },
    /// Every child partition reads every parent partition.
    AllPartitions,
    /// Every child partition reads the latest parent partition.
    LastPartition,
    /// Explicit parent key to child keys table.
    Static {
        downstream_by_upstream: BTreeMap<String, BTreeSet<String>>,
    },
}

/// Partition context of both ends of one dependency edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgePartitions<'a> {
    pub child_def: Option<&'a PartitionsDefinition>,
    pub child_universe: &'a PartitionUniverse,
    pub parent_def: Option<&'a PartitionsDefinition>,
    pub parent_universe: &'a PartitionUniverse,
}

impl PartitionMapping {
    /// Identity and time-window mappings keep parent and child aligned
    /// closely enough to run together.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        matches!(self, Self::Identity | Self::TimeWindow { .. })
    }

    /// Parent partitions read by `child_subset`.
    pub fn upstream_subset(
        &self,
        child_subset: &AssetSubset,
        edge: &EdgePartitions<'_>,
    ) -> Result<AssetSubset> {
        let parent_universe = edge.parent_universe;
        let child_universe = edge.child_universe;
        match self {
            Self::Identity => identity(child_subset, child_universe, parent_universe),
            Self::AllPartitions => Ok(AssetSubset::from_bool(
                !child_subset.is_empty(child_universe),
            )
            .canonical(parent_universe)),
            Self::LastPartition => {
                if child_subset.is_empty(child_universe) {
                    return Ok(AssetSubset::Empty);
                }
                match (edge.parent_def, parent_universe) {
                    (_, PartitionUniverse::Unpartitioned) => Ok(AssetSubset::All),
                    (Some(def), universe) => Ok(def
                        .last_key(universe)
                        .map(|key| AssetSubset::from_keys([key]).canonical(universe))
                        .unwrap_or(AssetSubset::Empty)),
                    (None, _) => Err(mapping_error("last partition of an unpartitioned parent")),
                }
            }
            Self::TimeWindow {
                start_offset,
                end_offset,
            } => {
                let (child_def, parent_def) = time_window_defs(edge)?;
                let parent_step = time_window_step(parent_def);
                let mut keys = BTreeSet::new();
                for key in child_subset.keys(child_universe) {
                    let (start, end) = child_def.window(&key)?;
                    let lo = start.saturating_add(start_offset.saturating_mul(parent_step));
                    let hi = end.saturating_add(end_offset.saturating_mul(parent_step));
                    keys.extend(parent_def.keys_overlapping(lo, hi)?);
                }
                Ok(AssetSubset::Partitions(keys).canonical(parent_universe))
            }
            Self::Static {
                downstream_by_upstream,
            } => {
                require_partitioned(edge)?;
                let child_keys = child_subset.keys(child_universe);
                let keys = downstream_by_upstream
                    .iter()
                    .filter(|(_, downstream)| !downstream.is_disjoint(&child_keys))
                    .map(|(upstream, _)| upstream.clone())
                    .collect();
                Ok(AssetSubset::Partitions(keys).canonical(parent_universe))
            }
        }
    }

    /// Child partitions that read at least one partition of `parent_subset`.
    pub fn downstream_subset(
        &self,
        parent_subset: &AssetSubset,
        edge: &EdgePartitions<'_>,
    ) -> Result<AssetSubset> {
        let parent_universe = edge.parent_universe;
        let child_universe = edge.child_universe;
        match self {
            Self::Identity => identity(parent_subset, parent_universe, child_universe),
            Self::AllPartitions => Ok(AssetSubset::from_bool(
                !parent_subset.is_empty(parent_universe),
            )
            .canonical(child_universe)),
            Self::LastPartition => {
                let holds = match (edge.parent_def, parent_universe) {
                    (_, PartitionUniverse::Unpartitioned) => {
                        parent_subset.is_all(parent_universe)
                    }
                    (Some(def), universe) => def
                        .last_key(universe)
                        .is_some_and(|key| parent_subset.contains(Some(&key), universe)),
                    (None, _) => {
                        return Err(mapping_error("last partition of an unpartitioned parent"));
                    }
                };
                Ok(AssetSubset::from_bool(holds).canonical(child_universe))
            }
            Self::TimeWindow {
                start_offset,
                end_offset,
            } => {
                let (child_def, parent_def) = time_window_defs(edge)?;
                let parent_step = time_window_step(parent_def);
                let mut keys = BTreeSet::new();
                for key in parent_subset.keys(parent_universe) {
                    let (start, end) = parent_def.window(&key)?;
                    let lo = start.saturating_sub(end_offset.saturating_mul(parent_step));
                    let hi = end.saturating_sub(start_offset.saturating_mul(parent_step));
                    keys.extend(child_def.keys_overlapping(lo, hi)?);
                }
                Ok(AssetSubset::Partitions(keys).canonical(child_universe))
            }
            Self::Static {
                downstream_by_upstream,
            } => {
                require_partitioned(edge)?;
                let keys = parent_subset
                    .keys(parent_universe)
                    .iter()
                    .filter_map(|upstream| downstream_by_upstream.get(upstream))
                    .flatten()
                    .cloned()
                    .collect();
                Ok(AssetSubset::Partitions(keys).canonical(child_universe))
            }
        }
    }
}

/// Mapping used for an edge that declares none.
///
/// - both unpartitioned: `Identity`
/// - both time-windowed: `TimeWindow { 0, 0 }`
/// - identical definitions: `Identity`
/// - anything else: `AllPartitions`
#[must_use]
pub fn infer_partition_mapping(
    child_def: Option<&PartitionsDefinition>,
    parent_def: Option<&PartitionsDefinition>,
) -> PartitionMapping {
    match (child_def, parent_def) {
        (None, None) => PartitionMapping::Identity,
        (Some(child), Some(parent)) if child.is_time_window() && parent.is_time_window() => {
            PartitionMapping::TimeWindow {
                start_offset: 0,
                end_offset: 0,
            }
        }
        (Some(child), Some(parent)) if child == parent => PartitionMapping::Identity,
        _ => PartitionMapping::AllPartitions,
    }
}

fn identity(
    subset: &AssetSubset,
    from: &PartitionUniverse,
    to: &PartitionUniverse,
) -> Result<AssetSubset> {
    match (from, to) {
        (PartitionUniverse::Unpartitioned, PartitionUniverse::Unpartitioned) => {
            Ok(subset.canonical(to))
        }
        (PartitionUniverse::Partitioned(_), PartitionUniverse::Partitioned(_)) => {
            Ok(AssetSubset::Partitions(subset.keys(from)).canonical(to))
        }
        _ => Err(mapping_error(
            "identity mapping between partitioned and unpartitioned assets",
        )),
    }
}

fn time_window_defs<'a>(
    edge: &EdgePartitions<'a>,
) -> Result<(&'a PartitionsDefinition, &'a PartitionsDefinition)> {
    match (edge.child_def, edge.parent_def) {
        (Some(child), Some(parent)) if child.is_time_window() && parent.is_time_window() => {
            Ok((child, parent))
        }
        _ => Err(mapping_error(
            "time window mapping requires time-window partitions on both assets",
        )),
    }
}

fn time_window_step(def: &PartitionsDefinition) -> i64 {
    match def {
        PartitionsDefinition::TimeWindow { cadence, .. } => cadence.seconds(),
        PartitionsDefinition::Static { .. } => 0,
    }
}

fn require_partitioned(edge: &EdgePartitions<'_>) -> Result<()> {
    if edge.child_universe.is_partitioned() && edge.parent_universe.is_partitioned() {
        Ok(())
    } else {
        Err(mapping_error(
            "static mapping requires partitions on both assets",
        ))
    }
}

fn mapping_error(reason: &str) -> AssetFlowError {
    AssetFlowError::PartitionMappingFailed(reason.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
