//! # Asset Subsets
//!
//! Partition-aware sets over a single asset's partition universe.
//!
//! A subset is either a sentinel (`All`, `Empty`) or an explicit key set.
//! Every operation takes the universe it is evaluated against and returns
//! the canonical form:
//! - an empty key set becomes `Empty`
//! - a key set equal to the whole universe becomes `All`
//! - keys outside the universe are dropped
//!
//! For unpartitioned assets the universe holds a single implicit element,
//! so the algebra degenerates to booleans.

use crate::partitions::PartitionUniverse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A set of partitions of one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AssetSubset {
    #[default]
    Empty,
    All,
    Partitions(BTreeSet<String>),
}

impl AssetSubset {
    /// Subset holding exactly the given keys.
    #[must_use]
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Partitions(keys.into_iter().map(Into::into).collect())
    }

    /// `All` when `value` is true, `Empty` otherwise.
    #[must_use]
    pub fn from_bool(value: bool) -> Self {
        if value { Self::All } else { Self::Empty }
    }

    /// Explicit keys of this subset within a partitioned universe.
    ///
    /// Returns an empty set for unpartitioned universes.
    #[must_use]
    pub fn keys(&self, universe: &PartitionUniverse) -> BTreeSet<String> {
        let Some(all_keys) = universe.keys() else {
            return BTreeSet::new();
        };
        match self {
            Self::Empty => BTreeSet::new(),
            Self::All => all_keys.clone(),
            Self::Partitions(keys) => keys.intersection(all_keys).cloned().collect(),
        }
    }

    /// Canonical form relative to `universe`.
    #[must_use]
    pub fn canonical(&self, universe: &PartitionUniverse) -> Self {
        match universe {
            PartitionUniverse::Unpartitioned => match self {
                Self::All => Self::All,
                Self::Empty | Self::Partitions(_) => Self::Empty,
            },
            PartitionUniverse::Partitioned(all_keys) => {
                let keys = self.keys(universe);
                if keys.is_empty() {
                    Self::Empty
                } else if keys.len() == all_keys.len() {
                    Self::All
                } else {
                    Self::Partitions(keys)
                }
            }
        }
    }

    /// Returns true if no partition is selected.
    #[must_use]
    pub fn is_empty(&self, universe: &PartitionUniverse) -> bool {
        matches!(self.canonical(universe), Self::Empty)
    }

    /// Returns true if every partition is selected.
    #[must_use]
    pub fn is_all(&self, universe: &PartitionUniverse) -> bool {
        matches!(self.canonical(universe), Self::All)
    }

    /// Number of selected partitions. An unpartitioned `All` counts as one.
    #[must_use]
    pub fn size(&self, universe: &PartitionUniverse) -> usize {
        match universe {
            PartitionUniverse::Unpartitioned => usize::from(self.is_all(universe)),
            PartitionUniverse::Partitioned(_) => self.keys(universe).len(),
        }
    }

    /// Membership test. `None` addresses the single element of an unpartitioned asset.
    #[must_use]
    pub fn contains(&self, partition: Option<&str>, universe: &PartitionUniverse) -> bool {
        match (universe, partition) {
            (PartitionUniverse::Unpartitioned, None) => matches!(self, Self::All),
            (PartitionUniverse::Partitioned(all_keys), Some(key)) => {
                all_keys.contains(key)
                    && match self {
                        Self::Empty => false,
                        Self::All => true,
                        Self::Partitions(keys) => keys.contains(key),
                    }
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn intersection(&self, other: &Self, universe: &PartitionUniverse) -> Self {
        match (self, other) {
            (Self::Empty, _) | (_, Self::Empty) => Self::Empty,
            (Self::All, x) | (x, Self::All) => x.canonical(universe),
            (Self::Partitions(a), Self::Partitions(b)) => {
                Self::Partitions(a.intersection(b).cloned().collect()).canonical(universe)
            }
        }
    }

    #[must_use]
    pub fn union(&self, other: &Self, universe: &PartitionUniverse) -> Self {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All.canonical(universe),
            (Self::Empty, x) | (x, Self::Empty) => x.canonical(universe),
            (Self::Partitions(a), Self::Partitions(b)) => {
                Self::Partitions(a.union(b).cloned().collect()).canonical(universe)
            }
        }
    }

    /// `self − other`.
    #[must_use]
    pub fn difference(&self, other: &Self, universe: &PartitionUniverse) -> Self {
        match universe {
            PartitionUniverse::Unpartitioned => {
                Self::from_bool(self.is_all(universe) && !other.is_all(universe))
            }
            PartitionUniverse::Partitioned(_) => {
                let removed = other.keys(universe);
                Self::Partitions(
                    self.keys(universe)
                        .into_iter()
                        .filter(|key| !removed.contains(key))
                        .collect(),
                )
                .canonical(universe)
            }
        }
    }

    /// `universe − self`.
    #[must_use]
    pub fn complement(&self, universe: &PartitionUniverse) -> Self {
        Self::All.difference(self, universe)
    }

    /// Canonical equality relative to `universe`.
    #[must_use]
    pub fn equivalent(&self, other: &Self, universe: &PartitionUniverse) -> bool {
        self.canonical(universe) == other.canonical(universe)
    }

    /// Builds a subset of `candidate` holding the partitions accepted by `predicate`.
    ///
    /// Stops at the first predicate error.
    pub fn filter<F, E>(
        candidate: &Self,
        universe: &PartitionUniverse,
        mut predicate: F,
    ) -> Result<Self, E>
    where
        F: FnMut(Option<&str>) -> Result<bool, E>,
    {
        match universe {
            PartitionUniverse::Unpartitioned => {
                if candidate.is_all(universe) {
                    Ok(Self::from_bool(predicate(None)?))
                } else {
                    Ok(Self::Empty)
                }
            }
            PartitionUniverse::Partitioned(_) => {
                let mut selected = BTreeSet::new();
                for key in candidate.keys(universe) {
                    if predicate(Some(&key))? {
                        selected.insert(key);
                    }
                }
                Ok(Self::Partitions(selected).canonical(universe))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn universe(keys: &[&str]) -> PartitionUniverse {
        PartitionUniverse::Partitioned(keys.iter().map(|k| (*k).to_string()).collect())
    }

    #[test]
    fn canonical_collapses_full_and_empty_sets() {
        let u = universe(&["a", "b"]);
        assert_eq!(AssetSubset::from_keys(["a", "b"]).canonical(&u), AssetSubset::All);
        assert_eq!(AssetSubset::from_keys(["z"]).canonical(&u), AssetSubset::Empty);
        assert_eq!(
            AssetSubset::from_keys(["a", "z"]).canonical(&u),
            AssetSubset::from_keys(["a"])
        );
    }

    #[test]
    fn unpartitioned_algebra_is_boolean() {
        let u = PartitionUniverse::Unpartitioned;
        assert_eq!(AssetSubset::All.complement(&u), AssetSubset::Empty);
        assert_eq!(AssetSubset::Empty.complement(&u), AssetSubset::All);
        assert_eq!(
            AssetSubset::All.intersection(&AssetSubset::Empty, &u),
            AssetSubset::Empty
        );
        assert_eq!(AssetSubset::All.size(&u), 1);
        assert!(AssetSubset::All.contains(None, &u));
        assert!(!AssetSubset::All.contains(Some("a"), &u));
    }

    #[test]
    fn difference_and_complement() {
        let u = universe(&["a", "b", "c"]);
        let ab = AssetSubset::from_keys(["a", "b"]);
        assert_eq!(
            AssetSubset::All.difference(&ab, &u),
            AssetSubset::from_keys(["c"])
        );
        assert_eq!(ab.complement(&u), AssetSubset::from_keys(["c"]));
        assert_eq!(AssetSubset::All.complement(&u), AssetSubset::Empty);
    }

    #[test]
    fn union_reaching_universe_is_all() {
        let u = universe(&["a", "b"]);
        let a = AssetSubset::from_keys(["a"]);
        let b = AssetSubset::from_keys(["b"]);
        assert_eq!(a.union(&b, &u), AssetSubset::All);
        assert!(a.union(&b, &u).is_all(&u));
    }

    #[test]
    fn empty_partitioned_universe_makes_all_empty() {
        let u = universe(&[]);
        assert!(AssetSubset::All.is_empty(&u));
        assert_eq!(AssetSubset::All.size(&u), 0);
    }

    #[test]
    fn filter_selects_matching_partitions() {
        let u = universe(&["1", "2", "3"]);
        let result: Result<AssetSubset, ()> =
            AssetSubset::filter(&AssetSubset::All, &u, |key| Ok(key != Some("2")));
        assert_eq!(result, Ok(AssetSubset::from_keys(["1", "3"])));

        let unpartitioned: Result<AssetSubset, ()> = AssetSubset::filter(
            &AssetSubset::Empty,
            &PartitionUniverse::Unpartitioned,
            |_| Ok(true),
        );
        assert_eq!(unpartitioned, Ok(AssetSubset::Empty));
    }
}
