//! # Automation Conditions
//!
//! Composable, serializable boolean expressions over partition subsets.
//!
//! Operands read facts about one asset (missing, in progress, updated since a
//! cron boundary, ...). Operators combine operands (`and`, `or`, `not`),
//! lift them over dependencies (`all_deps`, `any_deps`), or remember a
//! trigger until a reset fires (`trigger_since_target`).
//!
//! Every node of a tree has a structural `ConditionId` derived from its path
//! from the root and its kind, so results of the previous tick can be matched
//! to the same node on the next one.

mod schedule;

pub use schedule::{parse_cron, previous_cron_boundary};

use crate::primitives::MAX_CONDITION_DEPTH;
use crate::types::{AssetFlowError, AssetKey, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

// =============================================================================
// CONDITION TREE
// =============================================================================

/// A node of an automation condition tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Partitions that have never been materialized.
    Missing,
    /// Partitions of an in-flight run.
    InProgress,
    /// Partitions whose latest run failed.
    ExecutionFailed,
    /// Partitions with a parent updated more recently than themselves.
    ParentNewer,
    /// Partitions updated since the previous evaluation.
    NewlyUpdated,
    /// Partitions updated since the latest boundary of `cron_schedule`.
    UpdatedSinceCron { cron_schedule: String },
    /// Partitions requested on the previous tick.
    RequestedPreviousTick,
    /// Partitions already requested earlier in the current tick.
    RequestedThisTick,
    /// The latest time window (or the windows ending inside the lookback).
    InLatestTimeWindow {
        #[serde(default)]
        lookback_seconds: Option<i64>,
    },
    And { operands: Vec<Condition> },
    Or { operands: Vec<Condition> },
    Not { operand: Box<Condition> },
    /// `operand` holds for every parent.
    AllDeps { operand: Box<Condition> },
    /// `operand` holds for at least one parent.
    AnyDeps { operand: Box<Condition> },
    /// True from the tick `trigger` fires until the tick `reset` fires.
    TriggerSinceTarget {
        trigger: Box<Condition>,
        reset: Box<Condition>,
    },
}

impl Condition {
    #[must_use]
    pub fn missing() -> Self {
        Self::Missing
    }

    #[must_use]
    pub fn in_progress() -> Self {
        Self::InProgress
    }

    #[must_use]
    pub fn execution_failed() -> Self {
        Self::ExecutionFailed
    }

    #[must_use]
    pub fn parent_newer() -> Self {
        Self::ParentNewer
    }

    #[must_use]
    pub fn newly_updated() -> Self {
        Self::NewlyUpdated
    }

    #[must_use]
    pub fn updated_since_cron(cron_schedule: impl Into<String>) -> Self {
        Self::UpdatedSinceCron {
            cron_schedule: cron_schedule.into(),
        }
    }

    #[must_use]
    pub fn requested_previous_tick() -> Self {
        Self::RequestedPreviousTick
    }

    #[must_use]
    pub fn requested_this_tick() -> Self {
        Self::RequestedThisTick
    }

    #[must_use]
    pub fn in_latest_time_window(lookback_seconds: Option<i64>) -> Self {
        Self::InLatestTimeWindow { lookback_seconds }
    }

    #[must_use]
    pub fn all_deps_match(operand: Self) -> Self {
        Self::AllDeps {
            operand: Box::new(operand),
        }
    }

    #[must_use]
    pub fn any_deps_match(operand: Self) -> Self {
        Self::AnyDeps {
            operand: Box::new(operand),
        }
    }

    /// True from the tick `self` fires until the tick `reset` fires.
    #[must_use]
    pub fn since(self, reset: Self) -> Self {
        Self::TriggerSinceTarget {
            trigger: Box::new(self),
            reset: Box::new(reset),
        }
    }

    /// Request missing partitions and partitions whose parents updated,
    /// once per trigger, while no parent is missing or running.
    #[must_use]
    pub fn eager() -> Self {
        Self::in_latest_time_window(None)
            & (Self::missing() | Self::any_deps_match(Self::newly_updated()))
                .since(Self::requested_previous_tick() | Self::newly_updated())
            & !Self::any_deps_match(Self::missing())
            & !Self::any_deps_match(Self::in_progress())
            & !Self::in_progress()
    }

    /// Short label naming the node kind and its parameters.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Missing => "missing".to_string(),
            Self::InProgress => "in_progress".to_string(),
            Self::ExecutionFailed => "execution_failed".to_string(),
            Self::ParentNewer => "parent_newer".to_string(),
            Self::NewlyUpdated => "newly_updated".to_string(),
            Self::UpdatedSinceCron { cron_schedule } => {
                format!("updated_since_cron({cron_schedule})")
            }
            Self::RequestedPreviousTick => "requested_previous_tick".to_string(),
            Self::RequestedThisTick => "requested_this_tick".to_string(),
            Self::InLatestTimeWindow { lookback_seconds } => match lookback_seconds {
                Some(seconds) => format!("in_latest_time_window({seconds}s)"),
                None => "in_latest_time_window".to_string(),
            },
            Self::And { .. } => "and".to_string(),
            Self::Or { .. } => "or".to_string(),
            Self::Not { .. } => "not".to_string(),
            Self::AllDeps { .. } => "all_deps".to_string(),
            Self::AnyDeps { .. } => "any_deps".to_string(),
            Self::TriggerSinceTarget { .. } => "trigger_since_target".to_string(),
        }
    }

    /// Returns true for nodes that persist memory between ticks.
    #[must_use]
    pub fn is_stateful(&self) -> bool {
        matches!(self, Self::TriggerSinceTarget { .. })
    }

    /// Direct children paired with their structural label.
    ///
    /// Dependency operators have no static children: their operand is
    /// labelled per parent at evaluation time (see `dep_label`).
    #[must_use]
    pub fn labelled_children(&self) -> Vec<(String, &Self)> {
        match self {
            Self::And { operands } | Self::Or { operands } => operands
                .iter()
                .enumerate()
                .map(|(index, operand)| (index.to_string(), operand))
                .collect(),
            Self::Not { operand } => vec![("operand".to_string(), operand.as_ref())],
            Self::TriggerSinceTarget { trigger, reset } => vec![
                ("trigger".to_string(), trigger.as_ref()),
                ("reset".to_string(), reset.as_ref()),
            ],
            _ => Vec::new(),
        }
    }

    /// Check the tree is well formed: bounded depth, non-empty operand
    /// lists, parseable cron schedules, non-negative lookbacks.
    pub fn validate(&self) -> Result<()> {
        self.validate_at(1)
    }

    fn validate_at(&self, depth: usize) -> Result<()> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(AssetFlowError::InvalidCondition(format!(
                "condition tree deeper than {MAX_CONDITION_DEPTH}"
            )));
        }
        match self {
            Self::And { operands } | Self::Or { operands } => {
                if operands.is_empty() {
                    return Err(AssetFlowError::InvalidCondition(format!(
                        "'{}' needs at least one operand",
                        self.name()
                    )));
                }
                for operand in operands {
                    operand.validate_at(depth + 1)?;
                }
                Ok(())
            }
            Self::Not { operand } | Self::AllDeps { operand } | Self::AnyDeps { operand } => {
                operand.validate_at(depth + 1)
            }
            Self::TriggerSinceTarget { trigger, reset } => {
                trigger.validate_at(depth + 1)?;
                reset.validate_at(depth + 1)
            }
            Self::UpdatedSinceCron { cron_schedule } => parse_cron(cron_schedule).map(|_| ()),
            Self::InLatestTimeWindow {
                lookback_seconds: Some(seconds),
            } if *seconds < 0 => Err(AssetFlowError::InvalidCondition(format!(
                "negative lookback of {seconds} seconds"
            ))),
            _ => Ok(()),
        }
    }

    /// Hash of the whole tree. Changes whenever any node or parameter changes.
    #[must_use]
    pub fn signature(&self) -> String {
        blake3::hash(self.to_string().as_bytes()).to_hex().to_string()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        match self {
            Self::AllDeps { operand } | Self::AnyDeps { operand } => write!(f, "({operand})"),
            _ => {
                let children = self.labelled_children();
                if children.is_empty() {
                    return Ok(());
                }
                f.write_str("(")?;
                for (index, (_, child)) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl BitAnd for Condition {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::And { mut operands }, Self::And { operands: more }) => {
                operands.extend(more);
                Self::And { operands }
            }
            (Self::And { mut operands }, other) => {
                operands.push(other);
                Self::And { operands }
            }
            (lhs, rhs) => Self::And {
                operands: vec![lhs, rhs],
            },
        }
    }
}

impl BitOr for Condition {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Self::Or { mut operands }, Self::Or { operands: more }) => {
                operands.extend(more);
                Self::Or { operands }
            }
            (Self::Or { mut operands }, other) => {
                operands.push(other);
                Self::Or { operands }
            }
            (lhs, rhs) => Self::Or {
                operands: vec![lhs, rhs],
            },
        }
    }
}

impl Not for Condition {
    type Output = Self;

    fn not(self) -> Self {
        Self::Not {
            operand: Box::new(self),
        }
    }
}

// =============================================================================
// STRUCTURAL IDENTIFIERS
// =============================================================================

/// Stable identifier of a node within a condition tree.
///
/// `blake3(parent id, child label, node name)`, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConditionId(pub String);

impl ConditionId {
    /// Identifier of a tree root.
    #[must_use]
    pub fn root(condition: &Condition) -> Self {
        Self::derive(None, "root", condition)
    }

    /// Identifier of a child reached through `label`.
    #[must_use]
    pub fn child(&self, label: &str, condition: &Condition) -> Self {
        Self::derive(Some(self), label, condition)
    }

    fn derive(parent: Option<&Self>, label: &str, condition: &Condition) -> Self {
        let mut hasher = blake3::Hasher::new();
        if let Some(parent) = parent {
            hasher.update(parent.0.as_bytes());
        }
        hasher.update(&[0]);
        hasher.update(label.as_bytes());
        hasher.update(&[0]);
        hasher.update(condition.name().as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}

/// Label of a dependency operator's operand evaluated for `parent`.
#[must_use]
pub fn dep_label(parent: &AssetKey) -> String {
    format!("dep:{parent}")
}

// =============================================================================
// TESTS
// =============================================================================
