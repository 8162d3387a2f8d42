//! # assetflow-core
//!
//! The asset graph and automation engine of assetflow - THE LOGIC.
//!
//! This crate turns a set of asset definitions into an immutable dependency
//! graph, and evaluates declarative automation conditions over that graph
//! once per tick to decide which assets (and partitions) should run.
//!
//! ## Layers
//!
//! - `definition` / `node_def` / `resolution` → what the user declares
//! - `graph` → construction, lookups, execution sets, same-run checks
//! - `condition` / `evaluation` → condition trees and the tick evaluator
//! - `formats` / `storage` → evaluation snapshots across ticks
//! - `planning` → requested subsets to run requests
//!
//! ## Architectural Constraints
//!
//! - Deterministic: every index is a `BTreeMap`/`BTreeSet`, so the same
//!   definitions give the same graph in any input order
//! - Immutable after build: the graph is `Send + Sync` and read-only
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod condition;
pub mod definition;
pub mod evaluation;
pub mod formats;
pub mod graph;
pub mod node_def;
pub mod partitions;
pub mod planning;
pub mod primitives;
pub mod resolution;
pub mod storage;
pub mod subset;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AssetCheckKey, AssetFlowError, AssetKey, EntityKey, NodeHandle, NodeInputHandle,
    NodeOutputHandle, Result,
};

// =============================================================================
// RE-EXPORTS: Definitions & Graph
// =============================================================================

pub use definition::{
    AssetCheckSpec, AssetChecksDefinition, AssetInput, AssetLike, AssetSpec, AssetsDefinition,
    AssetsDefinitionBuilder, ExecutionType, SourceAsset,
};
pub use graph::{AssetGraph, AssetNode, materializable_in_same_run};
pub use node_def::{GraphDefinition, NodeDefinition, OpDefinition};
pub use partitions::{Cadence, PartitionMapping, PartitionUniverse, PartitionsDefinition};
pub use subset::AssetSubset;

// =============================================================================
// RE-EXPORTS: Automation
// =============================================================================

pub use condition::{Condition, ConditionId};
pub use evaluation::{
    AssetEvaluationState, CancelToken, ConditionNodeState, ConditionResult, StatusProvider,
    StatusSnapshot, TickEvaluator, TickResult,
};
pub use planning::{RunRequest, build_run_requests};

// =============================================================================
// RE-EXPORTS: Persistence
// =============================================================================

pub use formats::{PersistenceHeader, state_from_bytes, state_to_bytes};
pub use storage::{EvaluationStateStore, MemoryStateStore, RedbStateStore};
