//! # Core Type Definitions
//!
//! Identifiers shared by every layer of the asset graph:
//! - Asset and check identifiers (`AssetKey`, `AssetCheckKey`, `EntityKey`)
//! - Execution node handles (`NodeHandle`, `NodeInputHandle`, `NodeOutputHandle`)
//! - Error types (`AssetFlowError`)
//!
//! ## Ordering Guarantees
//!
//! Every identifier implements `Ord` so the graph can keep its indices in
//! `BTreeMap`/`BTreeSet` and produce identical output for any input order.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ASSET & CHECK IDENTIFIERS
// =============================================================================

/// Identifier of an asset: an ordered path of segments.
///
/// The user-facing string form joins segments with `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetKey(pub Vec<String>);

impl AssetKey {
    /// Create a key from path segments.
    #[must_use]
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(path.into_iter().map(Into::into).collect())
    }

    /// Parse the `/`-separated user string form. Empty segments are dropped.
    #[must_use]
    pub fn from_user_string(s: &str) -> Self {
        Self(
            s.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// The `/`-separated user string form.
    #[must_use]
    pub fn to_user_string(&self) -> String {
        self.0.join("/")
    }

    /// The path segments.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.0
    }

    /// All segments but the last one.
    #[must_use]
    pub fn prefix(&self) -> &[String] {
        match self.0.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    /// `prefix + self`.
    #[must_use]
    pub fn with_prefix(&self, prefix: &[String]) -> Self {
        let mut path = prefix.to_vec();
        path.extend(self.0.iter().cloned());
        Self(path)
    }

    /// Name usable for a generated execution node (`a/b` becomes `a__b`).
    #[must_use]
    pub fn to_node_name(&self) -> String {
        self.0.join("__")
    }

    /// Returns true if the key has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_user_string())
    }
}

impl From<&str> for AssetKey {
    fn from(s: &str) -> Self {
        Self::from_user_string(s)
    }
}

/// Identifier of a data-quality check attached to an asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetCheckKey {
    pub asset_key: AssetKey,
    pub name: String,
}

impl AssetCheckKey {
    #[must_use]
    pub fn new(asset_key: AssetKey, name: impl Into<String>) -> Self {
        Self {
            asset_key,
            name: name.into(),
        }
    }
}

impl fmt::Display for AssetCheckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.asset_key, self.name)
    }
}

/// Either an asset or a check. Execution sets mix both.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    Asset(AssetKey),
    Check(AssetCheckKey),
}

impl EntityKey {
    /// The asset key, for the `Asset` variant.
    #[must_use]
    pub fn as_asset(&self) -> Option<&AssetKey> {
        match self {
            Self::Asset(key) => Some(key),
            Self::Check(_) => None,
        }
    }
}

impl From<AssetKey> for EntityKey {
    fn from(key: AssetKey) -> Self {
        Self::Asset(key)
    }
}

impl From<AssetCheckKey> for EntityKey {
    fn from(key: AssetCheckKey) -> Self {
        Self::Check(key)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asset(key) => key.fmt(f),
            Self::Check(key) => key.fmt(f),
        }
    }
}

// =============================================================================
// EXECUTION NODE HANDLES
// =============================================================================

/// Path of invocation names from an outermost aliased node down to a nested step.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeHandle(pub Vec<String>);

impl NodeHandle {
    /// Handle for a top-level node.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Handle of a node invoked inside this one.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut path = self.0.clone();
        path.push(name.to_string());
        Self(path)
    }

    /// Nesting depth (1 for a top-level node).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The outermost invocation name.
    #[must_use]
    pub fn root_name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// A named input of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeInputHandle {
    pub node_handle: NodeHandle,
    pub input_name: String,
}

impl NodeInputHandle {
    #[must_use]
    pub fn new(node_handle: NodeHandle, input_name: impl Into<String>) -> Self {
        Self {
            node_handle,
            input_name: input_name.into(),
        }
    }
}

impl fmt::Display for NodeInputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[in:{}]", self.node_handle, self.input_name)
    }
}

/// A named output of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeOutputHandle {
    pub node_handle: NodeHandle,
    pub output_name: String,
}

impl NodeOutputHandle {
    #[must_use]
    pub fn new(node_handle: NodeHandle, output_name: impl Into<String>) -> Self {
        Self {
            node_handle,
            output_name: output_name.into(),
        }
    }
}

impl fmt::Display for NodeOutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[out:{}]", self.node_handle, self.output_name)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while building or evaluating an asset graph.
///
/// - Dangling dependency references are never errors (they become stubs)
/// - Library code never panics; every failure is a variant here
#[derive(Debug, Error)]
pub enum AssetFlowError {
    /// A relative dependency matched more than one defined key.
    #[error("Ambiguous dependency '{input}' in definition '{definition}': candidates {candidates:?}")]
    AmbiguousDependency {
        definition: String,
        input: String,
        candidates: Vec<String>,
    },

    /// A definition is internally inconsistent.
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// Nested execution wiring could not be resolved.
    #[error("Failed to flatten definition '{definition}': {reason}")]
    FlatteningFailed { definition: String, reason: String },

    /// The dependency graph has a cycle between distinct assets.
    #[error("Dependency cycle detected among: {0:?}")]
    CycleDetected(Vec<String>),

    /// The requested asset is not in the graph.
    #[error("Asset not found: {0}")]
    AssetNotFound(AssetKey),

    /// The requested check is not in the graph.
    #[error("Check not found: {0}")]
    CheckNotFound(AssetCheckKey),

    /// No asset or check is bound to the given output handle.
    #[error("No asset bound to output handle: {0}")]
    OutputHandleNotFound(NodeOutputHandle),

    /// A condition tree is malformed.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// A cron expression could not be parsed.
    #[error("Invalid cron schedule '{schedule}': {reason}")]
    InvalidCron { schedule: String, reason: String },

    /// A partition key does not belong to its partitions definition.
    #[error("Invalid partition key: {0}")]
    InvalidPartitionKey(String),

    /// A subset could not be translated across a dependency edge.
    #[error("Partition mapping failed: {0}")]
    PartitionMappingFailed(String),

    /// The tick was cancelled before every level finished.
    #[error("Tick {0} abandoned")]
    TickAbandoned(u64),

    /// A snapshot already exists for this asset at this tick.
    #[error("State for {asset} at tick {tick} already written")]
    StateAlreadyWritten { asset: AssetKey, tick: u64 },

    /// The status collaborator could not answer.
    #[error("Status provider error: {0}")]
    StatusUnavailable(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A project or settings file is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AssetFlowError>;

// =============================================================================
// TESTS
// =============================================================================
