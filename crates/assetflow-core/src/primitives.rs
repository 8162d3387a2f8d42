//! # Engine Primitives
//!
//! Hardcoded constants for graph construction, evaluation and persistence.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Magic bytes for the evaluation snapshot header.
///
/// - Snapshot = Magic Bytes ("AFES") + Version (u8) + postcard payload.
pub const MAGIC_BYTES: &[u8; 4] = b"AFES";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to `AssetEvaluationState`.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum nesting of execution subgraphs followed during flattening.
///
/// Wiring deeper than this is reported as a flattening failure rather
/// than walked.
pub const MAX_SUBGRAPH_DEPTH: usize = 64;

/// Maximum depth of a condition tree.
pub const MAX_CONDITION_DEPTH: usize = 64;

/// Maximum number of partitions a single definition may enumerate.
///
/// Time-window definitions with a start far in the past are rejected
/// once they would exceed this many windows.
pub const MAX_PARTITIONS_PER_ASSET: usize = 100_000;

/// Maximum size of a single encoded evaluation snapshot (16 MB).
pub const MAX_SNAPSHOT_SIZE: usize = 16 * 1024 * 1024;

/// Metadata key marking a node synthesized for a dangling dependency.
pub const AUTO_CREATED_STUB_METADATA_KEY: &str = "assetflow/auto_created_stub_asset";

/// Group name used when a spec declares none.
pub const DEFAULT_GROUP_NAME: &str = "default";

/// Output name of single-output generated nodes.
pub const DEFAULT_OUTPUT_NAME: &str = "result";
