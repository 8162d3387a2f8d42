//! # Status File
//!
//! JSON description of materializations and runs, read by `tick`:
//!
//! ```json
//! {
//!   "materializations": [{ "asset": "raw/orders", "at": "2024-01-02T00:00:00Z" }],
//!   "in_progress": [{ "asset": "warehouse/orders", "partition": "2024-01-01" }],
//!   "failed": []
//! }
//! ```
//!
//! A missing `partition` addresses an unpartitioned asset.

use assetflow_core::{AssetFlowError, AssetKey, StatusSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

type Result<T> = std::result::Result<T, AssetFlowError>;

/// Maximum status file size (64 MB).
const MAX_STATUS_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// A materialization or observation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationJson {
    pub asset: String,
    #[serde(default)]
    pub partition: Option<String>,
    pub at: DateTime<Utc>,
}

/// A partition in a run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionJson {
    pub asset: String,
    #[serde(default)]
    pub partition: Option<String>,
}

/// The whole status file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusFile {
    pub materializations: Vec<MaterializationJson>,
    pub in_progress: Vec<PartitionJson>,
    pub failed: Vec<PartitionJson>,
}

impl StatusFile {
    /// Read and parse a status file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|e| AssetFlowError::IoError(format!("Cannot read file metadata: {e}")))?;
        if metadata.len() > MAX_STATUS_FILE_SIZE {
            return Err(AssetFlowError::StatusUnavailable(format!(
                "File size {} bytes exceeds maximum allowed {MAX_STATUS_FILE_SIZE} bytes",
                metadata.len()
            )));
        }
        let contents = std::fs::read(path)
            .map_err(|e| AssetFlowError::IoError(format!("Read status file: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &[u8]) -> Result<Self> {
        serde_json::from_slice(contents)
            .map_err(|e| AssetFlowError::StatusUnavailable(format!("Invalid status file: {e}")))
    }

    /// Build the in-memory provider used by the evaluator.
    pub fn to_snapshot(&self) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::new();
        for event in &self.materializations {
            snapshot.record_update(
                &AssetKey::from_user_string(&event.asset),
                event.partition.as_deref(),
                event.at,
            );
        }
        for entry in &self.in_progress {
            snapshot.mark_in_progress(
                &AssetKey::from_user_string(&entry.asset),
                entry.partition.as_deref(),
            );
        }
        for entry in &self.failed {
            snapshot.mark_failed(
                &AssetKey::from_user_string(&entry.asset),
                entry.partition.as_deref(),
            );
        }
        snapshot
    }
}
