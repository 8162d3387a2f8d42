//! # Snapshot Format
//!
//! Binary encoding of one `AssetEvaluationState`.
//!
//! Format: Header (5 bytes) + postcard-serialized state.
//! - 4 bytes: Magic ("AFES")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded.

use crate::evaluation::AssetEvaluationState;
use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES, MAX_SNAPSHOT_SIZE};
use crate::types::{AssetFlowError, Result};

/// Header length in bytes.
const HEADER_SIZE: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The header precedes every encoded snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if &self.magic != MAGIC_BYTES {
            return Err(AssetFlowError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(AssetFlowError::DeserializationError(format!(
                "Unsupported version: {} (expected {FORMAT_VERSION})",
                self.version
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (Some(magic), Some(version)) = (bytes.get(0..4), bytes.get(4)) else {
            return Err(AssetFlowError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut header = Self {
            magic: [0u8; 4],
            version: *version,
        };
        header.magic.copy_from_slice(magic);
        Ok(header)
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encode a snapshot (header + payload).
pub fn state_to_bytes(state: &AssetEvaluationState) -> Result<Vec<u8>> {
    let payload = postcard::to_stdvec(state)
        .map_err(|e| AssetFlowError::SerializationError(e.to_string()))?;
    if payload.len() > MAX_SNAPSHOT_SIZE {
        return Err(AssetFlowError::SerializationError(format!(
            "snapshot of {} is {} bytes, limit is {MAX_SNAPSHOT_SIZE}",
            state.asset_key,
            payload.len()
        )));
    }

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&PersistenceHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a snapshot. Size and header are checked before the payload.
pub fn state_from_bytes(bytes: &[u8]) -> Result<AssetEvaluationState> {
    if bytes.len() > HEADER_SIZE.saturating_add(MAX_SNAPSHOT_SIZE) {
        return Err(AssetFlowError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {MAX_SNAPSHOT_SIZE} bytes",
            bytes.len()
        )));
    }
    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_SIZE..).unwrap_or_default();
    postcard::from_bytes(payload).map_err(|e| {
        AssetFlowError::DeserializationError(format!("Failed to decode snapshot: {e}"))
    })
}

// =============================================================================
// TESTS
// =============================================================================
