//! # redb-backed State Storage
//!
//! Snapshots live in one table keyed by (encoded asset key, tick), so the
//! snapshots of one asset are contiguous and ordered by tick. A tick is
//! written in a single write transaction; a failed commit leaves nothing
//! behind.

use super::{EvaluationStateStore, decode_or_cold_start};
use crate::evaluation::AssetEvaluationState;
use crate::formats::state_to_bytes;
use crate::types::{AssetFlowError, AssetKey, Result};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for snapshots: (postcard AssetKey, tick) -> encoded snapshot
const STATES: TableDefinition<(&[u8], u64), &[u8]> = TableDefinition::new("states");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const LATEST_TICK: &str = "latest_tick";

fn io_error(e: impl std::fmt::Display) -> AssetFlowError {
    AssetFlowError::IoError(e.to_string())
}

fn encode_key(key: &AssetKey) -> Result<Vec<u8>> {
    postcard::to_stdvec(key).map_err(|e| AssetFlowError::SerializationError(e.to_string()))
}

fn decode_key(bytes: &[u8]) -> Result<AssetKey> {
    postcard::from_bytes(bytes).map_err(|e| AssetFlowError::DeserializationError(e.to_string()))
}

/// A disk-backed snapshot store using redb.
pub struct RedbStateStore {
    db: Database,
    latest_tick: Option<u64>,
}

impl std::fmt::Debug for RedbStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStateStore")
            .field("latest_tick", &self.latest_tick)
            .finish_non_exhaustive()
    }
}

impl RedbStateStore {
    /// Open or create a state database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        {
            let write_txn = db.begin_write().map_err(io_error)?;
            let _ = write_txn.open_table(STATES).map_err(io_error)?;
            let _ = write_txn.open_table(METADATA).map_err(io_error)?;
            write_txn.commit().map_err(io_error)?;
        }

        let latest_tick = {
            let read_txn = db.begin_read().map_err(io_error)?;
            let table = read_txn.open_table(METADATA).map_err(io_error)?;
            table
                .get(LATEST_TICK)
                .map_err(io_error)?
                .map(|v| v.value())
        };

        Ok(Self { db, latest_tick })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<()> {
        self.db.compact().map_err(io_error)?;
        Ok(())
    }

    /// Every stored tick of `key`, ascending.
    pub fn ticks(&self, key: &AssetKey) -> Result<Vec<u64>> {
        let encoded = encode_key(key)?;
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(STATES).map_err(io_error)?;
        let mut ticks = Vec::new();
        for entry in table
            .range((encoded.as_slice(), 0u64)..=(encoded.as_slice(), u64::MAX))
            .map_err(io_error)?
        {
            let (stored, _) = entry.map_err(io_error)?;
            ticks.push(stored.value().1);
        }
        Ok(ticks)
    }
}

impl EvaluationStateStore for RedbStateStore {
    fn latest_tick(&self) -> Result<Option<u64>> {
        Ok(self.latest_tick)
    }

    fn load_latest(&self, key: &AssetKey) -> Result<Option<AssetEvaluationState>> {
        let encoded = encode_key(key)?;
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(STATES).map_err(io_error)?;
        let last = table
            .range((encoded.as_slice(), 0u64)..=(encoded.as_slice(), u64::MAX))
            .map_err(io_error)?
            .next_back()
            .transpose()
            .map_err(io_error)?;
        Ok(last.and_then(|(stored, value)| {
            decode_or_cold_start(key, stored.value().1, value.value())
        }))
    }

    fn load_all_latest(&self) -> Result<BTreeMap<AssetKey, AssetEvaluationState>> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(STATES).map_err(io_error)?;

        let mut newest: BTreeMap<Vec<u8>, (u64, Vec<u8>)> = BTreeMap::new();
        for entry in table.iter().map_err(io_error)? {
            let (stored, value) = entry.map_err(io_error)?;
            let (key_bytes, tick) = stored.value();
            newest.insert(key_bytes.to_vec(), (tick, value.value().to_vec()));
        }

        let mut latest = BTreeMap::new();
        for (key_bytes, (tick, bytes)) in newest {
            let key = match decode_key(&key_bytes) {
                Ok(key) => key,
                Err(error) => {
                    tracing::warn!(tick, error = %error, "skipping snapshot with undecodable key");
                    continue;
                }
            };
            if let Some(state) = decode_or_cold_start(&key, tick, &bytes) {
                latest.insert(key, state);
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
            encoded.push((key, encode_key(key)?, state_to_bytes(state)?));
        }
        let latest = self.latest_tick.max(Some(tick)).unwrap_or(tick);

        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(STATES).map_err(io_error)?;
            for (key, key_bytes, bytes) in &encoded {
                if table
                    .get((key_bytes.as_slice(), tick))
                    .map_err(io_error)?
                    .is_some()
                {
                    return Err(AssetFlowError::StateAlreadyWritten {
                        asset: (*key).clone(),
                        tick,
                    });
                }
                table
                    .insert((key_bytes.as_slice(), tick), bytes.as_slice())
                    .map_err(io_error)?;
            }
            let mut meta = write_txn.open_table(METADATA).map_err(io_error)?;
            meta.insert(LATEST_TICK, latest).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        // Update in-memory state only after successful commit.
        self.latest_tick = Some(latest);
        tracing::debug!(tick, snapshots = encoded.len(), "tick committed");
        Ok(())
    }

    fn prune(&mut self, keep: usize) -> Result<usize> {
        let mut per_asset: BTreeMap<Vec<u8>, Vec<u64>> = BTreeMap::new();
        {
            let read_txn = self.db.begin_read().map_err(io_error)?;
            let table = read_txn.open_table(STATES).map_err(io_error)?;
            for entry in table.iter().map_err(io_error)? {
                let (stored, _) = entry.map_err(io_error)?;
                let (key_bytes, tick) = stored.value();
                per_asset.entry(key_bytes.to_vec()).or_default().push(tick);
            }
        }

        let mut doomed = Vec::new();
        for (key_bytes, ticks) in per_asset {
            let excess = ticks.len().saturating_sub(keep);
            doomed.extend(ticks.into_iter().take(excess).map(|tick| (key_bytes.clone(), tick)));
        }
        if doomed.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(STATES).map_err(io_error)?;
            for (key_bytes, tick) in &doomed {
                table
                    .remove((key_bytes.as_slice(), *tick))
                    .map_err(io_error)?;
            }
        }
        write_txn.commit().map_err(io_error)?;
        Ok(doomed.len())
    }
}
