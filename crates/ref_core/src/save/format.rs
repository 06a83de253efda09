use super::error::SaveError;
use super::HISTORY_VERSION;
use crate::completed::CompletedMatch;
use serde::{Deserialize, Serialize};

use chrono::Utc;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use rmp_serde::{from_slice, to_vec_named};
use sha2::{Digest, Sha256};

/// Upper bound on stored matches per history file.
pub const MAX_HISTORY_MATCHES: usize = 10_000;

/// On-disk container for the completed-match history.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryFile {
    /// Container format version for migration
    pub version: u32,

    /// Last write (unix milliseconds)
    pub timestamp: i64,

    /// Most recent first
    pub matches: Vec<CompletedMatch>,
}

impl Default for HistoryFile {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryFile {
    pub fn new() -> Self {
        Self { version: HISTORY_VERSION, timestamp: current_timestamp(), matches: Vec::new() }
    }

    pub fn update_timestamp(&mut self) {
        self.timestamp = current_timestamp();
    }

    /// Inserts or replaces by id, keeping most-recent-first order. The oldest
    /// matches are dropped once the history is full.
    pub fn upsert(&mut self, record: CompletedMatch) {
        self.matches.retain(|m| m.id != record.id);
        self.matches.push(record);
        self.sort();
        self.prune_to(MAX_HISTORY_MATCHES);
    }

    /// Keeps the `limit` most recent matches. Returns how many were dropped.
    pub fn prune_to(&mut self, limit: usize) -> usize {
        if self.matches.len() <= limit {
            return 0;
        }
        let dropped = self.matches.len() - limit;
        self.matches.truncate(limit);
        log::info!("Pruned {} oldest matches from history", dropped);
        dropped
    }

    pub fn sort(&mut self) {
        self.matches.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    }

    pub fn validate(&self) -> Result<(), SaveError> {
        if self.matches.len() > MAX_HISTORY_MATCHES {
            return Err(SaveError::HistoryTooLarge { count: self.matches.len() });
        }

        let mut ids = std::collections::HashSet::new();
        for record in &self.matches {
            if !ids.insert(record.id) {
                return Err(SaveError::Corrupted);
            }
        }

        Ok(())
    }
}

/// MessagePack, then LZ4 with prepended size, then a SHA-256 trailer.
pub fn serialize_and_compress(history: &HistoryFile) -> Result<Vec<u8>, SaveError> {
    history.validate()?;

    let msgpack = to_vec_named(history)?;
    let compressed = compress_prepend_size(&msgpack);

    let mut hasher = Sha256::new();
    hasher.update(&compressed);
    let checksum = hasher.finalize();

    let mut result = compressed;
    result.extend_from_slice(&checksum);

    Ok(result)
}

pub fn decompress_and_deserialize(bytes: &[u8]) -> Result<HistoryFile, SaveError> {
    // size header + checksum
    if bytes.len() < 4 + 32 {
        return Err(SaveError::Corrupted);
    }

    let (payload, checksum_bytes) = bytes.split_at(bytes.len() - 32);

    let mut hasher = Sha256::new();
    hasher.update(payload);
    let calculated_checksum = hasher.finalize();

    if &calculated_checksum[..] != checksum_bytes {
        return Err(SaveError::ChecksumMismatch);
    }

    let msgpack = decompress_size_prepended(payload).map_err(|_| SaveError::Decompression)?;
    let history: HistoryFile = from_slice(&msgpack)?;

    Ok(history)
}

pub fn current_timestamp() -> i64 {
    Utc::now().timestamp_millis()
}
