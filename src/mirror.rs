//! # Durable Mirror Module
//!
//! ## Purpose
//! Secondary cache keyed by logical dataset name, persisted across
//! restarts, so a consumer can paint the last known good dataset instantly
//! while a fresh fetch runs in the background.
//!
//! ## Input/Output Specification
//! - **Input**: Dataset name, JSON payload, record TTL
//! - **Output**: The stored record together with its validity flag; absent
//!   on any read problem, never an error surfaced to the paint path
//! - **Storage**: Sled tree, optional gzip compression
//!
//! ## Key Features
//! - `read` is a pure local lookup, tolerant of missing or corrupt records
//! - `write` replaces the dataset wholesale; no partial-field merges
//! - Stale records stay readable but are flagged invalid
//! - Injectable clock for deterministic validity checks

use crate::clock::Clock;
use crate::config::MirrorConfig;
use crate::errors::{DashboardError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const MIRROR_TREE: &str = "mirror_datasets";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One mirrored dataset as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub payload: Value,
    pub stored_at: i64,
    pub ttl_ms: i64,
}

impl MirrorRecord {
    /// Whether the record is still inside its TTL at `now_ms`
    pub fn is_valid(&self, now_ms: i64) -> bool {
        now_ms - self.stored_at < self.ttl_ms
    }
}

/// A read result carrying the staleness verdict alongside the record
#[derive(Debug, Clone)]
pub struct MirrorRead {
    pub record: MirrorRecord,
    pub valid: bool,
}

/// Persistent dataset mirror backed by sled
pub struct DurableMirror {
    tree: sled::Tree,
    clock: Arc<dyn Clock>,
    compress: bool,
}

impl DurableMirror {
    /// Open (or create) the mirror database
    pub fn open(config: &MirrorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(&config.db_path)?;
        let tree = db.open_tree(MIRROR_TREE)?;
        Ok(Self {
            tree,
            clock,
            compress: config.enable_compression,
        })
    }

    /// Build a mirror over an already-open sled database (shared with the
    /// query history)
    pub fn from_db(db: &sled::Db, clock: Arc<dyn Clock>, compress: bool) -> Result<Self> {
        let tree = db.open_tree(MIRROR_TREE)?;
        Ok(Self {
            tree,
            clock,
            compress,
        })
    }

    /// Look up a dataset locally. Never touches the network; missing or
    /// corrupt records read as absent.
    pub fn read(&self, dataset: &str) -> Option<MirrorRead> {
        let bytes = match self.tree.get(dataset.as_bytes()) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(dataset, error = %e, "mirror read failed, treating as absent");
                return None;
            }
        };

        let record: MirrorRecord = match decode(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(dataset, error = %e, "corrupt mirror record, treating as absent");
                return None;
            }
        };

        let valid = record.is_valid(self.clock.now_ms());
        if !valid {
            debug!(dataset, "mirror record is stale");
        }
        Some(MirrorRead { record, valid })
    }

    /// Replace the dataset wholesale with a fresh payload
    pub fn write(&self, dataset: &str, payload: Value, ttl_ms: i64) -> Result<()> {
        let record = MirrorRecord {
            payload,
            stored_at: self.clock.now_ms(),
            ttl_ms,
        };
        let bytes = encode(&record, self.compress)?;
        self.tree.insert(dataset.as_bytes(), bytes)?;
        debug!(dataset, "mirror record replaced");
        Ok(())
    }

    /// Drop a dataset entirely
    pub fn remove(&self, dataset: &str) -> Result<()> {
        self.tree.remove(dataset.as_bytes())?;
        Ok(())
    }
}

fn encode(record: &MirrorRecord, compress: bool) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(record)?;
    if !compress {
        return Ok(json);
    }

    use std::io::Write;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&json)?;
    encoder.finish().map_err(|e| DashboardError::Internal {
        message: format!("mirror compression failed: {}", e),
    })
}

fn decode(bytes: &[u8]) -> Result<MirrorRecord> {
    if bytes.starts_with(&GZIP_MAGIC) {
        use std::io::Read;
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut json = Vec::new();
        decoder.read_to_end(&mut json)?;
        Ok(serde_json::from_slice(&json)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn open_mirror(compress: bool) -> (DurableMirror, Arc<ManualClock>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(0);
        let config = MirrorConfig {
            db_path: dir.path().join("mirror.db"),
            default_ttl_seconds: 30,
            enable_compression: compress,
        };
        let mirror = DurableMirror::open(&config, clock.clone()).unwrap();
        (mirror, clock, dir)
    }

    #[test]
    fn read_after_write_round_trips() {
        let (mirror, _clock, _dir) = open_mirror(false);
        mirror
            .write("network_overview", json!({"stats": {"totalNodes": 4}}), 30_000)
            .unwrap();

        let read = mirror.read("network_overview").unwrap();
        assert!(read.valid);
        assert_eq!(read.record.payload["stats"]["totalNodes"], 4);
    }

    #[test]
    fn stale_record_stays_readable_but_invalid() {
        let (mirror, clock, _dir) = open_mirror(false);
        mirror.write("requirements", json!({"cpu": 2}), 30_000).unwrap();

        clock.advance_ms(31_000);
        let read = mirror.read("requirements").unwrap();
        assert!(!read.valid);
        assert_eq!(read.record.payload["cpu"], 2);
    }

    #[test]
    fn missing_dataset_reads_as_absent() {
        let (mirror, _clock, _dir) = open_mirror(false);
        assert!(mirror.read("nothing_here").is_none());
    }

    #[test]
    fn corrupt_record_reads_as_absent() {
        let (mirror, _clock, _dir) = open_mirror(false);
        mirror
            .tree
            .insert(b"network_overview", b"not json at all".to_vec())
            .unwrap();
        assert!(mirror.read("network_overview").is_none());
    }

    #[test]
    fn write_replaces_wholesale() {
        let (mirror, _clock, _dir) = open_mirror(false);
        mirror
            .write("overview", json!({"a": 1, "b": 2}), 30_000)
            .unwrap();
        mirror.write("overview", json!({"a": 9}), 30_000).unwrap();

        let read = mirror.read("overview").unwrap();
        assert_eq!(read.record.payload, json!({"a": 9}));
    }

    #[test]
    fn compressed_records_round_trip() {
        let (mirror, _clock, _dir) = open_mirror(true);
        mirror
            .write("overview", json!({"nodes": [1, 2, 3]}), 30_000)
            .unwrap();
        let read = mirror.read("overview").unwrap();
        assert!(read.valid);
        assert_eq!(read.record.payload["nodes"][2], 3);
    }
}
