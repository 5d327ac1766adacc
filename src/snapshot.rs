// src/snapshot.rs
//! Pause/resume state
//!
//! A [`MiningSnapshot`] captures everything needed to continue an attempt
//! in another process: the note fields, the per-lane nonce cursors and the
//! best candidates so far. [`SnapshotStore`] persists snapshots as JSON.

use crate::types::{BestCandidate, MiningRequest, UnsignedNote};
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Serializable capture of an attempt's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningSnapshot {
    /// Author public key
    pub pubkey: String,
    /// Message content
    pub content: String,
    /// Event kind
    pub kind: u32,
    /// Tags as mined (defaults already merged in)
    pub tags: Vec<Vec<String>>,
    /// Creation time of the canonical message
    pub created_at: u64,
    /// Required leading zero bits
    pub difficulty: u32,
    /// Worker count at capture time
    pub worker_count: usize,
    /// Next nonce of every lane, worker by worker; empty when no worker
    /// has made progress
    pub worker_nonces: Vec<u64>,
    /// Best candidate across all workers
    pub best: Option<BestCandidate>,
    /// Best candidate per worker
    #[serde(default)]
    pub worker_best: BTreeMap<usize, BestCandidate>,
    /// Capture time, unix seconds
    pub saved_at: u64,
}

impl MiningSnapshot {
    /// Whether the snapshot records anything worth resuming from
    pub fn has_progress(&self) -> bool {
        !self.worker_nonces.is_empty() || self.best.is_some()
    }

    /// The canonical message the snapshot was mining
    pub fn note(&self) -> UnsignedNote {
        UnsignedNote {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }

    /// The request the snapshot continues
    pub fn request(&self) -> MiningRequest {
        MiningRequest {
            pubkey: self.pubkey.clone(),
            content: self.content.clone(),
            kind: self.kind,
            tags: self.tags.clone(),
            created_at: Some(self.created_at),
            difficulty: self.difficulty,
            worker_count: self.worker_count,
        }
    }
}

/// Current unix time in seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// JSON file holding the latest snapshot
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    min_interval: Duration,
    last_write: Option<Instant>,
}

impl SnapshotStore {
    /// Creates a store at `path`; `save_throttled` writes at most once per
    /// `min_interval`
    pub fn new(path: impl Into<PathBuf>, min_interval: Duration) -> Self {
        SnapshotStore {
            path: path.into(),
            min_interval,
            last_write: None,
        }
    }

    /// File the store writes to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored snapshot; `Ok(None)` when there is none yet
    pub fn load(&self) -> Result<Option<MiningSnapshot>, MinerError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Writes `snapshot` unconditionally
    ///
    /// The file is replaced atomically so a crash mid-write leaves the
    /// previous snapshot intact.
    pub fn save(&mut self, snapshot: &MiningSnapshot) -> Result<(), MinerError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        self.last_write = Some(Instant::now());
        log::debug!(
            "Saved snapshot to {} ({} cursors)",
            self.path.display(),
            snapshot.worker_nonces.len()
        );
        Ok(())
    }

    /// Writes `snapshot` if it has progress and the interval has elapsed
    ///
    /// Returns whether a write happened.
    pub fn save_throttled(&mut self, snapshot: &MiningSnapshot) -> Result<bool, MinerError> {
        if !snapshot.has_progress() {
            return Ok(false);
        }
        if self
            .last_write
            .is_some_and(|last| last.elapsed() < self.min_interval)
        {
            return Ok(false);
        }
        self.save(snapshot)?;
        Ok(true)
    }

    /// Deletes the stored snapshot, if any
    pub fn clear(&self) -> Result<(), MinerError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
