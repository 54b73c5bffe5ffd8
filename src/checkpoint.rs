//! Durable resume state: the byte offset to continue reading from and the
//! dedup window contents. Each artifact is written atomically on its own, and
//! a missing or corrupt artifact falls back to its empty default on load.
//!
//! The seen artifact also records how long the event log was when the set was
//! taken, so the log can be cut back to exactly the records the set covers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::platform::write_atomic;

pub const POSITION_FILE: &str = "position.json";
pub const SEEN_FILE: &str = "seen.json";

#[derive(Debug, Serialize, Deserialize)]
struct PositionRecord {
    position: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SeenRecord {
    event_log_len: u64,
    hashes: Vec<u64>,
}

/// What a run resumes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointState {
    pub position: u64,
    /// Dedup hashes, least recently used first.
    pub seen: Vec<u64>,
    /// Event log length matching `seen`; `None` when the seen artifact was
    /// missing or unreadable.
    pub event_log_len: Option<u64>,
}

impl CheckpointState {
    /// Event log length the aggregator should cut back to. With no
    /// checkpoint at all everything is read again, so nothing in the old log
    /// is kept. With only a position the log is left alone.
    pub fn committed_log_len(&self) -> Option<u64> {
        match self.event_log_len {
            Some(len) => Some(len),
            None if self.position == 0 => Some(0),
            None => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn position_path(&self) -> PathBuf {
        self.dir.join(POSITION_FILE)
    }

    pub fn seen_path(&self) -> PathBuf {
        self.dir.join(SEEN_FILE)
    }

    /// Persist both artifacts. The seen set is written first so a crash in
    /// between leaves an older position, which only causes re-reading.
    /// `event_log_len` must be the synced event log length the set covers.
    pub fn save(&self, position: u64, seen: &[u64], event_log_len: u64) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create checkpoint directory: {}", self.dir.display())
        })?;

        let seen_json = serde_json::to_vec(&SeenRecord {
            event_log_len,
            hashes: seen.to_vec(),
        })
        .context("Failed to encode seen set")?;
        write_atomic(&self.seen_path(), &seen_json)?;

        let position_json = serde_json::to_vec(&PositionRecord { position })
            .context("Failed to encode position")?;
        write_atomic(&self.position_path(), &position_json)?;

        debug!(position, seen = seen.len(), event_log_len, "checkpoint saved");
        Ok(())
    }

    /// Load the saved state. Never fails: each unreadable artifact is replaced
    /// by its default and a warning is logged.
    pub fn load(&self) -> CheckpointState {
        let position = read_artifact::<PositionRecord>(&self.position_path())
            .map(|record| record.position)
            .unwrap_or(0);
        let (seen, event_log_len) = match read_artifact::<SeenRecord>(&self.seen_path()) {
            Some(record) => (record.hashes, Some(record.event_log_len)),
            None => (Vec::new(), None),
        };
        CheckpointState {
            position,
            seen,
            event_log_len,
        }
    }

    /// Remove both artifacts; missing ones are not an error.
    pub fn clear(&self) -> Result<()> {
        for path in [self.position_path(), self.seen_path()] {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed checkpoint artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to remove {}", path.display()))
                }
            }
        }
        Ok(())
    }
}

fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read checkpoint artifact; using default");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt checkpoint artifact; using default");
            None
        }
    }
}
