use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::config::OutputConfig;

/// Remove everything a previous run produced: the event log, its summary, the
/// template store and both checkpoint artifacts. The input is never touched.
/// Returns the paths that were actually removed.
pub fn clear_artifacts(output: &OutputConfig) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in [
        output.event_log.clone(),
        output.summary_path(),
        output.template_store_path(),
    ] {
        if remove_if_present(&path)? {
            removed.push(path);
        }
    }

    let checkpoints = CheckpointStore::new(&output.checkpoint_dir);
    for path in [checkpoints.position_path(), checkpoints.seen_path()] {
        if path.exists() {
            removed.push(path);
        }
    }
    checkpoints.clear()?;

    // Only an empty checkpoint directory goes; anything else in it stays
    if fs::read_dir(&output.checkpoint_dir).is_ok_and(|mut entries| entries.next().is_none()) {
        fs::remove_dir(&output.checkpoint_dir).with_context(|| {
            format!(
                "Failed to remove checkpoint directory: {}",
                output.checkpoint_dir.display()
            )
        })?;
    }

    info!(removed = removed.len(), "cleared previous outputs");
    Ok(removed)
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
