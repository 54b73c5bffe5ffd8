use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::metrics::{Metric, MetricAccumulator};

/// Summary snapshot path derived from the event log path.
pub fn summary_path(event_log: &Path) -> PathBuf {
    let mut name = OsString::from(event_log.as_os_str());
    name.push(".summary.json");
    PathBuf::from(name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCounts {
    pub error_count: usize,
    pub warning_count: usize,
    pub metrics: BTreeMap<String, Metric>,
}

/// Snapshot written on every flush.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub summary: SummaryCounts,
    pub timeline_count: u64,
    pub unique_messages: usize,
}

impl Summary {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).context("Failed to encode summary")
    }
}

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    event: String,
    #[serde(default)]
    value: Option<f64>,
}

/// Totals reconstructed from an existing event log.
#[derive(Debug, Default)]
pub struct Replayed {
    pub occurrences: HashMap<String, usize>,
    pub metrics: MetricAccumulator,
    pub timeline_count: u64,
}

/// Read the event log back and rebuild per-category counts, metrics and the
/// entry count. Undecodable lines are skipped.
///
/// Occurrences count entries, which for keyword categories equals the number
/// of bucket lines because a keyword contributes one entry per line.
pub fn replay_event_log(path: &Path) -> Result<Replayed> {
    let mut replayed = Replayed::default();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(replayed),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read event log: {}", path.display()))
        }
    };

    let mut skipped = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("Failed to read event log: {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        replayed.timeline_count += 1;
        if let Some(value) = record.value {
            replayed.metrics.record(&record.event, value);
        }
        *replayed.occurrences.entry(record.event).or_default() += 1;
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "skipped undecodable event log records");
    }
    debug!(
        path = %path.display(),
        entries = replayed.timeline_count,
        "replayed event log"
    );
    Ok(replayed)
}
