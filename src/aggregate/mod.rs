//! The single writer: owns the running totals, the dedup window, the template
//! table and the durable outputs. Only the aggregator thread touches it, so
//! none of this state is locked.

mod dedup;
mod metrics;
mod summary;
mod templates;

pub use dedup::SeenSet;
pub use metrics::{Metric, MetricAccumulator};
pub use summary::{replay_event_log, summary_path, Replayed, Summary, SummaryCounts};
pub use templates::{
    templatize, TemplateRecord, TemplateStore, TemplateTable, Templated, NUMBER_PLACEHOLDER,
};

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{AggregateConfig, OutputConfig};
use crate::event::{EventBucket, Message, ParseOutput, ParsedLine, TimelineEntry};
use crate::platform::write_atomic;
use crate::stats::PipelineStats;
use crate::timestamp::strip_leading_timestamp;

pub struct Aggregator {
    events: EventBucket,
    /// Occurrence totals replayed from an earlier run's event log.
    restored: HashMap<String, usize>,
    seen: SeenSet,
    templates: TemplateTable,
    template_store: TemplateStore,
    metrics: MetricAccumulator,
    /// Entries merged since the last flush.
    timeline: Vec<TimelineEntry>,
    timeline_count: u64,
    event_log: BufWriter<File>,
    event_log_path: PathBuf,
    summary_path: PathBuf,
    stats: PipelineStats,
}

impl Aggregator {
    /// Open the outputs for appending. `committed_log_len` is the event log
    /// length that `seen` covers; records past it are dropped because their
    /// lines will be read and merged again.
    pub fn open(
        output: &OutputConfig,
        config: &AggregateConfig,
        seen: SeenSet,
        committed_log_len: Option<u64>,
    ) -> Result<Self> {
        let event_log_path = output.event_log.clone();
        let template_path = output.template_store_path();
        if let Some(dir) = event_log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        }

        if let Some(len) = committed_log_len {
            truncate_uncommitted(&event_log_path, len)?;
        }
        templates::terminate_partial_line(&event_log_path)?;
        templates::terminate_partial_line(&template_path)?;

        let replayed = if config.resume_summary {
            replay_event_log(&event_log_path)?
        } else {
            Replayed::default()
        };

        let (template_store, templates) = TemplateStore::open(&template_path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&event_log_path)
            .with_context(|| format!("Failed to open event log: {}", event_log_path.display()))?;

        info!(
            event_log = %event_log_path.display(),
            templates = templates.len(),
            restored_entries = replayed.timeline_count,
            seen = seen.len(),
            "aggregator ready"
        );

        Ok(Self {
            events: EventBucket::new(),
            restored: replayed.occurrences,
            seen,
            templates,
            template_store,
            metrics: replayed.metrics,
            timeline: Vec::new(),
            timeline_count: replayed.timeline_count,
            event_log: BufWriter::new(file),
            summary_path: summary_path(&event_log_path),
            event_log_path,
            stats: PipelineStats::default(),
        })
    }

    /// Merge one worker delta. Lines whose hash is already in the dedup window
    /// are skipped entirely.
    pub fn merge(&mut self, output: ParseOutput) -> Result<()> {
        self.stats.parse.merge(&output.stats);
        self.stats.deltas_merged += 1;
        for line in output.lines {
            self.merge_line(line)?;
        }
        Ok(())
    }

    fn merge_line(&mut self, line: ParsedLine) -> Result<()> {
        if !self.seen.insert(line.hash) {
            self.stats.duplicates_skipped += 1;
            return Ok(());
        }

        for category in &line.categories {
            self.events.push(category, line.raw.clone());
        }

        for mut entry in line.entries {
            if let Some(Message::Raw { msg }) = &entry.message {
                let templated = self.template_message(msg)?;
                entry.message = Some(templated);
            }
            if let Some(value) = entry.value {
                self.metrics.record(&entry.category, value);
            }
            self.append_entry(entry)?;
        }
        Ok(())
    }

    fn template_message(&mut self, msg: &str) -> Result<Message> {
        let Templated { template, values } = templatize(strip_leading_timestamp(msg));
        let (msg_id, is_new) = self.templates.lookup_or_insert(&template);
        if is_new {
            self.template_store
                .append(&TemplateRecord { id: msg_id, template })?;
            self.stats.templates_created += 1;
        }
        Ok(Message::Templated {
            msg_id,
            msg_values: values,
        })
    }

    fn append_entry(&mut self, entry: TimelineEntry) -> Result<()> {
        serde_json::to_writer(&mut self.event_log, &entry).with_context(|| {
            format!("Failed to write event log: {}", self.event_log_path.display())
        })?;
        self.event_log.write_all(b"\n")?;
        self.timeline.push(entry);
        self.timeline_count += 1;
        self.stats.entries_written += 1;
        Ok(())
    }

    fn total(&self, category: &str) -> usize {
        self.restored.get(category).copied().unwrap_or(0) + self.events.count(category)
    }

    pub fn summary(&self) -> Summary {
        Summary {
            summary: SummaryCounts {
                error_count: self.total("ERROR"),
                warning_count: self.total("WARNING"),
                metrics: self.metrics.snapshot(),
            },
            timeline_count: self.timeline_count,
            unique_messages: self.templates.len(),
        }
    }

    /// Push buffered records to disk, rewrite the summary snapshot and rotate
    /// the in-memory timeline out.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_writers()?;
        let summary = self.summary();
        write_atomic(&self.summary_path, &summary.to_json()?)?;
        let rotated = self.timeline.len();
        self.timeline.clear();
        self.stats.flushes += 1;
        debug!(rotated, total = self.timeline_count, "flushed summary");
        Ok(())
    }

    /// Make everything merged so far durable; called before a checkpoint so the
    /// saved seen set never covers records that could still be lost. Returns
    /// the event log length the current seen set corresponds to.
    pub fn sync(&mut self) -> Result<u64> {
        self.flush_writers()?;
        let file = self.event_log.get_ref();
        file.sync_data()
            .with_context(|| format!("Failed to sync event log: {}", self.event_log_path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("Failed to stat event log: {}", self.event_log_path.display()))?
            .len();
        Ok(len)
    }

    fn flush_writers(&mut self) -> Result<()> {
        self.event_log
            .flush()
            .with_context(|| format!("Failed to flush event log: {}", self.event_log_path.display()))?;
        self.template_store.flush()
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn events(&self) -> &EventBucket {
        &self.events
    }

    /// Entries merged since the last flush.
    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut PipelineStats {
        &mut self.stats
    }
}

/// Cut the event log back to `len` bytes, the part a checkpoint vouches for.
fn truncate_uncommitted(path: &Path, len: u64) -> Result<()> {
    let file = match OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to open event log: {}", path.display()))
        }
    };
    let current = file
        .metadata()
        .with_context(|| format!("Failed to stat event log: {}", path.display()))?
        .len();
    if current > len {
        warn!(
            path = %path.display(),
            committed = len,
            discarded = current - len,
            "dropping event log records written after the last checkpoint"
        );
        file.set_len(len)
            .with_context(|| format!("Failed to truncate event log: {}", path.display()))?;
    }
    Ok(())
}
