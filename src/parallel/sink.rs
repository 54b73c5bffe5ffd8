//! Aggregator thread: the single consumer of parsed deltas
//!
//! Besides merging, it owns the wall-clock duties: summary flushes and
//! checkpoint saves run between receives, so they happen even when idle.

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::aggregate::{Aggregator, Summary};
use crate::checkpoint::CheckpointStore;
use crate::platform::Ctrl;
use crate::stats::PipelineStats;

use super::types::{Delta, PipelineProgress};

pub(crate) struct AggregatorSettings {
    pub flush_interval: Duration,
    pub checkpoint_interval: Duration,
    pub receive_timeout: Duration,
}

/// State handed back once the channel has closed and everything is persisted.
#[derive(Debug)]
pub(crate) struct AggregatorReport {
    pub stats: PipelineStats,
    pub summary: Summary,
    pub final_position: u64,
}

pub(crate) fn aggregator_thread(
    mut aggregator: Aggregator,
    checkpoints: CheckpointStore,
    delta_receiver: Receiver<Delta>,
    ctrl_receiver: Receiver<Ctrl>,
    progress: PipelineProgress,
    settings: AggregatorSettings,
) -> Result<AggregatorReport> {
    let mut last_flush = Instant::now();
    let mut last_checkpoint = Instant::now();

    loop {
        while let Ok(ctrl) = ctrl_receiver.try_recv() {
            match ctrl {
                Ctrl::PrintStats => {
                    sync_progress(&mut aggregator, &progress);
                    info!("{}", aggregator.stats().format_stats());
                }
                Ctrl::Flush => {
                    info!("flush requested");
                    if let Err(e) = aggregator.flush() {
                        warn!(error = %format!("{:#}", e), "summary flush failed");
                    }
                    last_flush = Instant::now();
                    if let Err(e) =
                        save_checkpoint(&mut aggregator, &checkpoints, progress.dispatched_position())
                    {
                        warn!(error = %format!("{:#}", e), "checkpoint save failed");
                    }
                    last_checkpoint = Instant::now();
                }
            }
        }

        match delta_receiver.recv_timeout(settings.receive_timeout) {
            Ok(delta) => {
                merge_delta(&mut aggregator, delta)?;
                // Take what is already queued, bounded so periodic work is not starved
                let pending = delta_receiver.len();
                for delta in delta_receiver.try_iter().take(pending) {
                    merge_delta(&mut aggregator, delta)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_flush.elapsed() >= settings.flush_interval {
            if let Err(e) = aggregator.flush() {
                warn!(error = %format!("{:#}", e), "summary flush failed");
            }
            last_flush = Instant::now();
        }

        if last_checkpoint.elapsed() >= settings.checkpoint_interval {
            if let Err(e) =
                save_checkpoint(&mut aggregator, &checkpoints, progress.dispatched_position())
            {
                warn!(error = %format!("{:#}", e), "checkpoint save failed");
            }
            last_checkpoint = Instant::now();
        }
    }

    // Every sender is gone, so every accepted delta has been merged.
    aggregator.flush()?;
    let final_position = progress.resume_position();
    save_checkpoint(&mut aggregator, &checkpoints, final_position)?;
    sync_progress(&mut aggregator, &progress);

    info!(
        position = final_position,
        entries = aggregator.stats().entries_written,
        "aggregator drained"
    );

    Ok(AggregatorReport {
        stats: aggregator.stats().clone(),
        summary: aggregator.summary(),
        final_position,
    })
}

fn merge_delta(aggregator: &mut Aggregator, delta: Delta) -> Result<()> {
    debug!(
        batch_id = delta.batch_id,
        lines = delta.output.lines.len(),
        entries = delta.output.entry_count(),
        end_position = delta.end_position,
        "merging delta"
    );
    aggregator.merge(delta.output)
}

fn save_checkpoint(
    aggregator: &mut Aggregator,
    checkpoints: &CheckpointStore,
    position: u64,
) -> Result<()> {
    let event_log_len = aggregator.sync()?;
    checkpoints.save(position, &aggregator.seen().hashes_lru_first(), event_log_len)?;
    aggregator.stats_mut().checkpoints += 1;
    Ok(())
}

fn sync_progress(aggregator: &mut Aggregator, progress: &PipelineProgress) {
    let stats = aggregator.stats_mut();
    stats.batches_dispatched = progress.batches_dispatched();
    stats.deltas_dropped = progress.deltas_dropped();
    stats.lines_dropped = progress.lines_dropped();
}
