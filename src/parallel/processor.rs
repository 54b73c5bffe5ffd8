//! Main parallel processor
//!
//! Wires the dispatcher, the worker pool and the aggregator together and
//! joins them once the run is over.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

use crate::aggregate::{Aggregator, SeenSet, Summary};
use crate::checkpoint::CheckpointStore;
use crate::config::PipelineConfig;
use crate::parsers::LineParser;
use crate::platform::{Ctrl, StopSignal};
use crate::readers::ChunkReader;
use crate::stats::PipelineStats;

use super::batching::{dispatcher_thread, DispatcherConfig};
use super::delivery::RetryPolicy;
use super::sink::{aggregator_thread, AggregatorSettings};
use super::types::{ParallelConfig, PipelineProgress};
use super::worker::worker_thread;

/// Outcome of a completed run
#[derive(Debug)]
pub struct RunReport {
    pub stats: PipelineStats,
    pub summary: Summary,
    /// Offset saved in the final checkpoint
    pub final_position: u64,
}

/// Main parallel processor
pub struct ParallelProcessor {
    config: PipelineConfig,
    parallel: ParallelConfig,
}

impl ParallelProcessor {
    pub fn new(config: PipelineConfig) -> Self {
        let parallel = ParallelConfig::from(&config);
        Self { config, parallel }
    }

    /// Run until the input is exhausted (`once`) or `stop` is raised, then
    /// drain, flush and checkpoint.
    pub fn run(&self, stop: StopSignal, ctrl_rx: Receiver<Ctrl>) -> Result<RunReport> {
        let started = Instant::now();
        let checkpoints = CheckpointStore::new(&self.config.output.checkpoint_dir);
        let state = checkpoints.load();
        info!(
            position = state.position,
            seen = state.seen.len(),
            "loaded checkpoint"
        );

        let committed_log_len = state.committed_log_len();
        let seen = SeenSet::from_hashes(self.config.aggregate.dedup_window, state.seen);
        let aggregator = Aggregator::open(
            &self.config.output,
            &self.config.aggregate,
            seen,
            committed_log_len,
        )?;
        let reader = ChunkReader::new(
            &self.config.input.path,
            state.position,
            self.config.input.chunk_size,
        );
        let progress = PipelineProgress::new(state.position);
        let parser = Arc::new(LineParser::new(&self.config.extraction));

        // One batch in hand per worker keeps the reader at most that far ahead
        let (batch_sender, batch_receiver) = bounded(self.parallel.num_workers);
        let (delta_sender, delta_receiver) = bounded(self.parallel.queue_capacity);

        let aggregator_handle = {
            let progress = progress.clone();
            let settings = AggregatorSettings {
                flush_interval: self.config.aggregate.flush_interval,
                checkpoint_interval: self.config.aggregate.checkpoint_interval,
                receive_timeout: self.config.aggregate.receive_timeout,
            };
            thread::Builder::new()
                .name("aggregator".to_string())
                .spawn(move || {
                    aggregator_thread(
                        aggregator,
                        checkpoints,
                        delta_receiver,
                        ctrl_rx,
                        progress,
                        settings,
                    )
                })?
        };

        let retry = RetryPolicy {
            attempts: self.parallel.send_attempts,
            delay: self.parallel.retry_delay,
        };
        let mut worker_handles = Vec::with_capacity(self.parallel.num_workers);
        for worker_id in 0..self.parallel.num_workers {
            let batch_receiver = batch_receiver.clone();
            let delta_sender = delta_sender.clone();
            let parser = Arc::clone(&parser);
            let progress = progress.clone();
            let stop = stop.clone();
            worker_handles.push(
                thread::Builder::new()
                    .name(format!("worker-{}", worker_id))
                    .spawn(move || {
                        worker_thread(
                            worker_id,
                            batch_receiver,
                            delta_sender,
                            parser,
                            retry,
                            progress,
                            stop,
                        )
                    })?,
            );
        }
        // Workers hold the only remaining ends
        drop(batch_receiver);
        drop(delta_sender);

        let dispatcher_handle = {
            let progress = progress.clone();
            let stop = stop.clone();
            let config = DispatcherConfig {
                poll_interval: self.config.input.poll_interval,
                once: self.config.input.once,
            };
            thread::Builder::new()
                .name("dispatcher".to_string())
                .spawn(move || dispatcher_thread(reader, batch_sender, progress, config, stop))?
        };

        let dispatch_result = dispatcher_handle
            .join()
            .map_err(|_| anyhow!("Dispatcher thread panicked"));
        if !matches!(dispatch_result, Ok(Ok(()))) {
            // Let the workers skip what is queued so the aggregator can finish
            stop.stop();
        }

        // Every thread is joined before any failure is reported, so the
        // aggregator always gets to its final flush and checkpoint.
        let workers_result = join_all(worker_handles, "Worker");

        let report = aggregator_handle
            .join()
            .map_err(|_| anyhow!("Aggregator thread panicked"))??;
        dispatch_result??;
        workers_result?;

        let mut stats = report.stats;
        stats.processing_time = started.elapsed();
        info!(
            lines = stats.parse.lines_read,
            matched = stats.parse.lines_matched,
            dropped = stats.deltas_dropped,
            position = report.final_position,
            "ingestion finished"
        );

        Ok(RunReport {
            stats,
            summary: report.summary,
            final_position: report.final_position,
        })
    }
}

/// Join every handle, then report the first panic.
fn join_all(handles: Vec<thread::JoinHandle<()>>, role: &str) -> Result<()> {
    let mut panicked = 0usize;
    for handle in handles {
        if handle.join().is_err() {
            panicked += 1;
        }
    }
    if panicked > 0 {
        warn!(role, panicked, "threads panicked");
        return Err(anyhow!("{} thread panicked", role));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_join_all_waits_for_every_thread_before_failing() {
        let finished = Arc::new(AtomicBool::new(false));
        let handles: Vec<thread::JoinHandle<()>> = vec![
            thread::spawn(|| panic!("worker failure")),
            {
                let finished = Arc::clone(&finished);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(50));
                    finished.store(true, Ordering::SeqCst);
                })
            },
        ];

        let err = join_all(handles, "Worker").unwrap_err();
        assert_eq!(err.to_string(), "Worker thread panicked");
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_join_all_without_panics() {
        let handles = (0..3).map(|_| thread::spawn(|| ())).collect();
        assert!(join_all(handles, "Worker").is_ok());
    }
}
