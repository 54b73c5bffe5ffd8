//! Type definitions for the ingestion pipeline
//!
//! Batches flow from the dispatcher to the workers, deltas from the workers to
//! the aggregator. `PipelineProgress` is the only state shared across threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::event::{LogLine, ParseOutput};

/// Configuration for the worker pool and hand-off channel
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    pub num_workers: usize,
    pub queue_capacity: usize,
    pub send_attempts: usize,
    pub retry_delay: Duration,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_workers: num_cpus::get(),
            queue_capacity: 100,
            send_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl From<&PipelineConfig> for ParallelConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            num_workers: config.performance.workers,
            queue_capacity: config.performance.queue_capacity,
            send_attempts: config.performance.send_attempts,
            retry_delay: config.performance.retry_delay,
        }
    }
}

/// Lines read by one `read_chunk` call
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: u64,
    pub lines: Vec<LogLine>,
    /// Offset of the first line in the batch
    pub start_position: u64,
    /// Offset just past the last line in the batch
    pub end_position: u64,
}

/// A worker's result for one batch
#[derive(Debug, Clone)]
pub struct Delta {
    pub batch_id: u64,
    pub end_position: u64,
    pub output: ParseOutput,
}

#[derive(Debug)]
struct ProgressInner {
    dispatched_position: AtomicU64,
    rewind_position: AtomicU64,
    batches_dispatched: AtomicU64,
    deltas_dropped: AtomicU64,
    lines_dropped: AtomicU64,
}

/// Positions and counters shared by the dispatcher, the workers and the aggregator.
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    inner: Arc<ProgressInner>,
}

impl PipelineProgress {
    pub fn new(start_position: u64) -> Self {
        Self {
            inner: Arc::new(ProgressInner {
                dispatched_position: AtomicU64::new(start_position),
                rewind_position: AtomicU64::new(u64::MAX),
                batches_dispatched: AtomicU64::new(0),
                deltas_dropped: AtomicU64::new(0),
                lines_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Reader position after the most recently dispatched batch.
    pub fn record_dispatch(&self, position: u64) {
        self.inner
            .dispatched_position
            .store(position, Ordering::SeqCst);
        self.inner.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// The reader restarted at offset 0 after truncation or rotation.
    pub fn record_rotation(&self) {
        self.inner.dispatched_position.store(0, Ordering::SeqCst);
    }

    /// A dispatched batch was never parsed because of shutdown.
    pub fn record_skipped(&self, start_position: u64) {
        self.inner
            .rewind_position
            .fetch_min(start_position, Ordering::SeqCst);
    }

    pub fn record_dropped(&self, lines: usize) {
        self.inner.deltas_dropped.fetch_add(1, Ordering::Relaxed);
        self.inner
            .lines_dropped
            .fetch_add(lines as u64, Ordering::Relaxed);
    }

    pub fn dispatched_position(&self) -> u64 {
        self.inner.dispatched_position.load(Ordering::SeqCst)
    }

    /// Where the next run should start: the dispatched position, pulled back
    /// to the earliest batch that was dispatched but never parsed.
    pub fn resume_position(&self) -> u64 {
        self.dispatched_position()
            .min(self.inner.rewind_position.load(Ordering::SeqCst))
    }

    pub fn batches_dispatched(&self) -> u64 {
        self.inner.batches_dispatched.load(Ordering::Relaxed)
    }

    pub fn deltas_dropped(&self) -> u64 {
        self.inner.deltas_dropped.load(Ordering::Relaxed)
    }

    pub fn lines_dropped(&self) -> u64 {
        self.inner.lines_dropped.load(Ordering::Relaxed)
    }
}
