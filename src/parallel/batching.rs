//! Dispatcher thread: pulls chunks from the reader and hands them to workers
//!
//! The stop signal is checked at every batch boundary. Progress is recorded
//! only once a batch has actually been queued for a worker.

use anyhow::Result;
use crossbeam_channel::{SendTimeoutError, Sender};
use std::time::Duration;
use tracing::{debug, info};

use crate::platform::StopSignal;
use crate::readers::ChunkReader;

use super::types::{Batch, PipelineProgress};

const SEND_POLL: Duration = Duration::from_millis(100);

pub(crate) struct DispatcherConfig {
    pub poll_interval: Duration,
    /// Finish at the first end of file instead of tailing
    pub once: bool,
}

pub(crate) fn dispatcher_thread(
    mut reader: ChunkReader,
    batch_sender: Sender<Batch>,
    progress: PipelineProgress,
    config: DispatcherConfig,
    stop: StopSignal,
) -> Result<()> {
    let mut batch_id = 0u64;

    loop {
        if stop.is_stopped() {
            debug!("dispatcher observed stop signal");
            break;
        }

        let start_position = reader.position();
        let mut chunk = reader.read_chunk()?;

        if chunk.lines.is_empty() && !chunk.rotated {
            if !config.once {
                if stop.sleep(config.poll_interval) {
                    break;
                }
                continue;
            }
            // Nothing more is coming: take an unterminated last line as well
            chunk = reader.read_chunk_final()?;
            if chunk.lines.is_empty() && !chunk.rotated {
                info!(position = chunk.position, "reached end of input");
                break;
            }
        }

        if chunk.rotated {
            progress.record_rotation();
            continue;
        }

        let batch = Batch {
            id: batch_id,
            start_position: chunk.lines.first().map_or(start_position, |l| l.start),
            end_position: chunk.position,
            lines: chunk.lines,
        };
        batch_id += 1;

        if !send_batch(&batch_sender, batch, &stop) {
            // Not queued: the next run starts from this batch again
            break;
        }
        progress.record_dispatch(chunk.position);
    }

    Ok(())
}

/// Queue a batch, waiting while all workers are busy. Gives up on stop or
/// when every worker is gone.
pub(crate) fn send_batch(sender: &Sender<Batch>, batch: Batch, stop: &StopSignal) -> bool {
    let mut pending = batch;
    loop {
        match sender.send_timeout(pending, SEND_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Disconnected(_)) => return false,
            Err(SendTimeoutError::Timeout(batch)) => {
                if stop.is_stopped() {
                    return false;
                }
                pending = batch;
            }
        }
    }
}
