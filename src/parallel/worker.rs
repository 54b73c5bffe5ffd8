//! Worker thread: parses batches and delivers the deltas
//!
//! Workers hold no state beyond the shared read-only parser, so any worker may
//! take any batch.

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::parsers::LineParser;
use crate::platform::StopSignal;

use super::delivery::{deliver_with_retry, Delivery, RetryPolicy};
use super::types::{Batch, Delta, PipelineProgress};

pub(crate) fn worker_thread(
    worker_id: usize,
    batch_receiver: Receiver<Batch>,
    delta_sender: Sender<Delta>,
    parser: Arc<LineParser>,
    retry: RetryPolicy,
    progress: PipelineProgress,
    stop: StopSignal,
) {
    for batch in batch_receiver.iter() {
        if stop.is_stopped() {
            // Leave it for the next run
            progress.record_skipped(batch.start_position);
            continue;
        }

        let line_count = batch.lines.len();
        let delta = Delta {
            batch_id: batch.id,
            end_position: batch.end_position,
            output: parser.parse(&batch.lines),
        };

        match deliver_with_retry(&delta_sender, delta, retry) {
            Delivery::Delivered { attempt } => {
                if attempt > 1 {
                    debug!(worker_id, batch_id = batch.id, attempt, "delta delivered after retry");
                }
            }
            Delivery::Dropped { item, attempts } => {
                warn!(
                    worker_id,
                    batch_id = item.batch_id,
                    lines = line_count,
                    attempts,
                    "aggregator queue full; dropping parsed batch"
                );
                progress.record_dropped(line_count);
            }
            Delivery::Closed { item } => {
                warn!(
                    worker_id,
                    batch_id = item.batch_id,
                    "aggregator is gone; stopping worker"
                );
                progress.record_skipped(batch.start_position);
                break;
            }
        }
    }
    debug!(worker_id, "worker finished");
}
