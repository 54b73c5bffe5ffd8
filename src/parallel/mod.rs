//! Parallel ingestion pipeline
//!
//! One dispatcher thread reads the input in chunks, a pool of worker threads
//! parses them, and a single aggregator thread merges the results.
//!
//! # Module Structure
//!
//! - `types`: batches, deltas, configuration and shared progress
//! - `batching`: dispatcher thread driving the chunk reader
//! - `worker`: worker thread parsing batches
//! - `delivery`: bounded hand-off with retry and drop
//! - `sink`: aggregator thread with periodic flush and checkpoint
//! - `processor`: `ParallelProcessor` orchestration
//!
//! Deltas reach the aggregator in completion order, which may differ from
//! file order across batches; within one batch, line order is preserved.

mod batching;
mod delivery;
mod processor;
mod sink;
mod types;
mod worker;

pub use delivery::{deliver_with_retry, Delivery, DeliveryError, DeltaSink, RetryPolicy};
pub use processor::{ParallelProcessor, RunReport};
pub use types::{Batch, Delta, ParallelConfig, PipelineProgress};
