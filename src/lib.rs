// Core library for logtally: chunked log ingestion, parallel parsing and
// single-writer aggregation with resumable checkpoints

pub mod aggregate;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod config_file;
pub mod event;
pub mod parallel;
pub mod parsers;
pub mod platform;
pub mod readers;
pub mod reset;
pub mod stats;
pub mod timestamp;

pub use aggregate::{Aggregator, SeenSet, Summary};
pub use checkpoint::{CheckpointState, CheckpointStore};
pub use cli::Cli;
pub use config::PipelineConfig;
pub use event::{EventBucket, LogLine, Message, ParseOutput, TimelineEntry};
pub use parallel::{ParallelProcessor, RunReport};
pub use parsers::LineParser;
pub use platform::{Ctrl, StopSignal};
pub use readers::{Chunk, ChunkReader};
pub use stats::PipelineStats;
