// Command-line interface definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::parsers::KeyValueMode;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "logtally")]
#[command(about = "Tail a growing log file and aggregate its errors, warnings and numeric signals")]
#[command(
    long_about = "Tail a growing log file and aggregate its errors, warnings and numeric signals\n\nLines are read in chunks, parsed by a pool of worker threads and merged by a single\naggregator that deduplicates them, templates their messages and writes:\n  <output>                 append-only event log (JSON lines)\n  <output>.summary.json    summary snapshot, rewritten on every flush\n  messages.jsonl           message template store, next to the event log\n\nProgress is checkpointed so a restarted run resumes where the last one stopped.\n\nCOMMON EXAMPLES:\n  logtally input/app.log\n  logtally input/app.log --once --stats\n  logtally app.log --track 'latency=latency=(\\d+)ms' --dedup-window 100000"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Log file to ingest
    pub input: Option<PathBuf>,

    /// Lines per batch handed to a worker
    #[arg(
        long = "chunk-size",
        default_value_t = 1000,
        help_heading = "Input Options"
    )]
    pub chunk_size: usize,

    /// Wait between reads once the end of the file is reached (e.g. 500ms, 2s)
    #[arg(
        long = "poll-interval",
        default_value = "500ms",
        value_parser = humantime::parse_duration,
        help_heading = "Input Options"
    )]
    pub poll_interval: Duration,

    /// Stop at the end of the file instead of waiting for more lines
    #[arg(long = "once", help_heading = "Input Options")]
    pub once: bool,

    /// Event log path; the summary and template store are written next to it
    #[arg(
        short = 'o',
        long = "output",
        default_value = "output/events.jsonl",
        help_heading = "Output Options"
    )]
    pub output: PathBuf,

    /// Directory for the resume checkpoint (default: <output dir>/checkpoint)
    #[arg(long = "checkpoint-dir", help_heading = "Output Options")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Remove previous outputs and checkpoint before starting
    #[arg(long = "reset", help_heading = "Output Options")]
    pub reset: bool,

    /// Start the summary from zero instead of replaying the existing event log
    #[arg(long = "no-resume-summary", help_heading = "Output Options")]
    pub no_resume_summary: bool,

    /// Keywords counted as categories (comma-separated, default: ERROR,WARNING)
    #[arg(
        short = 'k',
        long = "keyword",
        value_delimiter = ',',
        help_heading = "Extraction Options"
    )]
    pub keywords: Vec<String>,

    /// Track a numeric signal: category=regex with exactly one capture group
    #[arg(long = "track", value_name = "CATEGORY=REGEX", help_heading = "Extraction Options")]
    pub track: Vec<String>,

    /// When to extract generic key=value pairs
    #[arg(
        long = "key-values",
        value_enum,
        default_value_t = KeyValueMode::Auto,
        help_heading = "Extraction Options"
    )]
    pub key_values: KeyValueMode,

    /// Record keyword hits without their message (no templating)
    #[arg(long = "no-messages", help_heading = "Extraction Options")]
    pub no_messages: bool,

    /// Number of parser threads (default: number of CPUs)
    #[arg(short = 'j', long = "threads", help_heading = "Performance Options")]
    pub threads: Option<usize>,

    /// Capacity of the queue between workers and the aggregator
    #[arg(
        long = "queue-size",
        default_value_t = 100,
        help_heading = "Performance Options"
    )]
    pub queue_size: usize,

    /// Delivery attempts for a parsed batch before it is dropped
    #[arg(
        long = "send-attempts",
        default_value_t = 3,
        help_heading = "Performance Options"
    )]
    pub send_attempts: usize,

    /// Wait between delivery attempts
    #[arg(
        long = "retry-delay",
        default_value = "100ms",
        value_parser = humantime::parse_duration,
        help_heading = "Performance Options"
    )]
    pub retry_delay: Duration,

    /// How often the summary snapshot is rewritten
    #[arg(
        long = "flush-interval",
        default_value = "2s",
        value_parser = humantime::parse_duration,
        help_heading = "Aggregation Options"
    )]
    pub flush_interval: Duration,

    /// How often the resume checkpoint is saved
    #[arg(
        long = "checkpoint-interval",
        default_value = "5s",
        value_parser = humantime::parse_duration,
        help_heading = "Aggregation Options"
    )]
    pub checkpoint_interval: Duration,

    /// Remember only the N most recently seen lines for deduplication
    #[arg(long = "dedup-window", value_name = "N", help_heading = "Aggregation Options")]
    pub dedup_window: Option<usize>,

    /// Print processing statistics to stderr on exit
    #[arg(short = 's', long = "stats", help_heading = "Diagnostics")]
    pub stats: bool,

    /// Log verbosity (RUST_LOG overrides)
    #[arg(
        long = "log-level",
        value_enum,
        default_value_t = LogLevel::Info,
        help_heading = "Diagnostics"
    )]
    pub log_level: LogLevel,

    /// Use this configuration file instead of .logtallyrc discovery
    #[arg(long = "config-file", help_heading = "Configuration Options")]
    pub config_file: Option<PathBuf>,

    /// Ignore configuration files
    #[arg(long = "ignore-config", help_heading = "Configuration Options")]
    pub ignore_config: bool,

    /// Show configuration file locations and active settings, then exit
    #[arg(long = "show-config", help_heading = "Configuration Options")]
    pub show_config: bool,
}

/// True if `args` contain a flag, checked before full parsing so configuration
/// discovery can be skipped or redirected.
pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().skip(1).any(|arg| arg == flag)
}

/// Value of `--flag value` or `--flag=value` in raw arguments.
pub fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == flag {
            return iter.next().cloned();
        }
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_durations_and_lists() {
        let cli = Cli::try_parse_from([
            "logtally",
            "app.log",
            "--flush-interval",
            "250ms",
            "-k",
            "ERROR,FATAL",
            "--track",
            r"latency=latency=(\d+)",
            "--track",
            r"size=size=(\d+)",
        ])
        .unwrap();
        assert_eq!(cli.flush_interval, Duration::from_millis(250));
        assert_eq!(cli.keywords, vec!["ERROR", "FATAL"]);
        assert_eq!(cli.track.len(), 2);
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn test_later_flags_override_earlier_ones() {
        let cli =
            Cli::try_parse_from(["logtally", "--chunk-size", "5", "app.log", "--chunk-size", "7"])
                .unwrap();
        assert_eq!(cli.chunk_size, 7);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        assert!(Cli::try_parse_from(["logtally", "app.log", "--poll-interval", "soon"]).is_err());
    }

    #[test]
    fn test_raw_flag_helpers() {
        let raw = args(&["logtally", "--config-file", "a.ini", "app.log", "--ignore-config"]);
        assert!(has_flag(&raw, "--ignore-config"));
        assert!(!has_flag(&raw, "--show-config"));
        assert_eq!(flag_value(&raw, "--config-file"), Some("a.ini".to_string()));

        let raw = args(&["logtally", "--config-file=b.ini"]);
        assert_eq!(flag_value(&raw, "--config-file"), Some("b.ini".to_string()));
    }
}
