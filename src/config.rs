use anyhow::{anyhow, Result};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;
use crate::parsers::{KeyValueMode, VariableRule};

pub const DEFAULT_KEYWORDS: [&str; 2] = ["ERROR", "WARNING"];
pub const TEMPLATE_STORE_FILE: &str = "messages.jsonl";

/// Main configuration struct for a logtally run
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub performance: PerformanceConfig,
    pub aggregate: AggregateConfig,
    pub extraction: ExtractionConfig,
}

/// Input configuration
#[derive(Debug, Clone)]
pub struct InputConfig {
    pub path: PathBuf,
    /// Maximum lines per batch
    pub chunk_size: usize,
    /// Wait between reads once the end of the file is reached
    pub poll_interval: Duration,
    /// Stop at the first end of file instead of tailing
    pub once: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("input/app.log"),
            chunk_size: 1000,
            poll_interval: Duration::from_millis(500),
            once: false,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Append-only event log; the summary and template store live next to it
    pub event_log: PathBuf,
    pub checkpoint_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            event_log: PathBuf::from("output/events.jsonl"),
            checkpoint_dir: PathBuf::from("output/checkpoint"),
        }
    }
}

impl OutputConfig {
    pub fn template_store_path(&self) -> PathBuf {
        self.event_log.with_file_name(TEMPLATE_STORE_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        crate::aggregate::summary_path(&self.event_log)
    }
}

/// Performance configuration
#[derive(Debug, Clone)]
pub struct PerformanceConfig {
    pub workers: usize,
    /// Capacity of the worker-to-aggregator channel
    pub queue_capacity: usize,
    /// Delivery attempts per delta before it is dropped
    pub send_attempts: usize,
    pub retry_delay: Duration,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_capacity: 100,
            send_attempts: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    pub flush_interval: Duration,
    pub checkpoint_interval: Duration,
    /// Upper bound on one idle wait for deltas
    pub receive_timeout: Duration,
    /// Capacity of the dedup window; `None` keeps every hash
    pub dedup_window: Option<NonZeroUsize>,
    /// Rebuild totals from an existing event log at startup
    pub resume_summary: bool,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(2),
            checkpoint_interval: Duration::from_secs(5),
            receive_timeout: Duration::from_millis(500),
            dedup_window: None,
            resume_summary: true,
        }
    }
}

/// What the line parser looks for
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub keywords: Vec<String>,
    pub rules: Vec<VariableRule>,
    pub key_values: KeyValueMode,
    /// Attach the line to keyword hits so the aggregator can template it
    pub capture_messages: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            rules: Vec::new(),
            key_values: KeyValueMode::Auto,
            capture_messages: true,
        }
    }
}

impl PipelineConfig {
    /// Build the run configuration from parsed arguments plus the tracking
    /// rules found in configuration files. CLI rules override file rules for
    /// the same category.
    pub fn from_cli(cli: &Cli, file_rules: Vec<VariableRule>) -> Result<Self> {
        let input = cli
            .input
            .clone()
            .ok_or_else(|| anyhow!("An input file is required"))?;

        let checkpoint_dir = cli.checkpoint_dir.clone().unwrap_or_else(|| {
            cli.output
                .parent()
                .map(|dir| dir.join("checkpoint"))
                .unwrap_or_else(|| PathBuf::from("checkpoint"))
        });

        let keywords = if cli.keywords.is_empty() {
            ExtractionConfig::default().keywords
        } else {
            cli.keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        };

        let mut rules = Vec::new();
        for spec in &cli.track {
            rules.push(VariableRule::parse_spec(spec)?);
        }
        for rule in file_rules {
            if !rules.iter().any(|r: &VariableRule| r.category == rule.category) {
                rules.push(rule);
            }
        }

        let dedup_window = match cli.dedup_window {
            Some(0) => return Err(anyhow!("--dedup-window must be greater than zero")),
            Some(n) => NonZeroUsize::new(n),
            None => None,
        };

        let config = Self {
            input: InputConfig {
                path: input,
                chunk_size: cli.chunk_size,
                poll_interval: cli.poll_interval,
                once: cli.once,
            },
            output: OutputConfig {
                event_log: cli.output.clone(),
                checkpoint_dir,
            },
            performance: PerformanceConfig {
                workers: cli.threads.unwrap_or_else(num_cpus::get),
                queue_capacity: cli.queue_size,
                send_attempts: cli.send_attempts,
                retry_delay: cli.retry_delay,
            },
            aggregate: AggregateConfig {
                flush_interval: cli.flush_interval,
                checkpoint_interval: cli.checkpoint_interval,
                dedup_window,
                resume_summary: !cli.no_resume_summary,
                ..AggregateConfig::default()
            },
            extraction: ExtractionConfig {
                keywords,
                rules,
                key_values: cli.key_values,
                capture_messages: !cli.no_messages,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.chunk_size == 0 {
            return Err(anyhow!("--chunk-size must be greater than zero"));
        }
        if self.performance.workers == 0 {
            return Err(anyhow!("--threads must be greater than zero"));
        }
        if self.performance.queue_capacity == 0 {
            return Err(anyhow!("--queue-size must be greater than zero"));
        }
        if self.performance.send_attempts == 0 {
            return Err(anyhow!("--send-attempts must be greater than zero"));
        }
        if self.aggregate.receive_timeout.is_zero() {
            return Err(anyhow!("receive timeout must be greater than zero"));
        }
        if self.output.event_log.file_name().is_none() {
            return Err(anyhow!(
                "Output path must name a file: {}",
                self.output.event_log.display()
            ));
        }
        if self.output.event_log == self.input.path {
            return Err(anyhow!("Output path must differ from the input file"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("logtally").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_cli(&cli(&["app.log"]), Vec::new()).unwrap();
        assert_eq!(config.input.chunk_size, 1000);
        assert_eq!(config.input.poll_interval, Duration::from_millis(500));
        assert_eq!(config.performance.queue_capacity, 100);
        assert_eq!(config.performance.send_attempts, 3);
        assert_eq!(config.aggregate.flush_interval, Duration::from_secs(2));
        assert_eq!(config.aggregate.checkpoint_interval, Duration::from_secs(5));
        assert_eq!(config.extraction.keywords, vec!["ERROR", "WARNING"]);
        assert!(config.aggregate.dedup_window.is_none());
        assert_eq!(
            config.output.checkpoint_dir,
            PathBuf::from("output/checkpoint")
        );
        assert_eq!(
            config.output.template_store_path(),
            PathBuf::from("output/messages.jsonl")
        );
        assert_eq!(
            config.output.summary_path(),
            PathBuf::from("output/events.jsonl.summary.json")
        );
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = PipelineConfig::from_cli(
            &cli(&[
                "app.log",
                "--chunk-size",
                "3",
                "--poll-interval",
                "50ms",
                "--keyword",
                "FATAL,PANIC",
                "--dedup-window",
                "10",
                "-o",
                "out/log.jsonl",
                "--once",
            ]),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(config.input.chunk_size, 3);
        assert_eq!(config.input.poll_interval, Duration::from_millis(50));
        assert!(config.input.once);
        assert_eq!(config.extraction.keywords, vec!["FATAL", "PANIC"]);
        assert_eq!(config.aggregate.dedup_window, NonZeroUsize::new(10));
        assert_eq!(config.output.checkpoint_dir, PathBuf::from("out/checkpoint"));
    }

    #[test]
    fn test_cli_rules_win_over_file_rules() {
        let file_rules = vec![
            VariableRule::new("latency", r"lat=(\d+)").unwrap(),
            VariableRule::new("size", r"size=(\d+)").unwrap(),
        ];
        let config = PipelineConfig::from_cli(
            &cli(&["app.log", "--track", r"latency=latency=(\d+)"]),
            file_rules,
        )
        .unwrap();
        let rules: Vec<(&str, &str)> = config
            .extraction
            .rules
            .iter()
            .map(|r| (r.category.as_str(), r.pattern.as_str()))
            .collect();
        assert_eq!(
            rules,
            vec![("latency", r"latency=(\d+)"), ("size", r"size=(\d+)")]
        );
    }

    #[test]
    fn test_validation_rejects_zeros() {
        for args in [
            ["app.log", "--chunk-size", "0"],
            ["app.log", "--queue-size", "0"],
            ["app.log", "--threads", "0"],
            ["app.log", "--send-attempts", "0"],
            ["app.log", "--dedup-window", "0"],
        ] {
            assert!(
                PipelineConfig::from_cli(&cli(&args), Vec::new()).is_err(),
                "{:?} should be rejected",
                args
            );
        }
    }

    #[test]
    fn test_validation_rejects_bad_rules_and_missing_input() {
        assert!(PipelineConfig::from_cli(&cli(&["app.log", "--track", r"x=\d+"]), Vec::new()).is_err());
        assert!(PipelineConfig::from_cli(&cli(&[]), Vec::new()).is_err());
    }
}
