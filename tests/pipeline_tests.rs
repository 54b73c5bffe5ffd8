// tests/pipeline_tests.rs
// End-to-end ingestion through the library API
mod common;

use common::{read_json, read_jsonl, Workspace};
use crossbeam_channel::unbounded;
use logtally::parsers::VariableRule;
use logtally::{ParallelProcessor, StopSignal};

fn run_once(config: logtally::PipelineConfig) -> logtally::RunReport {
    let (_ctrl_tx, ctrl_rx) = unbounded();
    ParallelProcessor::new(config)
        .run(StopSignal::new(), ctrl_rx)
        .expect("pipeline run failed")
}

#[test]
fn test_single_pass_produces_summary_log_and_templates() {
    let workspace = Workspace::new();
    workspace.write_input(concat!(
        "2025-11-23 12:00:00 INFO User login successful\n",
        "2025-11-23 12:01:00 ERROR Database connection failed\n",
        "2025-11-23 12:02:00 INFO latency=123\n",
    ));

    let report = run_once(workspace.config());

    let summary = read_json(&workspace.summary());
    assert_eq!(summary["summary"]["error_count"], 1);
    assert_eq!(summary["summary"]["warning_count"], 0);
    assert_eq!(summary["summary"]["metrics"]["latency"]["count"], 1);
    assert_eq!(summary["summary"]["metrics"]["latency"]["average"], 123.0);
    assert_eq!(summary["timeline_count"], 2);
    assert_eq!(summary["unique_messages"], 1);

    let templates = read_jsonl(&workspace.templates());
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0]["id"], 0);
    assert_eq!(templates[0]["template"], "ERROR Database connection failed");

    let events = read_jsonl(&workspace.event_log());
    assert_eq!(events.len(), 2);
    let error = events.iter().find(|e| e["event"] == "ERROR").unwrap();
    assert_eq!(error["msg_id"], 0);
    assert_eq!(error["time"], "2025-11-23T12:01:00");
    assert!(error.get("msg_values").is_none());

    assert_eq!(report.stats.parse.lines_read, 3);
    assert_eq!(report.stats.parse.lines_matched, 2);
    assert_eq!(report.final_position, std::fs::metadata(workspace.input()).unwrap().len());
}

#[test]
fn test_input_without_trailing_newline_is_fully_ingested() {
    let workspace = Workspace::new();
    workspace.write_input(concat!(
        "2025-11-23 12:01:00 ERROR Database connection failed\n",
        "2025-11-23 12:02:00 INFO latency=123",
    ));

    let report = run_once(workspace.config());

    assert_eq!(report.stats.parse.lines_read, 2);
    assert_eq!(report.summary.summary.error_count, 1);
    let summary = read_json(&workspace.summary());
    assert_eq!(summary["summary"]["metrics"]["latency"]["count"], 1);
    assert_eq!(summary["summary"]["metrics"]["latency"]["average"], 123.0);
    assert_eq!(read_jsonl(&workspace.templates()).len(), 1);
    assert_eq!(report.final_position, std::fs::metadata(workspace.input()).unwrap().len());
}

#[test]
fn test_duplicate_lines_in_input_are_counted_once() {
    let workspace = Workspace::new();
    workspace.write_input(concat!(
        "2025-11-23 12:01:00 ERROR disk full\n",
        "2025-11-23 12:01:00 ERROR disk full\n",
        "2025-11-23 12:02:00 ERROR disk full\n",
    ));

    let report = run_once(workspace.config());

    // The third line differs by its timestamp, so only the exact repeat is dropped
    assert_eq!(report.summary.summary.error_count, 2);
    assert_eq!(report.stats.duplicates_skipped, 1);
    assert_eq!(report.summary.unique_messages, 1);
}

#[test]
fn test_numeric_variants_share_one_template() {
    let workspace = Workspace::new();
    let lines: String = (1..=20)
        .map(|i| format!("2025-11-23 12:00:{:02} WARNING retry {} of 20\n", i, i))
        .collect();
    workspace.write_input(&lines);

    let report = run_once(workspace.config());

    assert_eq!(report.summary.summary.warning_count, 20);
    assert_eq!(report.summary.unique_messages, 1);
    let templates = read_jsonl(&workspace.templates());
    assert_eq!(templates[0]["template"], "WARNING retry {num} of {num}");

    let events = read_jsonl(&workspace.event_log());
    assert_eq!(events.len(), 20);
    assert!(events.iter().all(|e| e["msg_id"] == 0));
    assert!(events
        .iter()
        .any(|e| e["msg_values"] == serde_json::json!(["7", "20"])));
}

#[test]
fn test_explicit_tracking_rules() {
    let workspace = Workspace::new();
    workspace.write_input(concat!(
        "2025-11-23 12:00:00 INFO request took 250ms size=10\n",
        "2025-11-23 12:00:01 INFO request took 150ms size=20\n",
        "2025-11-23 12:00:02 INFO request took fastms\n",
    ));

    let mut config = workspace.config();
    config.extraction.rules = vec![VariableRule::new("latency", r"took (\w+)ms").unwrap()];
    let report = run_once(config);

    let metrics = &report.summary.summary.metrics;
    assert_eq!(metrics["latency"].count, 2);
    assert_eq!(metrics["latency"].average, 200.0);
    // generic key=value is off once explicit rules exist
    assert!(!metrics.contains_key("size"));
    assert_eq!(report.stats.parse.value_errors, 1);
}

#[test]
fn test_small_queue_and_many_workers_lose_nothing_without_pressure() {
    let workspace = Workspace::new();
    let lines: String = (0..500)
        .map(|i| format!("2025-11-23 12:00:00 INFO id={} latency={}\n", i, i % 10))
        .collect();
    workspace.write_input(&lines);

    let mut config = workspace.config();
    config.input.chunk_size = 7;
    config.performance.workers = 4;
    config.performance.queue_capacity = 1;
    config.performance.send_attempts = 1000;
    config.performance.retry_delay = std::time::Duration::from_millis(1);
    let report = run_once(config);

    assert_eq!(report.stats.deltas_dropped, 0);
    assert_eq!(report.summary.summary.metrics["latency"].count, 500);
    assert_eq!(report.summary.summary.metrics["latency"].average, 4.5);
    assert_eq!(report.summary.summary.metrics["id"].count, 500);
}

#[test]
fn test_missing_input_in_once_mode_finishes_cleanly() {
    let workspace = Workspace::new();
    let report = run_once(workspace.config());
    assert_eq!(report.stats.parse.lines_read, 0);
    assert_eq!(report.final_position, 0);
    assert!(workspace.summary().exists());
}
