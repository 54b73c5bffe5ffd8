// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use logtally::config::{OutputConfig, PipelineConfig};

pub const BINARY: &str = env!("CARGO_BIN_EXE_logtally");

/// Scratch layout mirroring a deployment: an input file and an output directory.
pub struct Workspace {
    pub dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn input(&self) -> PathBuf {
        self.dir.path().join("input").join("app.log")
    }

    pub fn event_log(&self) -> PathBuf {
        self.dir.path().join("output").join("events.jsonl")
    }

    pub fn summary(&self) -> PathBuf {
        self.dir.path().join("output").join("events.jsonl.summary.json")
    }

    pub fn templates(&self) -> PathBuf {
        self.dir.path().join("output").join("messages.jsonl")
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.dir.path().join("output").join("checkpoint")
    }

    pub fn write_input(&self, content: &str) {
        let path = self.input();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn append_input(&self, content: &str) {
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.input())
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    /// Library configuration for a single pass over the input with fast timers.
    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.input.path = self.input();
        config.input.chunk_size = 2;
        config.input.poll_interval = Duration::from_millis(20);
        config.input.once = true;
        config.output = OutputConfig {
            event_log: self.event_log(),
            checkpoint_dir: self.checkpoint_dir(),
        };
        config.performance.workers = 2;
        config.aggregate.flush_interval = Duration::from_millis(50);
        config.aggregate.checkpoint_interval = Duration::from_millis(50);
        config.aggregate.receive_timeout = Duration::from_millis(20);
        config
    }

    /// Arguments pointing the binary at this workspace.
    pub fn args(&self) -> Vec<String> {
        vec![
            self.input().display().to_string(),
            "--output".to_string(),
            self.event_log().display().to_string(),
            "--ignore-config".to_string(),
            "--log-level".to_string(),
            "warn".to_string(),
        ]
    }
}

pub fn read_json(path: &Path) -> serde_json::Value {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    serde_json::from_str(&content).expect("valid JSON")
}

pub fn read_jsonl(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("valid JSON line"))
        .collect()
}

/// Run logtally to completion and capture (stdout, stderr, exit code).
pub fn run_logtally(args: &[String]) -> (String, String, i32) {
    let output = Command::new(BINARY)
        .args(args)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to execute logtally");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

/// Start logtally in the background (tailing mode).
pub fn spawn_logtally(args: &[String]) -> Child {
    Command::new(BINARY)
        .args(args)
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start logtally")
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    condition()
}
