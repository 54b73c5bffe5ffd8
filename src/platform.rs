use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use std::io::Write;
use std::path::Path;
use std::process;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

#[cfg(unix)]
use signal_hook::{
    consts::{SIGHUP, SIGINT, SIGTERM, SIGUSR1},
    iterator::Signals,
};

#[cfg(not(unix))]
use signal_hook::{consts::SIGINT, flag};

/// Standard Unix exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidUsage = 2,
    SignalInt = 130,  // 128 + SIGINT (2)
    SignalTerm = 143, // 128 + SIGTERM (15)
}

impl ExitCode {
    pub fn exit(self) -> ! {
        process::exit(self as i32)
    }
}

/// Exit code of the signal that requested shutdown, 0 while none has.
static TERMINATING_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Exit code to report when shutdown was requested by a signal.
pub fn signal_exit_code() -> Option<ExitCode> {
    match TERMINATING_SIGNAL.load(Ordering::Relaxed) {
        130 => Some(ExitCode::SignalInt),
        143 => Some(ExitCode::SignalTerm),
        _ => None,
    }
}

/// Cooperative stop flag shared by every pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleep for up to `duration`, waking early once stopped.
    /// Returns true if the stop was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        const SLICE: Duration = Duration::from_millis(50);
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(SLICE.min(deadline - now));
        }
    }

    #[cfg(not(unix))]
    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Control messages sent by the signal handler to the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctrl {
    /// Log the running statistics
    PrintStats,
    /// Flush outputs and write a checkpoint now
    Flush,
}

/// Signal handler for graceful shutdown
pub struct SignalHandler {
    _handle: thread::JoinHandle<()>,
}

impl SignalHandler {
    pub fn new(stop: StopSignal, ctrl_sender: Sender<Ctrl>) -> Result<Self> {
        #[cfg(unix)]
        {
            let mut signals = Signals::new([SIGINT, SIGTERM, SIGUSR1, SIGHUP])
                .context("Failed to register signal handlers")?;

            let handle = thread::spawn(move || {
                let mut shutdown_count = 0;
                for sig in signals.forever() {
                    match sig {
                        SIGINT | SIGTERM => {
                            let code = if sig == SIGINT {
                                ExitCode::SignalInt
                            } else {
                                ExitCode::SignalTerm
                            };
                            shutdown_count += 1;
                            if shutdown_count > 1 {
                                tracing::warn!("second shutdown signal, exiting immediately");
                                code.exit();
                            }
                            tracing::info!(signal = sig, "shutdown requested, draining pipeline");
                            TERMINATING_SIGNAL.store(code as i32, Ordering::Relaxed);
                            stop.stop();
                        }
                        SIGUSR1 => {
                            let _ = ctrl_sender.send(Ctrl::PrintStats);
                        }
                        SIGHUP => {
                            let _ = ctrl_sender.send(Ctrl::Flush);
                        }
                        _ => tracing::warn!(signal = sig, "unexpected signal"),
                    }
                }
            });

            Ok(SignalHandler { _handle: handle })
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_sender;
            let term_flag = Arc::new(AtomicBool::new(false));
            flag::register(SIGINT, Arc::clone(&term_flag))
                .context("Failed to register signal handlers")?;

            let stop_flag = stop.flag();
            let handle = thread::spawn(move || loop {
                thread::sleep(Duration::from_millis(100));
                if term_flag.swap(false, Ordering::Relaxed) {
                    if stop_flag.load(Ordering::Relaxed) {
                        ExitCode::SignalInt.exit();
                    }
                    TERMINATING_SIGNAL.store(ExitCode::SignalInt as i32, Ordering::Relaxed);
                    stop_flag.store(true, Ordering::Relaxed);
                }
            });

            Ok(SignalHandler { _handle: handle })
        }
    }
}

/// Replace `path` with `contents` so readers never observe a partial file.
///
/// The data goes to a temporary file in the same directory first, then is
/// renamed over the target.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("Failed to write temporary file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temporary file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::InvalidUsage as i32, 2);
        assert_eq!(ExitCode::SignalInt as i32, 130);
        assert_eq!(ExitCode::SignalTerm as i32, 143);
    }

    #[test]
    fn test_no_signal_initially() {
        assert_eq!(signal_exit_code(), None);
    }

    #[test]
    fn test_stop_signal_is_shared_between_clones() {
        let stop = StopSignal::new();
        let clone = stop.clone();
        assert!(!clone.is_stopped());
        stop.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn test_sleep_wakes_early_when_stopped() {
        let stop = StopSignal::new();
        assert!(!stop.sleep(Duration::from_millis(10)));

        let remote = stop.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.stop();
        });
        let started = Instant::now();
        assert!(stop.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");

        write_atomic(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");

        // no temporary files left behind
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
