//! Decoupled logging pipeline for deployment runs.
//!
//! # Architecture
//!
//! ```text
//! log::info!() ...        tool output lines
//!     |                         |
//! [LogCollector] (non-blocking, echoes log records to stderr)
//!     | (crossbeam channel)
//!     v
//! [writer thread]
//!     |
//! <log_dir>/full/<ts>.log     every line
//! <log_dir>/parsed/<ts>.log   milestones and state transitions only
//! ```
//!
//! The writer is a plain OS thread, so it keeps draining no matter which
//! runtime (if any) the caller is on.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Log target routed to the parsed log in addition to the full log.
pub const PARSED_TARGET: &str = "parsed";

enum LogMessage {
    Line(LogLine),
    /// Flush marker for synchronous callers
    Flush(std::sync::mpsc::Sender<()>),
    /// Flush marker for async callers
    FlushAsync(tokio::sync::oneshot::Sender<()>),
}

/// A log line with metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    pub message: String,

    /// Also written to the parsed log
    pub parsed: bool,

    /// Wall-clock time the line was created, `HH:MM:SS.mmm`
    pub timestamp: String,
}

impl LogLine {
    pub fn new(message: String) -> Self {
        LogLine {
            message,
            parsed: false,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(message: String) -> Self {
        LogLine {
            parsed: true,
            ..LogLine::new(message)
        }
    }

    fn formatted(&self) -> String {
        format!("[{}] {}\n", self.timestamp, self.message)
    }
}

/// Get the default logs path relative to the current working directory: ./logs
pub fn default_logs_path() -> Result<PathBuf, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Failed to get current working directory: {}", e))?;
    Ok(cwd.join("logs"))
}

/// Unified logger: echoes to the terminal and persists to disk.
#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    full_log_path: PathBuf,
    parsed_log_path: PathBuf,
    level: LevelFilter,
    /// Echo `log` records to stderr
    echo: bool,
}

impl LogCollector {
    /// Create a collector writing one session's logs under `log_dir`.
    pub fn new(log_dir: &Path, level: LevelFilter) -> Result<Self, String> {
        let full_log_dir = log_dir.join("full");
        let parsed_log_dir = log_dir.join("parsed");
        std::fs::create_dir_all(&full_log_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&parsed_log_dir)
            .map_err(|e| format!("Failed to create parsed log dir: {}", e))?;

        let session = Local::now().format("%Y%m%d_%H%M%S%.3f").to_string();
        let full_log_path = full_log_dir.join(format!("{}.log", session));
        let parsed_log_path = parsed_log_dir.join(format!("{}.log", session));

        let mut full = open_append(&full_log_path)?;
        let mut parsed = open_append(&parsed_log_path)?;

        let (tx, rx) = unbounded::<LogMessage>();
        std::thread::spawn(move || {
            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        let formatted = line.formatted();
                        let _ = full.write_all(formatted.as_bytes());
                        if line.parsed {
                            let _ = parsed.write_all(formatted.as_bytes());
                        }
                    }
                    LogMessage::Flush(done) => {
                        let _ = full.flush();
                        let _ = parsed.flush();
                        let _ = done.send(());
                    }
                    LogMessage::FlushAsync(done) => {
                        let _ = full.flush();
                        let _ = parsed.flush();
                        let _ = done.send(());
                    }
                }
            }
        });

        Ok(LogCollector {
            tx,
            full_log_path,
            parsed_log_path,
            level,
            echo: true,
        })
    }

    /// Disable the stderr echo of `log` records (files are still written).
    pub fn without_echo(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn full_log_path(&self) -> &Path {
        &self.full_log_path
    }

    pub fn parsed_log_path(&self) -> &Path {
        &self.parsed_log_path
    }

    /// Send a log line (non-blocking)
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Record a raw output line in the full log.
    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(message.into()));
    }

    /// Record a milestone in both the full and the parsed log.
    pub fn log_parsed(&self, message: impl Into<String>) {
        self.log_line(LogLine::parsed(message.into()));
    }

    /// Block until every line sent so far has been written out.
    pub fn drain(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }

    /// Wait for all pending logs to be written to disk.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        self.tx
            .send(LogMessage::FlushAsync(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.await
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }

    /// Register a clone of this collector as the global `log` logger.
    pub fn install(&self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(self.level);
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}

/// Wires all log::info!(), log::warn!(), log::error!() calls into LogCollector
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let message = format!("[{}] {}", record.level(), record.args());
        if self.echo {
            eprintln!("{}", message);
        }

        if record.target() == PARSED_TARGET {
            self.log_parsed(message);
        } else {
            self.log_str(message);
        }
    }

    fn flush(&self) {
        let _ = self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_log_collector_creates_session_files() {
        let dir = TempDir::new().unwrap();
        let collector = LogCollector::new(dir.path(), LevelFilter::Info).unwrap();

        assert!(dir.path().join("full").is_dir());
        assert!(dir.path().join("parsed").is_dir());
        assert!(collector.full_log_path().is_file());
        assert!(collector.parsed_log_path().is_file());
    }

    #[test]
    fn test_parsed_lines_go_to_both_logs() {
        let dir = TempDir::new().unwrap();
        let collector = LogCollector::new(dir.path(), LevelFilter::Info).unwrap();

        collector.log_str("   Compiling firmware v0.1.0");
        collector.log_parsed("STATE TRANSITION: idle -> compiling");
        collector.drain().unwrap();

        let full = fs::read_to_string(collector.full_log_path()).unwrap();
        let parsed = fs::read_to_string(collector.parsed_log_path()).unwrap();
        assert!(full.contains("Compiling firmware"));
        assert!(full.contains("STATE TRANSITION"));
        assert!(!parsed.contains("Compiling firmware"));
        assert!(parsed.contains("STATE TRANSITION"));
    }

    #[tokio::test]
    async fn test_wait_for_empty_after_burst() {
        let dir = TempDir::new().unwrap();
        let collector = LogCollector::new(dir.path(), LevelFilter::Info).unwrap();

        for i in 0..1000 {
            collector.log_str(format!("Log message {}", i));
        }
        collector.wait_for_empty().await.unwrap();

        let full = fs::read_to_string(collector.full_log_path()).unwrap();
        assert_eq!(full.lines().count(), 1000);
        assert!(full.contains("Log message 999"));
    }

    #[test]
    fn test_level_filter_drops_records() {
        let dir = TempDir::new().unwrap();
        let collector = LogCollector::new(dir.path(), LevelFilter::Warn)
            .unwrap()
            .without_echo();

        collector.log(
            &Record::builder()
                .args(format_args!("quiet detail"))
                .level(log::Level::Info)
                .target("remote_flash")
                .build(),
        );
        collector.log(
            &Record::builder()
                .args(format_args!("transfer failed"))
                .level(log::Level::Error)
                .target(PARSED_TARGET)
                .build(),
        );
        collector.drain().unwrap();

        let full = fs::read_to_string(collector.full_log_path()).unwrap();
        let parsed = fs::read_to_string(collector.parsed_log_path()).unwrap();
        assert!(!full.contains("quiet detail"));
        assert!(parsed.contains("[ERROR] transfer failed"));
    }
}
