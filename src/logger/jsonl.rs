//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are built in memory and written with a single `write_all`, then
//! flushed, so a reader tailing the file never sees half an entry. The daemon
//! writes a handful of lines per poll, which keeps per-line flushing cheap.
//!
//! Degradation chain when the file cannot be written:
//! 1. Configured path
//! 2. stderr with `[NLCD-JSONL]` prefix
//! 3. Silent discard (logging never stops the daemon)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{NlcdError, Result};
use crate::core::problem::Problem;

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Critical,
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DaemonStart,
    DaemonStop,
    ConfigReload,
    Fetch,
    FetchError,
    DataFormat,
    Render,
    Splash,
    DeviceAttached,
    DeviceDetached,
    ReattachAttempt,
    ImageFlashed,
    Error,
}

impl EventType {
    /// Upper-case tag used in stderr lines (`[NLCD-FETCH_ERROR]`).
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::DaemonStart => "DAEMON_START",
            Self::DaemonStop => "DAEMON_STOP",
            Self::ConfigReload => "CONFIG_RELOAD",
            Self::Fetch => "FETCH",
            Self::FetchError => "FETCH_ERROR",
            Self::DataFormat => "DATA_FORMAT",
            Self::Render => "RENDER",
            Self::Splash => "SPLASH",
            Self::DeviceAttached => "DEVICE_ATTACHED",
            Self::DeviceDetached => "DEVICE_DETACHED",
            Self::ReattachAttempt => "REATTACH_ATTEMPT",
            Self::ImageFlashed => "IMAGE_FLASHED",
            Self::Error => "ERROR",
        }
    }
}

/// A single log entry. Only `ts`, `event`, `severity` and `message` are
/// always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with milliseconds.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    pub message: String,
    /// Backend name (`http`, `database`, `jsonfile`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Zero-based display line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// NLCD error code when the event reports a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            message: message.into(),
            source: None,
            line: None,
            state: None,
            description: None,
            count: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    #[must_use]
    pub fn with_problem(mut self, line: usize, problem: &Problem) -> Self {
        self.line = Some(line);
        self.state = Some(problem.state().as_str().to_string());
        self.description = Some(problem.description().to_string());
        self
    }

    #[must_use]
    pub const fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &NlcdError) -> Self {
        self.error_code = Some(error.code().to_string());
        self.error_message = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Rotate once the file would grow past this size. Default: 10 MiB.
    pub max_size_bytes: u64,
    /// Rotated generations kept (`.1` newest). Default: 3.
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// Append-only JSONL log writer with rotation and degradation.
pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<File>,
    state: WriterState,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the log file, falling through the degradation chain on failure.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            file: None,
            state: WriterState::Discard,
            bytes_written: 0,
        };
        w.try_open();
        w
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[NLCD-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Current degradation state.
    pub fn state(&self) -> &'static str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    /// Re-open the log file after a degradation. Called on SIGHUP.
    pub fn try_recover(&mut self) {
        if self.state == WriterState::Normal {
            return;
        }
        if let Ok((file, size)) = open_append(&self.config.path) {
            self.file = Some(file);
            self.state = WriterState::Normal;
            self.bytes_written = size;
            let _ = writeln!(
                io::stderr(),
                "[NLCD-JSONL] recovered, writing to {}",
                self.config.path.display()
            );
        }
    }

    // ──────────────────────── internals ────────────────────────

    fn write_line(&mut self, line: &str) {
        if self.bytes_written + line.len() as u64 > self.config.max_size_bytes
            && self.state == WriterState::Normal
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal => {
                let written = self
                    .file
                    .as_mut()
                    .is_some_and(|f| f.write_all(line.as_bytes()).and_then(|()| f.flush()).is_ok());
                if written {
                    self.bytes_written += line.len() as u64;
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[NLCD-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn try_open(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.file = Some(file);
                self.state = WriterState::Normal;
                self.bytes_written = size;
            }
            Err(err) => {
                self.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[NLCD-JSONL] {err}, using stderr");
            }
        }
    }

    fn degrade(&mut self) {
        self.file = None;
        match self.state {
            WriterState::Normal => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[NLCD-JSONL] write to {} failed, using stderr",
                    self.config.path.display()
                );
            }
            WriterState::Stderr => self.state = WriterState::Discard,
            WriterState::Discard => {}
        }
    }

    fn rotate(&mut self) {
        self.file = None;
        let base = self.config.path.clone();

        // foo.jsonl.2 → foo.jsonl.3, foo.jsonl.1 → foo.jsonl.2, foo.jsonl → foo.jsonl.1
        let _ = fs::remove_file(rotated_name(&base, self.config.max_rotated_files));
        for i in (1..self.config.max_rotated_files).rev() {
            let _ = rename(rotated_name(&base, i), rotated_name(&base, i + 1));
        }
        let _ = rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.file = Some(file);
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

// ──────────────────────── helpers ────────────────────────

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| NlcdError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| NlcdError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// `foo.jsonl` → `foo.jsonl.3`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────
