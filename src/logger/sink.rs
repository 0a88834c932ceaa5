//! Diagnostic sinks injected into the daemon components.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::config::LoggingConfig;
use crate::logger::jsonl::{JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Receives every diagnostic the daemon produces.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, entry: LogEntry);

    /// Called on SIGHUP so file-backed sinks can reopen their files.
    fn reopen(&self) {}
}

/// Stderr lines at or above a threshold, plus an optional JSONL file that
/// receives everything.
pub struct ActivityLog {
    stderr_threshold: Option<Severity>,
    jsonl: Option<Mutex<JsonlWriter>>,
}

impl ActivityLog {
    #[must_use]
    pub fn new(stderr_threshold: Option<Severity>, jsonl_path: Option<PathBuf>) -> Self {
        Self {
            stderr_threshold,
            jsonl: jsonl_path.map(|path| Mutex::new(JsonlWriter::open(JsonlConfig::new(path)))),
        }
    }

    /// `quiet` silences stderr entirely; `verbose` (from the flag or the
    /// config) lowers the threshold to debug.
    #[must_use]
    pub fn from_config(config: &LoggingConfig, verbose: bool, quiet: bool) -> Self {
        let threshold = if quiet {
            None
        } else if verbose || config.verbose {
            Some(Severity::Debug)
        } else {
            Some(Severity::Info)
        };
        Self::new(threshold, config.jsonl_path.clone())
    }
}

impl DiagnosticSink for ActivityLog {
    fn record(&self, entry: LogEntry) {
        if self.stderr_threshold.is_some_and(|min| entry.severity >= min) {
            let _ = writeln!(io::stderr(), "{}", format_stderr_line(&entry));
        }
        if let Some(jsonl) = &self.jsonl {
            jsonl.lock().write_entry(&entry);
        }
    }

    fn reopen(&self) {
        if let Some(jsonl) = &self.jsonl {
            jsonl.lock().try_recover();
        }
    }
}

/// `[NLCD-FETCH_ERROR] WARNING fetch failed: [NLCD-2001] ...`
#[must_use]
pub fn format_stderr_line(entry: &LogEntry) -> String {
    let mut line = format!("[NLCD-{}] ", entry.event.tag());
    match entry.severity {
        Severity::Warning => line.push_str("WARNING "),
        Severity::Critical => line.push_str("CRITICAL "),
        Severity::Debug | Severity::Info => {}
    }
    line.push_str(&entry.message);
    if let Some(err) = &entry.error_message {
        line.push_str(": ");
        line.push_str(err);
    } else if let Some(details) = &entry.details {
        line.push_str(" (");
        line.push_str(details);
        line.push(')');
    }
    line
}

/// Keeps entries in memory; for tests and for `--json` reporting.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&self, _entry: LogEntry) {}
}
