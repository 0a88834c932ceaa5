//! Daemon main loop: fetch → parse → reconcile → sleep, with error routing.
//!
//! Everything runs on one thread. Fetch failures keep the last good display
//! and wait for the next poll. Device failures detach the panel and block in
//! a fixed-interval reattach loop until it comes back. Anything else ends the
//! loop with an error.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Instant;

use crate::core::config::Config;
use crate::core::errors::{NlcdError, Recovery, Result};
use crate::daemon::signals::{
    SignalHandler, Sleeper, ThreadSleeper, Wake, pause, pause_until_shutdown,
};
use crate::display::session::DeviceSession;
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::logger::sink::DiagnosticSink;
use crate::source::registry::build_source;
use crate::source::{ParsedStatus, ProblemSource};

/// What one poll cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Rendered {
        problems: usize,
        suppressed: usize,
        commands: usize,
    },
    /// Fetch failed; the display keeps its last state.
    Skipped,
    /// The panel was lost and is attached again.
    Reattached,
    /// Shutdown was requested while waiting for the panel.
    Interrupted,
}

/// Counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub skipped: u64,
    pub reattaches: u64,
    pub attach_attempts: u64,
}

// ──────────────────── orchestrator ────────────────────

pub struct Orchestrator {
    config: Config,
    /// `-p` from the command line. Pins the backend across reloads; without
    /// it every reload follows `lcd.protocol` from the file.
    protocol_override: Option<String>,
    source: Box<dyn ProblemSource>,
    session: DeviceSession,
    sink: Arc<dyn DiagnosticSink>,
    signals: SignalHandler,
    sleeper: Box<dyn Sleeper>,
    stats: LoopStats,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        config: Config,
        protocol_override: Option<String>,
        source: Box<dyn ProblemSource>,
        session: DeviceSession,
        sink: Arc<dyn DiagnosticSink>,
        signals: SignalHandler,
    ) -> Self {
        Self {
            config,
            protocol_override,
            source,
            session,
            sink,
            signals,
            sleeper: Box::new(ThreadSleeper),
            stats: LoopStats::default(),
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub const fn stats(&self) -> LoopStats {
        self.stats
    }

    #[must_use]
    pub const fn session(&self) -> &DeviceSession {
        &self.session
    }

    #[must_use]
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// One poll: fetch, parse, draw. Recoverable errors are handled here;
    /// only fatal ones are returned.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome> {
        self.stats.cycles += 1;

        if !self.session.is_attached() {
            return Ok(self.reattach_blocking());
        }

        let document = match self.source.fetch() {
            Ok(document) => document,
            Err(err) => return self.route(err, EventType::FetchError, "fetch failed"),
        };
        let parsed = self.source.parse(&document);
        self.log_parsed(&parsed);

        match self.session.show_problems(&parsed.problems) {
            Ok(commands) => Ok(CycleOutcome::Rendered {
                problems: parsed.problems.len(),
                suppressed: parsed.suppressed,
                commands,
            }),
            Err(err) => self.route(err, EventType::Error, "render failed"),
        }
    }

    /// Attach, draw one poll and release. Nothing is retried: every error,
    /// including a missing or failing panel, is returned to the caller.
    pub fn run_once(&mut self) -> Result<CycleOutcome> {
        self.stats.cycles += 1;
        self.session.attach()?;
        let result = self.draw_once();
        self.session.detach();
        result
    }

    fn draw_once(&mut self) -> Result<CycleOutcome> {
        let document = self.source.fetch()?;
        let parsed = self.source.parse(&document);
        self.log_parsed(&parsed);
        let commands = self.session.show_problems(&parsed.problems)?;
        Ok(CycleOutcome::Rendered {
            problems: parsed.problems.len(),
            suppressed: parsed.suppressed,
            commands,
        })
    }

    /// Loop until shutdown. Returns the first fatal error.
    pub fn run(&mut self) -> Result<LoopStats> {
        let started = Instant::now();
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.sink.record(
            LogEntry::new(
                EventType::DaemonStart,
                Severity::Info,
                format!("nagios-lcd {} starting", env!("CARGO_PKG_VERSION")),
            )
            .with_source(self.source.name())
            .with_details(format!("config hash {config_hash}")),
        );

        if !self.session.is_attached() {
            // No panel at startup is a hard error, unlike a panel lost later.
            self.session.attach()?;
        }

        let result = self.run_loop();

        self.session.detach();
        let uptime = started.elapsed().as_secs();
        let (severity, reason) = match &result {
            Ok(()) => (Severity::Info, "clean shutdown".to_string()),
            Err(err) => (Severity::Critical, err.to_string()),
        };
        self.sink.record(
            LogEntry::new(
                EventType::DaemonStop,
                severity,
                format!("stopped after {uptime}s: {reason}"),
            )
            .with_details(format!(
                "cycles={} skipped={} reattaches={}",
                self.stats.cycles, self.stats.skipped, self.stats.reattaches
            )),
        );
        result.map(|()| self.stats)
    }

    fn run_loop(&mut self) -> Result<()> {
        loop {
            if self.signals.should_shutdown() {
                return Ok(());
            }
            if self.signals.should_reload() {
                self.handle_reload()?;
            }
            // A pending SIGUSR1 is satisfied by the poll below.
            let _ = self.signals.should_refresh();

            if self.run_cycle()? == CycleOutcome::Interrupted {
                return Ok(());
            }

            let interval = self.config.poll_interval();
            pause(&self.signals, self.sleeper.as_mut(), interval);
        }
    }

    /// Retry `attach()` every reattach interval until it succeeds or a
    /// shutdown is requested. There is no backoff and no attempt limit.
    pub fn reattach_blocking(&mut self) -> CycleOutcome {
        let interval = self.config.reattach_interval();
        self.sink.record(LogEntry::new(
            EventType::ReattachAttempt,
            Severity::Warning,
            format!(
                "LCD {} unavailable, retrying every {}s",
                self.session.index(),
                interval.as_secs()
            ),
        ));
        loop {
            if self.signals.should_shutdown() {
                return CycleOutcome::Interrupted;
            }
            self.stats.attach_attempts += 1;
            match self.session.attach() {
                Ok(()) => {
                    self.stats.reattaches += 1;
                    return CycleOutcome::Reattached;
                }
                Err(err) => {
                    self.sink.record(
                        LogEntry::new(EventType::ReattachAttempt, Severity::Debug, "attach failed")
                            .with_error(&err),
                    );
                }
            }
            if pause_until_shutdown(&self.signals, self.sleeper.as_mut(), interval)
                == Wake::Signalled
            {
                return CycleOutcome::Interrupted;
            }
        }
    }

    fn route(
        &mut self,
        err: NlcdError,
        event: EventType,
        message: &str,
    ) -> Result<CycleOutcome> {
        match err.recovery() {
            Recovery::SkipCycle => {
                self.stats.skipped += 1;
                self.sink.record(
                    LogEntry::new(event, Severity::Warning, message)
                        .with_source(self.source.name())
                        .with_error(&err),
                );
                Ok(CycleOutcome::Skipped)
            }
            Recovery::Reattach => {
                self.sink.record(
                    LogEntry::new(EventType::DeviceDetached, Severity::Warning, message)
                        .with_error(&err),
                );
                self.session.detach();
                Ok(self.reattach_blocking())
            }
            Recovery::Fatal => Err(err),
        }
    }

    fn log_parsed(&self, parsed: &ParsedStatus) {
        for issue in &parsed.degraded {
            self.sink.record(
                LogEntry::new(EventType::DataFormat, Severity::Debug, "record field defaulted")
                    .with_source(self.source.name())
                    .with_error(issue),
            );
        }
        self.sink.record(
            LogEntry::new(
                EventType::Fetch,
                Severity::Debug,
                format!("{} problems", parsed.problems.len()),
            )
            .with_source(self.source.name())
            .with_count(parsed.problems.len())
            .with_details(format!(
                "{} suppressed, {} defaulted fields",
                parsed.suppressed,
                parsed.degraded.len()
            )),
        );
    }

    /// Re-read the config file and rebuild what depends on it. A config that
    /// fails to load or build keeps the old one running.
    fn handle_reload(&mut self) -> Result<()> {
        self.sink.reopen();
        let new_config = match Config::load(Some(&self.config.config_file)) {
            Ok(cfg) => cfg,
            Err(err) => {
                self.sink.record(
                    LogEntry::new(EventType::ConfigReload, Severity::Warning, "reload failed")
                        .with_error(&err),
                );
                return Ok(());
            }
        };

        let old_hash = self.config.stable_hash().unwrap_or_default();
        let new_hash = new_config.stable_hash().unwrap_or_default();
        if old_hash == new_hash {
            self.sink.record(LogEntry::new(
                EventType::ConfigReload,
                Severity::Info,
                "config unchanged",
            ));
            return Ok(());
        }

        let protocol = self
            .protocol_override
            .as_deref()
            .unwrap_or(&new_config.lcd.protocol);
        match build_source(&new_config, protocol) {
            Ok(source) => self.source = source,
            Err(err) => {
                self.sink.record(
                    LogEntry::new(
                        EventType::ConfigReload,
                        Severity::Warning,
                        "source rebuild failed, keeping previous config",
                    )
                    .with_error(&err),
                );
                return Ok(());
            }
        }

        if let Err(err) = self.session.reconfigure(&new_config) {
            self.route(err, EventType::Error, "applying panel settings failed")?;
        }
        self.config = new_config;
        self.sink.record(
            LogEntry::new(EventType::ConfigReload, Severity::Info, "config reloaded")
                .with_details(format!("config hash {old_hash} -> {new_hash}")),
        );
        Ok(())
    }
}
