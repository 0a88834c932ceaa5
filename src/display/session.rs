//! Device session: attach/detach lifecycle of one panel and execution of
//! render commands against it.
//!
//! The lifecycle is an explicit state machine. Any device failure drops the
//! session back to [`SessionState::Detached`]; reconnecting is the caller's
//! job.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::errors::{NlcdError, Result};
use crate::core::problem::Problem;
use crate::display::driver::{
    Alignment, BackgroundColor, DriverFactory, LcdDriver, LineMask, TextColor,
};
use crate::display::images::ImageSetConfig;
use crate::display::severity::SeverityClassifier;
use crate::display::sync::{DisplaySynchronizer, MAX_LINES, RenderCommand};
use crate::logger::jsonl::{EventType, LogEntry, Severity};
use crate::logger::sink::DiagnosticSink;

/// Icon cells per text line; the icon for line `i` sits at `i * 8`.
const ICON_POSITIONS_PER_LINE: u8 = 8;
/// Text line (1-based) carrying the splash caption.
const SPLASH_TEXT_LINE: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Detached,
    Attaching,
    Attached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    AttachRequested,
    OpenSucceeded,
    OpenFailed,
    IoFailed,
    Released,
}

impl SessionState {
    /// Transition table. `None` marks an event that cannot happen in `self`.
    #[must_use]
    pub const fn on(self, event: SessionEvent) -> Option<Self> {
        match (self, event) {
            (Self::Detached, SessionEvent::AttachRequested) => Some(Self::Attaching),
            (Self::Attaching, SessionEvent::OpenSucceeded) => Some(Self::Attached),
            (Self::Attaching | Self::Attached, SessionEvent::OpenFailed | SessionEvent::IoFailed)
            | (_, SessionEvent::Released) => Some(Self::Detached),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Detached => "detached",
            Self::Attaching => "attaching",
            Self::Attached => "attached",
        })
    }
}

/// Panel settings applied on every attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcdSettings {
    pub brightness: u8,
    pub idle_brightness: u8,
    pub dim_when_idle: bool,
}

impl Default for LcdSettings {
    fn default() -> Self {
        Self {
            brightness: 255,
            idle_brightness: 127,
            dim_when_idle: false,
        }
    }
}

pub struct DeviceSession {
    factory: Box<dyn DriverFactory>,
    index: u32,
    settings: LcdSettings,
    images: ImageSetConfig,
    splash_text: String,
    state: SessionState,
    driver: Option<Box<dyn LcdDriver>>,
    sync: DisplaySynchronizer,
    sink: Arc<dyn DiagnosticSink>,
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("index", &self.index)
            .field("state", &self.state)
            .field("settings", &self.settings)
            .field("previous", &self.sync.previous())
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// A detached session; nothing is opened until [`Self::attach`].
    #[must_use]
    pub fn new(
        factory: Box<dyn DriverFactory>,
        index: u32,
        settings: LcdSettings,
        classifier: SeverityClassifier,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            factory,
            index,
            settings,
            images: ImageSetConfig::default(),
            splash_text: "ALL UP".to_string(),
            state: SessionState::Detached,
            driver: None,
            sync: DisplaySynchronizer::new(classifier),
            sink,
        }
    }

    /// Session configured from the `[lcd]`, `[display]` and `[images]` sections.
    #[must_use]
    pub fn from_config(
        config: &Config,
        factory: Box<dyn DriverFactory>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let settings = LcdSettings {
            brightness: config.lcd.brightness,
            idle_brightness: config.lcd.idle_brightness,
            dim_when_idle: config.lcd.dim_when_idle,
        };
        let mut session = Self::new(
            factory,
            config.lcd.index,
            settings,
            SeverityClassifier::new(config.display.critical_class),
            sink,
        );
        session.images = config.images.clone();
        session.splash_text.clone_from(&config.display.splash_text);
        session
    }

    /// Adopt new panel settings after a config reload. The panel index is
    /// fixed for the life of the session. An attached panel gets the new
    /// brightness at once and a full redraw on the next cycle.
    pub fn reconfigure(&mut self, config: &Config) -> Result<()> {
        if config.lcd.index != self.index {
            self.sink.record(LogEntry::new(
                EventType::ConfigReload,
                Severity::Warning,
                format!(
                    "lcd.index change {} -> {} needs a restart",
                    self.index, config.lcd.index
                ),
            ));
        }
        self.settings = LcdSettings {
            brightness: config.lcd.brightness,
            idle_brightness: config.lcd.idle_brightness,
            dim_when_idle: config.lcd.dim_when_idle,
        };
        self.images = config.images.clone();
        self.splash_text.clone_from(&config.display.splash_text);
        self.sync = DisplaySynchronizer::new(SeverityClassifier::new(config.display.critical_class));

        if !self.is_attached() {
            return Ok(());
        }
        let settings = self.settings;
        self.with_driver(|d| {
            d.set_brightness(settings.brightness)?;
            d.save_brightness(settings.idle_brightness, settings.brightness)?;
            d.dim_when_idle(settings.dim_when_idle)
        })
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn is_attached(&self) -> bool {
        matches!(self.state, SessionState::Attached)
    }

    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Problems currently drawn, line 0 first.
    #[must_use]
    pub fn rendered(&self) -> &[Problem] {
        self.sync.previous()
    }

    fn apply(&mut self, event: SessionEvent) -> Result<()> {
        let next = self
            .state
            .on(event)
            .ok_or_else(|| NlcdError::ContractViolation {
                details: format!("session event {event:?} while {}", self.state),
            })?;
        self.state = next;
        Ok(())
    }

    /// Open the panel and apply brightness settings. The render state is
    /// reset, so the next [`Self::show_problems`] redraws everything.
    pub fn attach(&mut self) -> Result<()> {
        if self.state != SessionState::Detached {
            self.detach();
        }
        self.apply(SessionEvent::AttachRequested)?;

        let mut driver = match self.factory.open(self.index) {
            Ok(driver) => driver,
            Err(err) => {
                self.apply(SessionEvent::OpenFailed)?;
                return Err(err);
            }
        };

        let configured = driver
            .set_brightness(self.settings.brightness)
            .and_then(|()| {
                driver.save_brightness(self.settings.idle_brightness, self.settings.brightness)
            })
            .and_then(|()| driver.dim_when_idle(self.settings.dim_when_idle));
        if let Err(err) = configured {
            self.apply(SessionEvent::IoFailed)?;
            return Err(err);
        }

        self.driver = Some(driver);
        self.sync.reset();
        self.apply(SessionEvent::OpenSucceeded)?;
        self.sink.record(LogEntry::new(
            EventType::DeviceAttached,
            Severity::Info,
            format!("attached LCD {}", self.index),
        ));
        Ok(())
    }

    /// Release the panel. Safe to call in any state.
    pub fn detach(&mut self) {
        let had_driver = self.driver.take().is_some();
        self.state = self
            .state
            .on(SessionEvent::Released)
            .unwrap_or(SessionState::Detached);
        if had_driver {
            self.sink.record(LogEntry::new(
                EventType::DeviceDetached,
                Severity::Info,
                format!("released LCD {}", self.index),
            ));
        }
    }

    /// Run `op` against the attached driver. A device failure detaches the
    /// session before the error is returned.
    pub fn with_driver<T>(
        &mut self,
        op: impl FnOnce(&mut dyn LcdDriver) -> Result<T>,
    ) -> Result<T> {
        let Some(driver) = self.driver.as_deref_mut() else {
            return Err(NlcdError::ContractViolation {
                details: format!("LCD {} used while {}", self.index, self.state),
            });
        };
        match op(driver) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_device_failure() {
                    self.driver = None;
                    self.apply(SessionEvent::IoFailed)?;
                    self.sink.record(
                        LogEntry::new(
                            EventType::DeviceDetached,
                            Severity::Warning,
                            format!("lost LCD {}", self.index),
                        )
                        .with_error(&err),
                    );
                }
                Err(err)
            }
        }
    }

    pub fn display_icon(&mut self, position: u8, slot: u16) -> Result<()> {
        self.with_driver(|d| d.display_icon(position, slot))
    }

    pub fn display_text_on_line(
        &mut self,
        line: u8,
        text: &str,
        pad_for_icon: bool,
        alignment: Alignment,
        color: TextColor,
    ) -> Result<()> {
        self.with_driver(|d| d.display_text_on_line(line, text, pad_for_icon, alignment, color))
    }

    pub fn clear_lines(&mut self, mask: LineMask, background: BackgroundColor) -> Result<()> {
        self.with_driver(|d| d.clear_lines(mask, background))
    }

    pub fn write_image_to_flash(&mut self, slot: u16, data: &[u8]) -> Result<()> {
        self.with_driver(|d| d.write_image_to_flash(slot, data))
    }

    /// Reconcile `problems` against the panel and draw the difference.
    /// Returns the number of commands executed.
    pub fn show_problems(&mut self, problems: &[Problem]) -> Result<usize> {
        if !self.is_attached() {
            return Err(NlcdError::ContractViolation {
                details: format!("show_problems while LCD {} is {}", self.index, self.state),
            });
        }
        let commands = self.sync.reconcile(problems);
        for command in &commands {
            self.execute(command)?;
        }
        Ok(commands.len())
    }

    /// Translate one command into driver primitives.
    pub fn execute(&mut self, command: &RenderCommand) -> Result<()> {
        match command {
            RenderCommand::ShowSplash => {
                let slot = self.images.splash_slot();
                let text = self.splash_text.clone();
                self.clear_lines(LineMask::ALL, BackgroundColor::LightGrey)?;
                self.display_icon(0, slot)?;
                self.display_text_on_line(
                    SPLASH_TEXT_LINE,
                    &text,
                    false,
                    Alignment::Centre,
                    TextColor::Green,
                )?;
                self.sink.record(LogEntry::new(
                    EventType::Splash,
                    Severity::Info,
                    format!("no problems, showing {text:?}"),
                ));
            }
            RenderCommand::ClearAll => {
                self.clear_lines(LineMask::ALL, BackgroundColor::Black)?;
            }
            RenderCommand::RenderProblem {
                line,
                problem,
                style,
            } => {
                let (position, text_line) = line_layout(*line)?;
                self.display_icon(position, self.images.slot_for(style.icon))?;
                self.display_text_on_line(
                    text_line,
                    problem.description(),
                    true,
                    Alignment::Left,
                    style.color,
                )?;
                self.sink.record(
                    LogEntry::new(EventType::Render, Severity::Debug, format!("line {line}: {problem}"))
                        .with_problem(*line, problem),
                );
            }
            RenderCommand::ClearLines(mask) => {
                self.clear_lines(*mask, BackgroundColor::Black)?;
            }
        }
        Ok(())
    }
}

/// Icon position and 1-based text line for problem line `line`.
fn line_layout(line: usize) -> Result<(u8, u8)> {
    if line >= MAX_LINES {
        return Err(NlcdError::ContractViolation {
            details: format!("display line {line} out of range (max {})", MAX_LINES - 1),
        });
    }
    let line = u8::try_from(line).map_err(|_| NlcdError::ContractViolation {
        details: format!("display line {line} out of range"),
    })?;
    Ok((line * ICON_POSITIONS_PER_LINE, line + 1))
}
