//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use nagios_lcd::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{NlcdError, Recovery, Result};
pub use crate::core::problem::{Problem, StateName};

// Sources
pub use crate::source::filter::FilterPolicy;
pub use crate::source::registry::build_source;
pub use crate::source::{ParsedStatus, ProblemSource, StatusDocument};

// Display
pub use crate::display::driver::{DeviceNodeFactory, DriverFactory, LcdDriver, LineMask};
pub use crate::display::session::{DeviceSession, SessionState};
pub use crate::display::severity::{CriticalClass, SeverityClassifier};
pub use crate::display::sync::{DisplaySynchronizer, RenderCommand};

// Diagnostics
pub use crate::logger::sink::{ActivityLog, DiagnosticSink};

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::{CycleOutcome, Orchestrator};
#[cfg(feature = "daemon")]
pub use crate::daemon::signals::SignalHandler;
