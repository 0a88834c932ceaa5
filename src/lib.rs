#![forbid(unsafe_code)]

//! nagios-lcd: mirrors Nagios/Icinga host and service problems onto a small
//! USB LCD panel.
//!
//! The pipeline per poll:
//! 1. **Source** fetches a status document (HTTP, Icinga IDO database or a
//!    local JSON file) and drops records the filter policy suppresses
//!    (by default, soft states on their first check attempt).
//! 2. **Synchronizer** orders problems by severity and diffs them against what
//!    the panel already shows, so only changed lines are redrawn.
//! 3. **Session** turns render commands into driver calls and drops to
//!    detached on any device error; the daemon loop reattaches.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use nagios_lcd::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use nagios_lcd::core::config::Config;
//! use nagios_lcd::display::sync::DisplaySynchronizer;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod display;
pub mod logger;
pub mod source;
