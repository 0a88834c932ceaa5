//! Signal handling: SIGTERM/SIGINT graceful shutdown, SIGHUP config reload,
//! SIGUSR1 immediate poll.
//!
//! Uses the `signal-hook` crate for safe signal registration. The daemon loop
//! polls the flags between phases and while it sleeps; handlers never do
//! anything but set a flag.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};

/// Longest uninterrupted sleep, so a signal is noticed within this bound.
pub const SLEEP_SLICE: Duration = Duration::from_millis(250);

// ──────────────────── signal handler ────────────────────

/// Signal state shared between the OS handlers and the daemon loop.
///
/// All flags use `Ordering::Relaxed`: the loop polls them and no other memory
/// is published through them.
#[derive(Debug, Clone, Default)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    reload_flag: Arc<AtomicBool>,
    refresh_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are reported on stderr.
    #[must_use]
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// Flags only, no OS hooks. Used by one-shot commands and tests.
    #[must_use]
    pub fn unregistered() -> Self {
        Self::default()
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Check and clear the reload request.
    pub fn should_reload(&self) -> bool {
        self.reload_flag.swap(false, Ordering::Relaxed)
    }

    /// Check and clear the immediate-poll request.
    pub fn should_refresh(&self) -> bool {
        self.refresh_flag.swap(false, Ordering::Relaxed)
    }

    /// Whether any request is pending, without clearing it.
    pub fn has_pending(&self) -> bool {
        self.should_shutdown()
            || self.reload_flag.load(Ordering::Relaxed)
            || self.refresh_flag.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_reload(&self) {
        self.reload_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_refresh(&self) {
        self.refresh_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[NLCD-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[NLCD-SIGNAL] failed to register SIGINT: {e}");
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::{SIGHUP, SIGUSR1};
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.reload_flag)) {
                eprintln!("[NLCD-SIGNAL] failed to register SIGHUP: {e}");
            }
            if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.refresh_flag)) {
                eprintln!("[NLCD-SIGNAL] failed to register SIGUSR1: {e}");
            }
        }
    }
}

// ──────────────────── sleeping ────────────────────

/// Source of wall-clock delay. Tests substitute one that only records.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Why [`pause`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    /// A signal flag was raised; the caller decides which.
    Signalled,
}

/// Sleep `total` in [`SLEEP_SLICE`] steps, returning early once any signal
/// request is pending.
pub fn pause(signals: &SignalHandler, sleeper: &mut dyn Sleeper, total: Duration) -> Wake {
    sleep_sliced(sleeper, total, || signals.has_pending())
}

/// Like [`pause`] but only a shutdown cuts the sleep short. Reload and
/// refresh requests stay pending for the main loop.
pub fn pause_until_shutdown(
    signals: &SignalHandler,
    sleeper: &mut dyn Sleeper,
    total: Duration,
) -> Wake {
    sleep_sliced(sleeper, total, || signals.should_shutdown())
}

fn sleep_sliced(sleeper: &mut dyn Sleeper, total: Duration, woken: impl Fn() -> bool) -> Wake {
    let mut remaining = total;
    while !remaining.is_zero() {
        if woken() {
            return Wake::Signalled;
        }
        let slice = remaining.min(SLEEP_SLICE);
        sleeper.sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    if woken() { Wake::Signalled } else { Wake::Elapsed }
}
