//! Suppression policy for transient or already-handled states.
//!
//! Only the soft-first-attempt rule is on by default. The other switches map
//! to status fields the backends already report; they stay off unless the
//! operator opts in.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::source::StatusRecord;

/// Which records are hidden before they become problems.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterPolicy {
    /// Hide SOFT states on their first of several allowed attempts.
    pub suppress_soft_first_attempt: bool,
    pub suppress_downtime: bool,
    pub suppress_flapping: bool,
    pub suppress_acknowledged: bool,
    pub suppress_notifications_disabled: bool,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            suppress_soft_first_attempt: true,
            suppress_downtime: false,
            suppress_flapping: false,
            suppress_acknowledged: false,
            suppress_notifications_disabled: false,
        }
    }
}

impl FilterPolicy {
    /// Whether `record` should be left off the display.
    pub fn should_suppress(&self, record: &StatusRecord) -> bool {
        if self.suppress_downtime && record.in_scheduled_downtime == Some(true) {
            return true;
        }
        if self.suppress_flapping && record.is_flapping == Some(true) {
            return true;
        }
        if self.suppress_acknowledged && record.has_been_acknowledged == Some(true) {
            return true;
        }
        if self.suppress_notifications_disabled && record.notifications_enabled == Some(false) {
            return true;
        }
        self.suppress_soft_first_attempt && is_unconfirmed_first_attempt(record)
    }
}

/// SOFT state on attempt 1 of more than one: the check has not been retried yet.
fn is_unconfirmed_first_attempt(record: &StatusRecord) -> bool {
    let is_soft = record
        .state_type
        .as_deref()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("SOFT"));
    if !is_soft {
        return false;
    }
    matches!(
        record.attempts.as_deref().and_then(parse_attempts),
        Some((1, max)) if max > 1
    )
}

/// Parse `"<attempt>/<max>"`. Anything else yields `None`.
pub fn parse_attempts(raw: &str) -> Option<(u32, u32)> {
    let (attempt, max) = raw.split_once('/')?;
    Some((attempt.trim().parse().ok()?, max.trim().parse().ok()?))
}
