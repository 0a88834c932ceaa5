//! Problem model: a monitoring state plus the text shown next to its icon.

#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Host and service states reported by the monitoring backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateName {
    Up,
    Down,
    Unreachable,
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl StateName {
    pub const ALL: [Self; 7] = [
        Self::Up,
        Self::Down,
        Self::Unreachable,
        Self::Ok,
        Self::Warning,
        Self::Critical,
        Self::Unknown,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Unreachable => "UNREACHABLE",
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Lenient conversion used by the parsers: anything unrecognised is `UNKNOWN`.
    #[must_use]
    pub fn from_status(raw: &str) -> Self {
        raw.parse().unwrap_or(Self::Unknown)
    }
}

impl FromStr for StateName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or(())
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line worth of trouble. Compared structurally; never mutated after parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Problem {
    state: StateName,
    description: String,
}

impl Problem {
    pub fn new(state: StateName, description: impl Into<String>) -> Self {
        Self {
            state,
            description: description.into(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> StateName {
        self.state
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Problem({}, \"{}\")", self.state, self.description)
    }
}
