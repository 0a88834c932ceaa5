//! State → display style and state → sort rank.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use crate::core::problem::StateName;
use crate::display::driver::TextColor;

/// Which class CRITICAL joins. Both groupings are in use in the field, so it
/// is an operator choice rather than a constant.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CriticalClass {
    #[default]
    Warning,
    Down,
}

/// Icon identity; resolved to a flash slot by the image set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Icon {
    Up,
    Down,
    Warning,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateStyle {
    pub icon: Icon,
    pub color: TextColor,
}

/// Rank of the DOWN class. Lower sorts first.
pub const RANK_DOWN: u8 = 0;
pub const RANK_WARNING: u8 = 1;
pub const RANK_UNKNOWN: u8 = 2;
pub const RANK_UP: u8 = 3;

const DOWN_STYLE: StateStyle = StateStyle {
    icon: Icon::Down,
    color: TextColor::Red,
};
const WARNING_STYLE: StateStyle = StateStyle {
    icon: Icon::Warning,
    color: TextColor::Yellow,
};
const UNKNOWN_STYLE: StateStyle = StateStyle {
    icon: Icon::Unknown,
    color: TextColor::Purple,
};
const UP_STYLE: StateStyle = StateStyle {
    icon: Icon::Up,
    color: TextColor::Green,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityClassifier {
    critical_class: CriticalClass,
}

impl SeverityClassifier {
    #[must_use]
    pub const fn new(critical_class: CriticalClass) -> Self {
        Self { critical_class }
    }

    #[must_use]
    pub const fn style_for(&self, state: StateName) -> StateStyle {
        self.rank_and_style(state).1
    }

    #[must_use]
    pub const fn severity_rank(&self, state: StateName) -> u8 {
        self.rank_and_style(state).0
    }

    const fn rank_and_style(&self, state: StateName) -> (u8, StateStyle) {
        match state {
            StateName::Down | StateName::Unreachable => (RANK_DOWN, DOWN_STYLE),
            StateName::Critical => match self.critical_class {
                CriticalClass::Down => (RANK_DOWN, DOWN_STYLE),
                CriticalClass::Warning => (RANK_WARNING, WARNING_STYLE),
            },
            StateName::Warning => (RANK_WARNING, WARNING_STYLE),
            StateName::Unknown => (RANK_UNKNOWN, UNKNOWN_STYLE),
            StateName::Up | StateName::Ok => (RANK_UP, UP_STYLE),
        }
    }
}
