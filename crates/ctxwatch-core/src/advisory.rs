//! Advisory levels derived from context-window usage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Percent at which the advisory becomes `Warning`
pub const WARNING_PERCENT: f64 = 65.0;
/// Percent at which the advisory becomes `Critical`
pub const CRITICAL_PERCENT: f64 = 75.0;
/// Percent at which the advisory becomes `Danger`
pub const DANGER_PERCENT: f64 = 85.0;

/// How close a session is to exhausting its context window
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryLevel {
    /// Plenty of room left
    #[default]
    Ok,
    /// Past the first threshold; start planning a handoff
    Warning,
    /// Wrap up the current piece of work
    Critical,
    /// Stop and hand off before the window overflows
    Danger,
}

impl AdvisoryLevel {
    /// Classify a usage percentage.
    ///
    /// Boundaries belong to the higher bracket: exactly 65.0 is `Warning`.
    /// NaN compares false against every threshold and lands in `Ok`.
    pub fn from_percent(percent: f64) -> Self {
        if percent >= DANGER_PERCENT {
            Self::Danger
        } else if percent >= CRITICAL_PERCENT {
            Self::Critical
        } else if percent >= WARNING_PERCENT {
            Self::Warning
        } else {
            Self::Ok
        }
    }

    /// Lowercase name used in output and snapshot consumers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Danger => "danger",
        }
    }

    /// Short recommendation for the agent or its operator
    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::Ok => "continue",
            Self::Warning => "plan to wrap up",
            Self::Critical => "wrap up now",
            Self::Danger => "stop",
        }
    }
}

impl fmt::Display for AdvisoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Classify a usage percentage into an advisory level
pub fn classify(percent: f64) -> AdvisoryLevel {
    AdvisoryLevel::from_percent(percent)
}
