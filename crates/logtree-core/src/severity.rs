//! Leveled logging severities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogTreeError;

/// Severity of a leveled log entry, in increasing order.
///
/// Logging at a given severity is also visible to consumers looking at any
/// lower severity: an ERROR entry passes an INFO or WARNING minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "I")]
    Info,
    #[serde(rename = "W")]
    Warning,
    #[serde(rename = "E")]
    Error,
    #[serde(rename = "F")]
    Fatal,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Fatal,
    ];

    /// Returns true if this severity is `other` or more severe.
    pub fn at_least(self, other: Severity) -> bool {
        self >= other
    }

    /// Single-letter glog form.
    pub fn as_letter(self) -> char {
        match self {
            Severity::Info => 'I',
            Severity::Warning => 'W',
            Severity::Error => 'E',
            Severity::Fatal => 'F',
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_letter())
    }
}

impl FromStr for Severity {
    type Err = LogTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" | "INFO" => Ok(Severity::Info),
            "W" | "WARNING" => Ok(Severity::Warning),
            "E" | "ERROR" => Ok(Severity::Error),
            "F" | "FATAL" => Ok(Severity::Fatal),
            other => Err(LogTreeError::InvalidSeverity(other.to_string())),
        }
    }
}

/// V-log verbosity. Logging through `LeveledLogger::v(n)` is recorded only if
/// the DN's verbosity is at least `n`.
pub type VerbosityLevel = i32;
