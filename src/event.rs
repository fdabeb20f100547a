//! Trace events, locations and run outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TraceError;

/// Kind of a raw event delivered by the instrumentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A frame was entered
    Call,
    /// A line inside a frame was reached
    Line,
    /// A frame is about to be left
    Return,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Call => "call",
            EventKind::Line => "line",
            EventKind::Return => "return",
        };
        f.write_str(s)
    }
}

/// "This line of this unit was reached"
///
/// Events compare by value, so events of same-named units recorded by
/// different sessions are the same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Event {
    /// Name of the executable unit
    pub function: String,
    /// Line number within the unit's source file
    pub line: u32,
}

impl Event {
    pub fn new(function: impl Into<String>, line: u32) -> Self {
        Self {
            function: function.into(),
            line,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.function, self.line)
    }
}

/// Classification of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    pub const ALL: [Outcome; 2] = [Outcome::Pass, Outcome::Fail];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Ok(Outcome::Pass),
            "FAIL" => Ok(Outcome::Fail),
            _ => Err(TraceError::UnknownOutcome(s.to_string())),
        }
    }
}
