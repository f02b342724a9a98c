//! Core domain types flowing between the pipeline stages.

use std::fmt;
use std::time::{Duration, Instant};

/// One non-empty line read from the follow process, trailing whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine(String);

impl LogLine {
    /// Build a line from raw bytes.
    ///
    /// Returns `None` when nothing is left after stripping trailing whitespace.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim_end();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved shell command queued by a rule firing.
#[derive(Debug, Clone)]
pub struct Command {
    /// Name of the rule that fired
    pub rule: String,

    /// Shell command line
    pub command_line: String,

    /// When the rule fired
    pub submitted_at: Instant,
}

/// Outcome of running one command.
#[derive(Debug, Clone)]
pub struct CommandReport {
    /// Exit code, `None` when the command was killed by a signal or never started
    pub exit_code: Option<i32>,

    /// Combined stdout and stderr, trimmed
    pub output: String,

    /// Wall-clock run time
    pub duration: Duration,
}

impl CommandReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
