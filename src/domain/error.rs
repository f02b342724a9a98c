//! Error types for tailwatch.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the daemon core.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The follow process could not be started or died during the grace period
    #[error("Startup failed: {0}")]
    Startup(String),

    /// Another live instance owns the lock file
    #[error("Instance lock {} is held by running process {pid}", path.display())]
    LockHeld { path: PathBuf, pid: u32 },

    /// Lock file exists but does not contain a pid
    #[error("Instance lock {} has unreadable contents: {contents:?}", path.display())]
    LockCorrupt { path: PathBuf, contents: String },

    /// Descendant count exceeded the reaper's safety threshold
    #[error("Too many descendants of pid {root} to kill ({}): {}", pids.len(), join_pids(pids))]
    TooManyDescendants { root: u32, pids: Vec<u32> },

    /// Process table could not be enumerated
    #[error("Process table error: {0}")]
    ProcessTable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Regex error
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

fn join_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
