//! Process table enumeration.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::domain::error::DaemonError;

/// One row of the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
}

/// Source of (pid, parent pid) pairs.
pub trait ProcessTable: Send + Sync {
    /// Take a fresh snapshot of the process table.
    fn enumerate(&self) -> Result<Vec<ProcessEntry>, DaemonError>;
}

/// Reads the Linux `/proc` filesystem.
pub struct ProcFsTable {
    root: PathBuf,
}

impl ProcFsTable {
    pub fn new() -> Self {
        Self::at("/proc")
    }

    /// Read from a procfs-like directory other than `/proc`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_ppid(&self, pid: u32) -> Option<u32> {
        let path = self.root.join(pid.to_string()).join("status");
        match fs::read_to_string(&path) {
            Ok(content) => {
                let ppid = parse_ppid(&content);
                if ppid.is_none() {
                    debug!("PPid not found in {}", path.display());
                }
                ppid
            }
            Err(e) => {
                // Processes exit between listing and reading all the time.
                debug!("Cannot read {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Default for ProcFsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFsTable {
    fn enumerate(&self) -> Result<Vec<ProcessEntry>, DaemonError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            DaemonError::ProcessTable(format!("cannot list {}: {}", self.root.display(), e))
        })?;

        let mut table = Vec::new();
        for entry in entries.flatten() {
            let pid = match entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) {
                Some(pid) => pid,
                None => continue,
            };
            if let Some(ppid) = self.read_ppid(pid) {
                table.push(ProcessEntry { pid, ppid });
            }
        }

        Ok(table)
    }
}

/// Extract the `PPid:` field from a `/proc/<pid>/status` document.
fn parse_ppid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("PPid:"))
        .and_then(|rest| rest.trim().parse().ok())
}
