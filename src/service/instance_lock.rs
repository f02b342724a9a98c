//! Single-instance PID file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::domain::process::process_exists;
use crate::domain::DaemonError;

/// Marker file holding the running daemon's pid.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    released: bool,
}

impl InstanceLock {
    /// Take the lock at `path`.
    ///
    /// A leftover file naming a dead process is replaced. A file naming a
    /// live process, or one without a pid, is a startup failure.
    pub fn acquire(path: &Path) -> Result<Self, DaemonError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let pid: u32 = contents
                    .trim()
                    .parse()
                    .map_err(|_| DaemonError::LockCorrupt {
                        path: path.to_path_buf(),
                        contents: contents.clone(),
                    })?;
                if process_exists(pid)? {
                    return Err(DaemonError::LockHeld {
                        path: path.to_path_buf(),
                        pid,
                    });
                }
                warn!(
                    "Pid file {} already exists, process does not exist: {}",
                    path.display(),
                    pid
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        fs::write(path, format!("{}\n", std::process::id()))?;
        info!("Pid file created: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the pid file. Only the first call touches the filesystem.
    pub fn release(&mut self) -> Result<bool, DaemonError> {
        if self.released {
            return Ok(false);
        }
        self.released = true;
        fs::remove_file(&self.path)?;
        info!("Pid file removed: {}", self.path.display());
        Ok(true)
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn dead_pid() -> u32 {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_acquire_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tailwatch.pid");

        let mut lock = InstanceLock::acquire(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, format!("{}\n", std::process::id()));
        assert_eq!(lock.path(), path);
        assert!(lock.release().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tailwatch.pid");

        let mut lock = InstanceLock::acquire(&path).unwrap();
        assert!(lock.release().unwrap());
        // A file recreated by someone else must survive a second release.
        fs::write(&path, "1\n").unwrap();
        assert!(!lock.release().unwrap());
        drop(lock);
        assert!(path.exists());
    }

    #[test]
    fn test_live_owner_blocks_acquire() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tailwatch.pid");
        fs::write(&path, format!("{}\n", std::process::id())).unwrap();

        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, DaemonError::LockHeld { pid, .. } if pid == std::process::id()));
        assert!(path.exists());
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tailwatch.pid");
        fs::write(&path, format!("{}\n", dead_pid())).unwrap();

        let _lock = InstanceLock::acquire(&path).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_corrupt_lock_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tailwatch.pid");
        fs::write(&path, "not a pid\n").unwrap();

        assert!(matches!(
            InstanceLock::acquire(&path),
            Err(DaemonError::LockCorrupt { .. })
        ));
    }

    #[test]
    fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tailwatch.pid");
        {
            let _lock = InstanceLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
