//! Signal delivery to other processes.

use std::io;

/// Signals the daemon sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// SIGINT, used for descendants
    Interrupt,
    /// SIGKILL, used for the follow process itself
    Kill,
}

impl Signal {
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Interrupt => libc::SIGINT,
            Signal::Kill => libc::SIGKILL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Kill => "SIGKILL",
        }
    }
}

/// Sends signals to processes by pid.
pub trait Signaller: Send + Sync {
    fn send(&self, pid: u32, signal: Signal) -> io::Result<()>;
}

/// `kill(2)` backed signaller.
pub struct LibcSignaller;

impl Signaller for LibcSignaller {
    fn send(&self, pid: u32, signal: Signal) -> io::Result<()> {
        let pid = to_pid_t(pid)?;
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(pid, signal.raw()) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Check whether a process with `pid` exists.
///
/// A process owned by another user (EPERM) counts as existing.
pub fn process_exists(pid: u32) -> io::Result<bool> {
    let pid = to_pid_t(pid)?;
    // SAFETY: signal 0 only performs the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(false),
        Some(libc::EPERM) => Ok(true),
        _ => Err(err),
    }
}

fn to_pid_t(pid: u32) -> io::Result<libc::pid_t> {
    // pid 0 and negative values address process groups, never allow them.
    match libc::pid_t::try_from(pid) {
        Ok(p) if p > 0 => Ok(p),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {}", pid),
        )),
    }
}
