//! Follow process that streams lines of the watched file.

use std::io::{self, Read};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::FollowConfig;
use crate::domain::{DaemonError, LogLine};

const READ_CHUNK: usize = 8192;

/// Result of one read attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
    /// A complete, non-empty line
    Line(LogLine),
    /// Nothing arrived within the timeout
    Idle,
    /// The output stream is closed and fully consumed
    Eof,
}

/// Owns the follow subprocess and splits its output into lines.
pub struct LineSource {
    child: Child,
    stdout: ChildStdout,
    pending: Vec<u8>,
    eof: bool,
    exit_status: Option<ExitStatus>,
}

impl LineSource {
    /// Launch the follow command for `file`.
    ///
    /// Outside dry runs the process must still be alive after the startup
    /// grace period; otherwise its output is collected into the error.
    pub fn start(file: &Path, config: &FollowConfig, dry_run: bool) -> Result<Self, DaemonError> {
        let script = if dry_run {
            &config.dry_run_command
        } else {
            &config.command
        };

        let mut child = Command::new(&config.shell)
            .arg("-c")
            .arg(script)
            .arg(env!("CARGO_PKG_NAME"))
            .arg(file)
            .env("LC_ALL", "")
            .env("LANG", "en_US.UTF-8")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                DaemonError::Startup(format!("cannot launch {}: {}", config.shell, e))
            })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DaemonError::Startup(
                    "follow process has no stdout".to_string(),
                ));
            }
        };

        info!(pid = child.id(), "$ {}", script);
        let mut source = Self {
            child,
            stdout,
            pending: Vec::new(),
            eof: false,
            exit_status: None,
        };

        if !dry_run {
            thread::sleep(config.startup_grace());
            if let Some(status) = source.poll_exit()? {
                let output = source.drain_available();
                return Err(DaemonError::Startup(format!(
                    "follow process {} exited during startup ({}): {}",
                    source.pid(),
                    status,
                    output.trim()
                )));
            }
        }

        Ok(source)
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// True while the follow process has not exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.poll_exit(), Ok(None))
    }

    /// True once the exit status was collected. The pid is released at
    /// that point and may already belong to another process.
    pub fn is_reaped(&self) -> bool {
        self.exit_status.is_some()
    }

    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit_status.is_none() {
            self.exit_status = self.child.try_wait()?;
        }
        Ok(self.exit_status)
    }

    /// Read the next non-empty line, waiting at most `timeout` for new output.
    pub fn read(&mut self, timeout: Duration) -> io::Result<ReadEvent> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(ReadEvent::Line(line));
            }

            if self.eof {
                let rest = std::mem::take(&mut self.pending);
                return Ok(match LogLine::from_bytes(&rest) {
                    Some(line) => ReadEvent::Line(line),
                    None => ReadEvent::Eof,
                });
            }

            if !wait_readable(&self.stdout, timeout)? {
                return Ok(ReadEvent::Idle);
            }

            let mut buf = [0u8; READ_CHUNK];
            match self.stdout.read(&mut buf) {
                Ok(0) => self.eof = true,
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Collect the exit status, killing the process first if it is still running.
    pub fn finish(&mut self) -> Option<ExitStatus> {
        if let Ok(Some(status)) = self.poll_exit() {
            return Some(status);
        }
        debug!(pid = self.pid(), "Follow process still running, killing");
        let _ = self.child.kill();
        self.exit_status = self.child.wait().ok();
        self.exit_status
    }

    fn take_line(&mut self) -> Option<LogLine> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = LogLine::from_bytes(&raw) {
                return Some(line);
            }
        }
        None
    }

    /// Read whatever output is immediately available without blocking.
    fn drain_available(&mut self) -> String {
        let mut buf = [0u8; READ_CHUNK];
        while !self.eof && matches!(wait_readable(&self.stdout, Duration::ZERO), Ok(true)) {
            match self.stdout.read(&mut buf) {
                Ok(0) | Err(_) => self.eof = true,
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
            }
        }
        String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned()
    }
}

/// Wait until `fd` is readable (data or hang-up). Returns `false` on timeout.
fn wait_readable(fd: &impl AsRawFd, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    // SAFETY: `pfd` is a valid pollfd for the duration of the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0)
}
