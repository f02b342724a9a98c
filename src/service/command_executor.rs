//! Serial execution of queued shell commands.

use std::fs::File;
use std::io::{self, Read};
use std::os::unix::io::{FromRawFd, OwnedFd};
use std::process::{self, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::domain::{BoundedQueue, CancelToken, Command, CommandReport, PipelineStats};

/// Runs one command at a time through a shell.
pub struct CommandExecutor {
    shell: String,
    dry_run: bool,
}

impl CommandExecutor {
    pub fn new(config: &ExecutorConfig, dry_run: bool) -> Self {
        Self {
            shell: config.shell.clone(),
            dry_run,
        }
    }

    /// Run `command` to completion and capture its result.
    ///
    /// Launch failures are reported with no exit code instead of an error.
    pub fn execute(&self, command: &Command) -> CommandReport {
        if self.dry_run {
            info!(rule = %command.rule, "$ {}", command.command_line);
            return CommandReport {
                exit_code: Some(0),
                output: String::new(),
                duration: Duration::ZERO,
            };
        }

        debug!(
            rule = %command.rule,
            queued_ms = command.submitted_at.elapsed().as_millis() as u64,
            "Executing: {}",
            command.command_line
        );

        let start = Instant::now();
        let result = self.run_combined(&command.command_line);
        let duration = start.elapsed();

        match result {
            Ok((status, output)) => CommandReport {
                exit_code: status.code(),
                output: String::from_utf8_lossy(&output).trim().to_string(),
                duration,
            },
            Err(e) => CommandReport {
                exit_code: None,
                output: format!("failed to launch {}: {}", self.shell, e),
                duration,
            },
        }
    }

    /// Run `command_line` with stdout and stderr sharing one pipe, so the
    /// output keeps the order in which it was written.
    fn run_combined(&self, command_line: &str) -> io::Result<(ExitStatus, Vec<u8>)> {
        let (mut reader, writer) = output_pipe()?;

        // The command owns the parent's copies of the write end; dropping it
        // right after spawn lets the read below see EOF.
        let mut child = process::Command::new(&self.shell)
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer.try_clone()?))
            .stderr(Stdio::from(writer))
            .spawn()?;

        let mut output = Vec::new();
        let read = reader.read_to_end(&mut output);
        let status = child.wait()?;
        read?;
        Ok((status, output))
    }
}

/// Create a close-on-exec pipe: (read end, write end).
fn output_pipe() -> io::Result<(File, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1; 2];
    // SAFETY: `fds` has room for the two descriptors pipe2 writes.
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: both descriptors were just created and are owned by nobody else.
    let (reader, writer) = unsafe { (File::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    Ok((reader, writer))
}

/// Log a finished command. Failures are warnings, never fatal.
pub fn log_report(command: &Command, report: &CommandReport) {
    let exit = report
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string());
    let duration_ms = report.duration.as_millis() as u64;

    if report.success() {
        info!(
            rule = %command.rule,
            exit = %exit,
            duration_ms,
            command = %command.command_line,
            output = %report.output,
            "Command succeeded"
        );
    } else {
        warn!(
            rule = %command.rule,
            exit = %exit,
            duration_ms,
            command = %command.command_line,
            output = %report.output,
            "Command failed"
        );
    }
}

/// Everything the executor worker thread owns.
pub struct ExecutorWorker {
    pub executor: CommandExecutor,
    pub commands: BoundedQueue<Command>,
    pub stop: CancelToken,
    pub stats: Arc<PipelineStats>,
    pub poll: Duration,
    pub cooldown: Duration,
}

impl ExecutorWorker {
    /// Execute commands in arrival order until `stop` fires.
    ///
    /// A running command is always allowed to finish.
    pub fn run(self) {
        info!("Command executor running");

        while !self.stop.is_cancelled() {
            let command = match self.commands.pop(self.poll) {
                Some(command) => command,
                None => continue,
            };

            let report = self.executor.execute(&command);
            log_report(&command, &report);
            self.stats.command_finished(report.success());
            self.commands.task_done();

            if !self.cooldown.is_zero() {
                thread::sleep(self.cooldown);
            }
        }

        debug!(left = self.commands.len(), "Executor leaving queued commands");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Worker;
    use std::fs;

    const POLL: Duration = Duration::from_millis(20);

    fn executor(dry_run: bool) -> CommandExecutor {
        CommandExecutor::new(
            &ExecutorConfig {
                shell: "/bin/sh".to_string(),
                cooldown_ms: 0,
            },
            dry_run,
        )
    }

    fn command(line: &str) -> Command {
        Command {
            rule: "test".to_string(),
            command_line: line.to_string(),
            submitted_at: Instant::now(),
        }
    }

    #[test]
    fn test_success_captures_combined_output() {
        let report = executor(false).execute(&command("echo out; echo err >&2"));
        assert!(report.success());
        assert_eq!(report.output, "out\nerr");
    }

    #[test]
    fn test_output_keeps_write_order_across_streams() {
        let report =
            executor(false).execute(&command("echo first >&2; echo second; echo third >&2"));
        assert!(report.success());
        assert_eq!(report.output, "first\nsecond\nthird");
    }

    #[test]
    fn test_non_zero_exit_is_reported() {
        let report = executor(false).execute(&command("echo nope; exit 7"));
        assert_eq!(report.exit_code, Some(7));
        assert!(!report.success());
        assert_eq!(report.output, "nope");
    }

    #[test]
    fn test_duration_is_measured() {
        let report = executor(false).execute(&command("sleep 0.1"));
        assert!(report.duration >= Duration::from_millis(100));
    }

    #[test]
    fn test_missing_shell_is_reported_not_fatal() {
        let exec = CommandExecutor::new(
            &ExecutorConfig {
                shell: "/nonexistent/shell".to_string(),
                cooldown_ms: 0,
            },
            false,
        );
        let report = exec.execute(&command("true"));
        assert_eq!(report.exit_code, None);
        assert!(report.output.contains("failed to launch"));
    }

    #[test]
    fn test_dry_run_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let line = format!("touch '{}'", marker.display());

        let report = executor(true).execute(&command(&line));

        assert!(report.success());
        assert!(!marker.exists());
    }

    #[test]
    fn test_commands_run_in_order_without_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let journal = dir.path().join("journal");
        let commands = BoundedQueue::new(8);
        for i in 0..4 {
            commands.push(command(&format!(
                "echo start-{i} >> '{p}'; sleep 0.05; echo end-{i} >> '{p}'",
                p = journal.display()
            )));
        }

        let stop = CancelToken::new();
        let stats = Arc::new(PipelineStats::new());
        let worker = ExecutorWorker {
            executor: executor(false),
            commands: commands.clone(),
            stop: stop.clone(),
            stats: Arc::clone(&stats),
            poll: POLL,
            cooldown: Duration::ZERO,
        };
        let handle = Worker::spawn("executor-test", move || worker.run()).unwrap();

        assert!(commands.wait_idle(&CancelToken::new()));
        stop.cancel();
        assert!(handle.join());

        let written = fs::read_to_string(&journal).unwrap();
        let expected: Vec<String> = (0..4)
            .flat_map(|i| [format!("start-{i}"), format!("end-{i}")])
            .collect();
        assert_eq!(written.lines().collect::<Vec<_>>(), expected);
        assert_eq!(stats.snapshot().commands_succeeded, 4);
    }

    #[test]
    fn test_failure_does_not_stop_the_worker() {
        let commands = BoundedQueue::new(4);
        commands.push(command("exit 1"));
        commands.push(command("true"));

        let stop = CancelToken::new();
        let stats = Arc::new(PipelineStats::new());
        let worker = ExecutorWorker {
            executor: executor(false),
            commands: commands.clone(),
            stop: stop.clone(),
            stats: Arc::clone(&stats),
            poll: POLL,
            cooldown: Duration::ZERO,
        };
        let handle = Worker::spawn("executor-failures", move || worker.run()).unwrap();

        assert!(commands.wait_idle(&CancelToken::new()));
        stop.cancel();
        assert!(handle.join());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.commands_failed, 1);
        assert_eq!(snapshot.commands_succeeded, 1);
    }
}
