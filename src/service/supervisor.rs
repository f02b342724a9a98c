//! Daemon lifecycle: startup, line pumping, and ordered teardown.
//!
//! ```text
//! Init ──► Running ──► Draining ──► Stopped
//!   │                     ▲
//!   └── startup error ────┘ (lock released, nothing else started)
//! ```
//!
//! The supervisor's own thread pumps lines from the follow process into
//! the line queue. The rule engine and the command executor each run on a
//! dedicated worker thread.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::command_executor::{CommandExecutor, ExecutorWorker};
use super::instance_lock::InstanceLock;
use super::line_source::{LineSource, ReadEvent};
use super::rule_worker::RuleWorker;
use super::worker::Worker;
use crate::config::Config;
use crate::domain::process::{LibcSignaller, ProcFsTable, Reaper, ReaperPolicy};
use crate::domain::{
    BoundedQueue, CancelToken, Command, DaemonError, LogLine, PipelineStats, RuleEngine,
    RunStatus, StatsSnapshot,
};

/// Supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Running,
    Draining,
    Stopped,
}

/// Final result of a run that got past startup.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub success: bool,
    pub reason: Option<String>,
    pub stats: StatsSnapshot,
    pub follow_exit: Option<ExitStatus>,
}

/// Releases everything acquired during startup, in order, at most once.
struct Teardown {
    reaper: Reaper,
    root: Option<u32>,
    stop_workers: CancelToken,
    workers: Vec<Worker>,
    lock: Option<InstanceLock>,
    status: Arc<RunStatus>,
}

impl Teardown {
    /// Reap the follow process tree, stop and join the workers, then
    /// release the lock. Repeated calls do nothing.
    fn drain(&mut self) {
        if let Some(root) = self.root.take() {
            if let Err(e) = self.reaper.reap(root) {
                self.status.fail(format!("teardown: {}", e));
            }
        }

        if self.stop_workers.cancel() {
            info!("Stopping workers");
        }
        for worker in self.workers.drain(..) {
            let name = worker.name();
            if !worker.join() {
                self.status.fail(format!("worker {} panicked", name));
            }
        }

        if let Some(mut lock) = self.lock.take() {
            if let Err(e) = lock.release() {
                error!("Cannot remove pid file {}: {}", lock.path().display(), e);
                self.status.fail(format!("pid file removal: {}", e));
            }
        }
    }
}

pub struct Supervisor {
    config: Config,
    file: PathBuf,
    dry_run: bool,
    shutdown: CancelToken,
    status: Arc<RunStatus>,
    stats: Arc<PipelineStats>,
    reaper: Option<Reaper>,
    phase: Phase,
}

impl Supervisor {
    /// `shutdown` is the token the signal handler cancels.
    pub fn new(config: Config, file: PathBuf, dry_run: bool, shutdown: CancelToken) -> Self {
        Self {
            config,
            file,
            dry_run,
            shutdown,
            status: Arc::new(RunStatus::new()),
            stats: Arc::new(PipelineStats::new()),
            reaper: None,
            phase: Phase::Init,
        }
    }

    /// Replace the `/proc` + `kill(2)` reaper.
    #[cfg(test)]
    pub fn with_reaper(mut self, reaper: Reaper) -> Self {
        self.reaper = Some(reaper);
        self
    }

    #[cfg(test)]
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run until shutdown is requested or the follow stream ends.
    ///
    /// # Errors
    ///
    /// Only startup failures are returned as errors; everything after the
    /// switch to `Running` is reported through [`RunSummary`].
    pub fn run(mut self) -> Result<RunSummary, DaemonError> {
        let engine = RuleEngine::from_config(&self.config.rules)?;

        let lock = if self.dry_run {
            warn!("DRY RUN MODE: existing content is read once, no commands are run");
            None
        } else {
            Some(InstanceLock::acquire(&self.config.lock_file())?)
        };

        let mut source = LineSource::start(&self.file, &self.config.follow, self.dry_run)?;

        let poll = self.config.queues.poll_interval();
        let lines: BoundedQueue<LogLine> = BoundedQueue::new(self.config.queues.line_capacity);
        let commands: BoundedQueue<Command> =
            BoundedQueue::new(self.config.queues.command_capacity);
        let stop_workers = CancelToken::new();
        info!(
            line_capacity = lines.capacity(),
            command_capacity = commands.capacity(),
            rules = self.config.rules.len(),
            "Pipeline queues ready"
        );

        let reaper = self.reaper.take().unwrap_or_else(|| {
            Reaper::new(
                Box::new(ProcFsTable::new()),
                Box::new(LibcSignaller),
                ReaperPolicy::from(&self.config.reaper),
            )
        });
        let mut teardown = Teardown {
            reaper,
            root: Some(source.pid()),
            stop_workers: stop_workers.clone(),
            workers: Vec::new(),
            lock,
            status: Arc::clone(&self.status),
        };

        let rule_worker = RuleWorker {
            engine,
            lines: lines.clone(),
            commands: commands.clone(),
            stop: stop_workers.clone(),
            stats: Arc::clone(&self.stats),
            poll,
        };
        let executor_worker = ExecutorWorker {
            executor: CommandExecutor::new(&self.config.executor, self.dry_run),
            commands: commands.clone(),
            stop: stop_workers,
            stats: Arc::clone(&self.stats),
            poll,
            cooldown: self.config.executor.cooldown(),
        };

        let spawned = Worker::spawn("rule-engine", move || rule_worker.run()).and_then(|w| {
            teardown.workers.push(w);
            Worker::spawn("executor", move || executor_worker.run())
        });
        match spawned {
            Ok(w) => teardown.workers.push(w),
            Err(e) => {
                teardown.drain();
                close_source(&mut source);
                return Err(DaemonError::Startup(format!("cannot spawn worker: {}", e)));
            }
        }

        self.transition(Phase::Running);
        self.pump(&mut source, &lines, &commands);

        self.transition(Phase::Draining);
        if source.is_reaped() {
            debug!(pid = source.pid(), "Follow process already reaped, nothing to signal");
            teardown.root = None;
        }
        teardown.drain();
        let follow_exit = close_source(&mut source);

        self.transition(Phase::Stopped);
        Ok(RunSummary {
            success: self.status.is_success(),
            reason: self.status.reason(),
            stats: self.stats.snapshot(),
            follow_exit,
        })
    }

    fn transition(&mut self, next: Phase) {
        info!("Supervisor {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Move lines from the follow process into the line queue.
    fn pump(
        &self,
        source: &mut LineSource,
        lines: &BoundedQueue<LogLine>,
        commands: &BoundedQueue<Command>,
    ) {
        let poll = self.config.queues.poll_interval();

        loop {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested");
                return;
            }

            let event = match source.read(poll) {
                Ok(event) => event,
                Err(e) => {
                    error!(pid = source.pid(), "Reading follow process output failed: {}", e);
                    self.status.fail(format!("follow output: {}", e));
                    return;
                }
            };

            match event {
                ReadEvent::Line(line) => {
                    self.stats.line_read();
                    if !lines.push_until(line, &self.shutdown, poll) {
                        info!("Shutdown requested");
                        return;
                    }
                }
                ReadEvent::Idle => {
                    if !source.is_alive() {
                        self.stream_ended(source, lines, commands);
                        return;
                    }
                }
                ReadEvent::Eof => {
                    self.stream_ended(source, lines, commands);
                    return;
                }
            }
        }
    }

    fn stream_ended(
        &self,
        source: &LineSource,
        lines: &BoundedQueue<LogLine>,
        commands: &BoundedQueue<Command>,
    ) {
        if self.shutdown.is_cancelled() {
            info!("Shutdown requested");
            return;
        }

        if self.dry_run {
            info!(
                lines = self.stats.snapshot().lines_read,
                "Follow stream ended"
            );
            // Let queued work finish; a signal still cuts this short.
            if lines.wait_idle(&self.shutdown) {
                commands.wait_idle(&self.shutdown);
            }
            return;
        }

        error!(pid = source.pid(), "Follow process unexpectedly closed");
        self.status.fail("follow process exited unexpectedly");
    }
}

/// Collect and log the follow process exit status.
fn close_source(source: &mut LineSource) -> Option<ExitStatus> {
    let status = source.finish();
    match status {
        Some(status) => info!(pid = source.pid(), "Follow process closed: {}", status),
        None => warn!(pid = source.pid(), "Follow process exit status unavailable"),
    }
    status
}
