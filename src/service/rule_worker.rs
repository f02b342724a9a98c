//! Rule engine worker: line queue in, command queue out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::domain::{BoundedQueue, CancelToken, Command, LogLine, PipelineStats, RuleEngine};

/// Everything the rule worker thread owns.
pub struct RuleWorker {
    pub engine: RuleEngine,
    pub lines: BoundedQueue<LogLine>,
    pub commands: BoundedQueue<Command>,
    pub stop: CancelToken,
    pub stats: Arc<PipelineStats>,
    pub poll: Duration,
}

impl RuleWorker {
    /// Evaluate lines until `stop` fires. Lines still queued at that point are left behind.
    pub fn run(mut self) {
        info!(rules = self.engine.rules().len(), "Rule engine running");

        while !self.stop.is_cancelled() {
            let line = match self.lines.pop(self.poll) {
                Some(line) => line,
                None => continue,
            };

            for command in self.engine.evaluate(&line) {
                if self.commands.push_until(command, &self.stop, self.poll) {
                    self.stats.command_enqueued();
                } else {
                    debug!("Command abandoned during shutdown");
                }
            }

            self.stats.line_evaluated();
            self.lines.task_done();
        }

        debug!(left = self.lines.len(), "Rule engine leaving queued lines");
    }
}
