//! Cancellation and overall-result state shared across worker threads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Cloneable, set-once cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Aggregated success/failure of a run. Starts successful; the first failure wins.
#[derive(Debug, Default)]
pub struct RunStatus {
    failed: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the run as failed. Later reasons are ignored.
    pub fn fail(&self, reason: impl Into<String>) {
        if !self.failed.swap(true, Ordering::SeqCst) {
            if let Ok(mut slot) = self.reason.lock() {
                *slot = Some(reason.into());
            }
        }
    }

    pub fn is_success(&self) -> bool {
        !self.failed.load(Ordering::SeqCst)
    }

    /// Reason recorded by the first failure, if any.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Counters updated by the pipeline stages.
#[derive(Debug, Default)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    lines_evaluated: AtomicU64,
    commands_enqueued: AtomicU64,
    commands_succeeded: AtomicU64,
    commands_failed: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub lines_evaluated: u64,
    pub commands_enqueued: u64,
    pub commands_succeeded: u64,
    pub commands_failed: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn line_evaluated(&self) {
        self.lines_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_enqueued(&self) {
        self.commands_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_finished(&self, success: bool) {
        let counter = if success {
            &self.commands_succeeded
        } else {
            &self.commands_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_evaluated: self.lines_evaluated.load(Ordering::Relaxed),
            commands_enqueued: self.commands_enqueued.load(Ordering::Relaxed),
            commands_succeeded: self.commands_succeeded.load(Ordering::Relaxed),
            commands_failed: self.commands_failed.load(Ordering::Relaxed),
        }
    }
}
