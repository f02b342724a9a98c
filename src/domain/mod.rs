//! Domain layer containing core logic.
//!
//! This module contains:
//! - Line and command types passed between pipeline stages
//! - Bounded queues and cancellation state
//! - Rule matching with debounce
//! - Process table access and descendant reaping
//! - Logger with rotation

mod error;
pub mod lifecycle;
pub mod logger;
pub mod process;
pub mod queue;
pub mod rules;
mod types;

pub use error::DaemonError;
pub use lifecycle::{CancelToken, PipelineStats, RunStatus, StatsSnapshot};
pub use queue::BoundedQueue;
pub use rules::RuleEngine;
pub use types::{Command, CommandReport, LogLine};
