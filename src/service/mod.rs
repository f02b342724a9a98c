//! Service layer: the follow process, pipeline workers, and their supervisor.

mod command_executor;
mod instance_lock;
mod line_source;
mod rule_worker;
mod signals;
mod supervisor;
mod worker;

pub use signals::install_signal_handler;
pub use supervisor::{RunSummary, Supervisor};
pub use worker::Worker;
