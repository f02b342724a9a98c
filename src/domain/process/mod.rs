//! Process table access, signalling, and descendant reaping.

mod reaper;
mod signaller;
mod table;

pub use reaper::{descendants, ReapReport, Reaper, ReaperPolicy};
pub use signaller::{process_exists, LibcSignaller, Signal, Signaller};
pub use table::{ProcFsTable, ProcessEntry, ProcessTable};
