//! Descendant discovery and termination for the follow process.

use std::collections::{BTreeSet, HashMap};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::signaller::{Signal, Signaller};
use super::table::{ProcessEntry, ProcessTable};
use crate::config::ReaperConfig;
use crate::domain::error::DaemonError;

/// Safety limits applied before any descendant is signalled.
#[derive(Debug, Clone, Copy)]
pub struct ReaperPolicy {
    /// Pids at or below this value are never signalled
    pub min_pid: u32,
    /// Refuse to act when more descendants than this remain after filtering
    pub max_descendants: usize,
    /// Pause after killing the root
    pub settle: Duration,
}

impl From<&ReaperConfig> for ReaperPolicy {
    fn from(config: &ReaperConfig) -> Self {
        Self {
            min_pid: config.min_pid,
            max_descendants: config.max_descendants,
            settle: Duration::from_millis(config.settle_ms),
        }
    }
}

/// What a reap pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapReport {
    /// Descendants that received SIGINT, in signalling order
    pub signalled: Vec<u32>,
    /// Descendants that could not be signalled
    pub failed: Vec<u32>,
    /// Whether SIGKILL reached the root
    pub root_killed: bool,
}

/// Collect every transitive descendant of `root`.
///
/// `root` itself is never part of the result, even if the table has a cycle.
pub fn descendants(entries: &[ProcessEntry], root: u32) -> BTreeSet<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for entry in entries {
        if entry.pid != entry.ppid {
            children.entry(entry.ppid).or_default().push(entry.pid);
        }
    }

    let mut found = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(parent) = stack.pop() {
        for &child in children.get(&parent).map(Vec::as_slice).unwrap_or_default() {
            if child != root && found.insert(child) {
                stack.push(child);
            }
        }
    }
    found
}

/// Terminates a process and all of its descendants.
pub struct Reaper {
    table: Box<dyn ProcessTable>,
    signaller: Box<dyn Signaller>,
    policy: ReaperPolicy,
}

impl Reaper {
    pub fn new(
        table: Box<dyn ProcessTable>,
        signaller: Box<dyn Signaller>,
        policy: ReaperPolicy,
    ) -> Self {
        Self {
            table,
            signaller,
            policy,
        }
    }

    /// Compute the descendants to signal, highest pid first.
    ///
    /// # Errors
    ///
    /// Fails when the process table cannot be read or when the filtered
    /// descendant count exceeds `max_descendants`.
    pub fn plan(&self, root: u32) -> Result<Vec<u32>, DaemonError> {
        let entries = self.table.enumerate()?;
        let mut pids: Vec<u32> = descendants(&entries, root)
            .into_iter()
            .filter(|&pid| pid > self.policy.min_pid)
            .collect();
        pids.sort_unstable_by(|a, b| b.cmp(a));

        if pids.len() > self.policy.max_descendants {
            return Err(DaemonError::TooManyDescendants { root, pids });
        }
        Ok(pids)
    }

    /// SIGINT every planned descendant, then SIGKILL the root.
    ///
    /// The root is killed even when planning fails; the planning error is
    /// returned afterwards.
    pub fn reap(&self, root: u32) -> Result<ReapReport, DaemonError> {
        let mut report = ReapReport::default();

        let outcome = match self.plan(root) {
            Ok(pids) => {
                debug!(root, descendants = ?pids, "Reaping descendants");
                for pid in pids {
                    match self.signaller.send(pid, Signal::Interrupt) {
                        Ok(()) => report.signalled.push(pid),
                        Err(e) => {
                            debug!(pid, "Cannot send {}: {}", Signal::Interrupt.name(), e);
                            report.failed.push(pid);
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!(root, "Descendants left alive: {}", e);
                Err(e)
            }
        };

        match self.signaller.send(root, Signal::Kill) {
            Ok(()) => report.root_killed = true,
            Err(e) => warn!(root, "Cannot send {}: {}", Signal::Kill.name(), e),
        }

        thread::sleep(self.policy.settle);

        outcome.map(|()| {
            info!(
                root,
                signalled = report.signalled.len(),
                failed = report.failed.len(),
                root_killed = report.root_killed,
                "Process tree reaped"
            );
            report
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    struct FakeTable(Vec<ProcessEntry>);

    impl ProcessTable for FakeTable {
        fn enumerate(&self) -> Result<Vec<ProcessEntry>, DaemonError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenTable;

    impl ProcessTable for BrokenTable {
        fn enumerate(&self) -> Result<Vec<ProcessEntry>, DaemonError> {
            Err(DaemonError::ProcessTable("unreadable".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSignaller {
        sent: Arc<Mutex<Vec<(u32, Signal)>>>,
        dead: Vec<u32>,
    }

    impl Signaller for RecordingSignaller {
        fn send(&self, pid: u32, signal: Signal) -> io::Result<()> {
            if self.dead.contains(&pid) {
                return Err(io::Error::from_raw_os_error(libc::ESRCH));
            }
            self.sent.lock().unwrap().push((pid, signal));
            Ok(())
        }
    }

    fn entries(pairs: &[(u32, u32)]) -> Vec<ProcessEntry> {
        pairs
            .iter()
            .map(|&(pid, ppid)| ProcessEntry { pid, ppid })
            .collect()
    }

    fn policy(max_descendants: usize) -> ReaperPolicy {
        ReaperPolicy {
            min_pid: 1024,
            max_descendants,
            settle: Duration::ZERO,
        }
    }

    fn reaper(table: Vec<ProcessEntry>, signaller: &RecordingSignaller, max: usize) -> Reaper {
        Reaper::new(
            Box::new(FakeTable(table)),
            Box::new(signaller.clone()),
            policy(max),
        )
    }

    #[test]
    fn test_descendants_transitive_only() {
        let table = entries(&[
            (1, 0),
            (5000, 1),    // root
            (5001, 5000), // child
            (5002, 5001), // grandchild
            (5003, 5002), // great-grandchild
            (5004, 1),    // unrelated sibling of root
            (5005, 5004), // unrelated nephew
        ]);
        let found = descendants(&table, 5000);
        assert_eq!(found, BTreeSet::from([5001, 5002, 5003]));
    }

    #[test]
    fn test_descendants_of_leaf_is_empty() {
        let table = entries(&[(1, 0), (5000, 1)]);
        assert!(descendants(&table, 5000).is_empty());
        assert!(descendants(&table, 9999).is_empty());
    }

    #[test]
    fn test_descendants_survive_cycles() {
        let table = entries(&[(5000, 5002), (5001, 5000), (5002, 5001), (5003, 5003)]);
        assert_eq!(descendants(&table, 5000), BTreeSet::from([5001, 5002]));
    }

    #[test]
    fn test_plan_filters_low_pids_and_sorts_descending() {
        let signaller = RecordingSignaller::default();
        let table = entries(&[(5000, 1), (300, 5000), (5001, 5000), (5010, 300)]);
        let plan = reaper(table, &signaller, 2).plan(5000).unwrap();
        assert_eq!(plan, vec![5010, 5001]);
    }

    #[test]
    fn test_reap_signals_descendants_then_kills_root() {
        let signaller = RecordingSignaller::default();
        let table = entries(&[(5000, 1), (5001, 5000), (5002, 5001)]);

        let report = reaper(table, &signaller, 2).reap(5000).unwrap();

        assert_eq!(report.signalled, vec![5002, 5001]);
        assert!(report.failed.is_empty());
        assert!(report.root_killed);
        assert_eq!(
            *signaller.sent.lock().unwrap(),
            vec![
                (5002, Signal::Interrupt),
                (5001, Signal::Interrupt),
                (5000, Signal::Kill),
            ]
        );
    }

    #[test]
    fn test_reap_without_descendants_kills_root() {
        let signaller = RecordingSignaller::default();
        let report = reaper(entries(&[(5000, 1)]), &signaller, 2)
            .reap(5000)
            .unwrap();
        assert!(report.signalled.is_empty());
        assert_eq!(*signaller.sent.lock().unwrap(), vec![(5000, Signal::Kill)]);
    }

    #[test]
    fn test_reap_refuses_mass_kill_but_kills_root() {
        let signaller = RecordingSignaller::default();
        let table = entries(&[(5000, 1), (5001, 5000), (5002, 5000), (5003, 5000)]);

        let err = reaper(table, &signaller, 2).reap(5000).unwrap_err();

        match err {
            DaemonError::TooManyDescendants { root, pids } => {
                assert_eq!(root, 5000);
                assert_eq!(pids, vec![5003, 5002, 5001]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*signaller.sent.lock().unwrap(), vec![(5000, Signal::Kill)]);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let signaller = RecordingSignaller::default();
        let table = entries(&[(5000, 1), (5001, 5000), (5002, 5000), (5003, 5000)]);
        let report = reaper(table, &signaller, 3).reap(5000).unwrap();
        assert_eq!(report.signalled, vec![5003, 5002, 5001]);
    }

    #[test]
    fn test_vanished_descendant_is_reported_not_fatal() {
        let signaller = RecordingSignaller {
            dead: vec![5001],
            ..Default::default()
        };
        let table = entries(&[(5000, 1), (5001, 5000), (5002, 5000)]);

        let report = reaper(table, &signaller, 2).reap(5000).unwrap();

        assert_eq!(report.signalled, vec![5002]);
        assert_eq!(report.failed, vec![5001]);
        assert!(report.root_killed);
    }

    #[test]
    fn test_table_error_still_kills_root() {
        let signaller = RecordingSignaller::default();
        let reaper = Reaper::new(Box::new(BrokenTable), Box::new(signaller.clone()), policy(2));

        assert!(matches!(
            reaper.reap(5000),
            Err(DaemonError::ProcessTable(_))
        ));
        assert_eq!(*signaller.sent.lock().unwrap(), vec![(5000, Signal::Kill)]);
    }
}
