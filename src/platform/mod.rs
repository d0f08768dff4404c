//! Platform-specific process access
//!
//! - Linux: `/proc` via the procfs crate
//! - Other targets: sysinfo snapshots
//! - Unix: signals and detached spawning via libc

use std::collections::{HashMap, VecDeque};

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(not(target_os = "linux"))]
pub mod sysinfo_table;
#[cfg(unix)]
pub mod unix;

#[cfg(target_os = "linux")]
pub type SystemTable = linux::ProcfsTable;
#[cfg(target_os = "linux")]
pub type SystemEntry = linux::ProcfsProcess;

#[cfg(not(target_os = "linux"))]
pub type SystemTable = sysinfo_table::SysinfoTable;
#[cfg(not(target_os = "linux"))]
pub type SystemEntry = sysinfo_table::SysinfoProcess;

#[cfg(unix)]
pub use unix::{kill_process, prepare_detached, process_alive, terminate_process};

#[cfg(not(unix))]
pub use sysinfo_table::{kill_process, prepare_detached, process_alive, terminate_process};

/// Process table backend for the current target.
pub fn system_table() -> SystemTable {
    SystemTable::default()
}

/// Parent pid to child pids, built once per snapshot
pub(crate) type ChildIndex = HashMap<u32, Vec<u32>>;

pub(crate) fn index_children(pairs: impl IntoIterator<Item = (u32, u32)>) -> ChildIndex {
    let mut index = ChildIndex::new();
    for (pid, ppid) in pairs {
        if pid != ppid {
            index.entry(ppid).or_default().push(pid);
        }
    }
    index
}

/// Breadth-first walk below `root`, children first.
pub(crate) fn collect_descendants(index: &ChildIndex, root: u32) -> Vec<u32> {
    let mut descendants = Vec::new();
    let mut queue: VecDeque<u32> = VecDeque::from([root]);

    while let Some(pid) = queue.pop_front() {
        if let Some(children) = index.get(&pid) {
            for &child in children {
                if child != root && !descendants.contains(&child) {
                    descendants.push(child);
                    queue.push_back(child);
                }
            }
        }
    }

    descendants
}
