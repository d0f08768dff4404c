//! Process table abstraction
//!
//! Discovery never talks to the OS directly. It walks a [`ProcessTable`]
//! snapshot and reads attributes from each [`ProcessEntry`]; every read is
//! fallible because the process may exit or deny access between enumeration
//! and inspection.
//!
//! Platform strategy:
//! - Linux: procfs-backed table (`platform::linux`)
//! - Other targets: sysinfo-backed table (`platform::sysinfo_table`)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Process {pid} no longer exists")]
    NoSuchProcess { pid: u32 },
    #[error("Process {pid} is a zombie")]
    ZombieProcess { pid: u32 },
    #[error("Permission denied accessing process {pid}")]
    AccessDenied { pid: u32 },
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error("Failed to enumerate processes: {0}")]
    Enumeration(String),
    #[error("Failed to inspect process {pid}: {message}")]
    Other { pid: u32, message: String },
}

impl ProbeError {
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProbeError::NoSuchProcess { pid }
            | ProbeError::ZombieProcess { pid }
            | ProbeError::AccessDenied { pid }
            | ProbeError::Other { pid, .. } => Some(*pid),
            ProbeError::Unsupported(_) | ProbeError::Enumeration(_) => None,
        }
    }

    /// The process exited or turned into a zombie while it was being read.
    pub fn is_vanished(&self) -> bool {
        matches!(
            self,
            ProbeError::NoSuchProcess { .. } | ProbeError::ZombieProcess { .. }
        )
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, ProbeError::AccessDenied { .. })
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Scheduler state of a process, normalised across platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessStatus {
    Running,
    Sleeping,
    DiskSleep,
    Stopped,
    TracingStop,
    Zombie,
    Dead,
    WakeKill,
    Waking,
    Parked,
    Idle,
    Locked,
    Waiting,
    Unknown,
}

impl ProcessStatus {
    /// Running, sleeping and idle processes count as alive.
    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Running | ProcessStatus::Sleeping | ProcessStatus::Idle
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Sleeping => "sleeping",
            ProcessStatus::DiskSleep => "disk-sleep",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::TracingStop => "tracing-stop",
            ProcessStatus::Zombie => "zombie",
            ProcessStatus::Dead => "dead",
            ProcessStatus::WakeKill => "wake-kill",
            ProcessStatus::Waking => "waking",
            ProcessStatus::Parked => "parked",
            ProcessStatus::Idle => "idle",
            ProcessStatus::Locked => "locked",
            ProcessStatus::Waiting => "waiting",
            ProcessStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One process in a table snapshot.
///
/// Implementations read lazily: nothing beyond the pid is guaranteed to have
/// been fetched when the entry was created.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessEntry {
    fn pid(&self) -> u32;

    fn name(&self) -> ProbeResult<String>;

    fn status(&self) -> ProbeResult<ProcessStatus>;

    fn cmdline(&self) -> ProbeResult<Vec<String>>;

    /// Opaque identifier of the owning OS user, comparable with
    /// [`ProcessTable::current_owner`].
    fn owner(&self) -> ProbeResult<String>;

    fn cwd(&self) -> ProbeResult<PathBuf>;

    /// Pids of every process below this one, children first.
    fn descendants(&self) -> ProbeResult<Vec<u32>>;

    /// Local IPv4 TCP ports this process has in LISTEN state.
    fn listening_ports(&self) -> ProbeResult<Vec<u16>>;
}

/// A source of process snapshots.
pub trait ProcessTable {
    type Entry: ProcessEntry;

    /// Owner identifier of the calling process, if it can be determined.
    fn current_owner(&self) -> Option<String>;

    /// Take a fresh snapshot of the process table.
    fn snapshot(&self) -> ProbeResult<Vec<Self::Entry>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ProcessStatus::Running, true)]
    #[test_case(ProcessStatus::Sleeping, true)]
    #[test_case(ProcessStatus::Idle, true)]
    #[test_case(ProcessStatus::DiskSleep, false)]
    #[test_case(ProcessStatus::Zombie, false)]
    #[test_case(ProcessStatus::Stopped, false)]
    #[test_case(ProcessStatus::Dead, false)]
    fn liveness_follows_status(status: ProcessStatus, alive: bool) {
        assert_eq!(status.is_alive(), alive);
    }

    #[test]
    fn vanished_errors_are_classified() {
        assert!(ProbeError::NoSuchProcess { pid: 1 }.is_vanished());
        assert!(ProbeError::ZombieProcess { pid: 1 }.is_vanished());
        assert!(!ProbeError::AccessDenied { pid: 1 }.is_vanished());
        assert!(ProbeError::AccessDenied { pid: 1 }.is_access_denied());
        assert_eq!(ProbeError::Unsupported("sockets").pid(), None);
    }

    #[test]
    fn status_serializes_in_kebab_case() {
        let json = serde_json::to_string(&ProcessStatus::DiskSleep).unwrap();
        assert_eq!(json, "\"disk-sleep\"");
        assert_eq!(ProcessStatus::Sleeping.to_string(), "sleeping");
    }
}
