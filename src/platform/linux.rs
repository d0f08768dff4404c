//! `/proc` backed process table

use super::{collect_descendants, index_children, ChildIndex};
use crate::core::probe::{ProbeError, ProbeResult, ProcessEntry, ProcessStatus, ProcessTable};
use procfs::net::TcpState;
use procfs::process::{FDTarget, Process};
use procfs::ProcError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// `comm` is cut at TASK_COMM_LEN - 1 bytes
const COMM_MAX_LEN: usize = 15;

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsTable;

impl ProcessTable for ProcfsTable {
    type Entry = ProcfsProcess;

    fn current_owner(&self) -> Option<String> {
        Some(nix::unistd::getuid().as_raw().to_string())
    }

    fn snapshot(&self) -> ProbeResult<Vec<ProcfsProcess>> {
        let processes: Vec<Process> = procfs::process::all_processes()
            .map_err(|err| ProbeError::Enumeration(err.to_string()))?
            .filter_map(Result::ok)
            .collect();

        let parents = processes.iter().filter_map(|process| {
            let stat = process.stat().ok()?;
            Some((process.pid as u32, stat.ppid as u32))
        });
        let children = Arc::new(index_children(parents));

        debug!(count = processes.len(), "process table snapshot");

        Ok(processes
            .into_iter()
            .map(|process| ProcfsProcess {
                process,
                children: Arc::clone(&children),
            })
            .collect())
    }
}

pub struct ProcfsProcess {
    process: Process,
    children: Arc<ChildIndex>,
}

impl std::fmt::Debug for ProcfsProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcfsProcess")
            .field("pid", &self.process.pid)
            .finish()
    }
}

impl ProcfsProcess {
    fn probe_error(&self, err: ProcError) -> ProbeError {
        let pid = self.pid();
        match err {
            ProcError::NotFound(_) => ProbeError::NoSuchProcess { pid },
            ProcError::PermissionDenied(_) => ProbeError::AccessDenied { pid },
            other => ProbeError::Other {
                pid,
                message: other.to_string(),
            },
        }
    }

    fn socket_inodes(&self) -> ProbeResult<HashSet<u64>> {
        let fds = self.process.fd().map_err(|err| self.probe_error(err))?;
        Ok(fds
            .filter_map(Result::ok)
            .filter_map(|fd| match fd.target {
                FDTarget::Socket(inode) => Some(inode),
                _ => None,
            })
            .collect())
    }
}

impl ProcessEntry for ProcfsProcess {
    fn pid(&self) -> u32 {
        self.process.pid as u32
    }

    fn name(&self) -> ProbeResult<String> {
        let comm = self
            .process
            .stat()
            .map_err(|err| self.probe_error(err))?
            .comm;

        if comm.len() < COMM_MAX_LEN {
            return Ok(comm);
        }

        // Recover the full executable name the kernel truncated
        let full = self
            .process
            .cmdline()
            .ok()
            .and_then(|cmdline| cmdline.into_iter().next())
            .and_then(|arg0| {
                Path::new(&arg0)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .filter(|name| name.starts_with(&comm));

        Ok(full.unwrap_or(comm))
    }

    fn status(&self) -> ProbeResult<ProcessStatus> {
        let stat = self.process.stat().map_err(|err| self.probe_error(err))?;
        Ok(status_from_state(stat.state))
    }

    fn cmdline(&self) -> ProbeResult<Vec<String>> {
        self.process.cmdline().map_err(|err| self.probe_error(err))
    }

    fn owner(&self) -> ProbeResult<String> {
        self.process
            .uid()
            .map(|uid| uid.to_string())
            .map_err(|err| self.probe_error(err))
    }

    fn cwd(&self) -> ProbeResult<PathBuf> {
        self.process.cwd().map_err(|err| self.probe_error(err))
    }

    fn descendants(&self) -> ProbeResult<Vec<u32>> {
        if !self.process.is_alive() {
            return Err(ProbeError::NoSuchProcess { pid: self.pid() });
        }
        Ok(collect_descendants(&self.children, self.pid()))
    }

    fn listening_ports(&self) -> ProbeResult<Vec<u16>> {
        let inodes = self.socket_inodes()?;
        if inodes.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.process.tcp().map_err(|err| self.probe_error(err))?;
        let mut ports: Vec<u16> = table
            .into_iter()
            .filter(|entry| entry.state == TcpState::Listen && inodes.contains(&entry.inode))
            .map(|entry| entry.local_address.port())
            .collect();
        ports.sort_unstable();
        ports.dedup();
        Ok(ports)
    }
}

fn status_from_state(state: char) -> ProcessStatus {
    match state {
        'R' => ProcessStatus::Running,
        'S' => ProcessStatus::Sleeping,
        'D' => ProcessStatus::DiskSleep,
        'T' => ProcessStatus::Stopped,
        't' => ProcessStatus::TracingStop,
        'Z' => ProcessStatus::Zombie,
        'X' | 'x' => ProcessStatus::Dead,
        'K' => ProcessStatus::WakeKill,
        'W' => ProcessStatus::Waking,
        'P' => ProcessStatus::Parked,
        'I' => ProcessStatus::Idle,
        _ => ProcessStatus::Unknown,
    }
}
