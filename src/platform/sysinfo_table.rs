//! sysinfo backed process table for targets without `/proc`

use super::{collect_descendants, index_children, ChildIndex};
use crate::core::probe::{ProbeError, ProbeResult, ProcessEntry, ProcessStatus, ProcessTable};
use std::path::PathBuf;
use std::sync::Arc;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoTable;

impl SysinfoTable {
    fn refreshed_system() -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        system
    }
}

impl ProcessTable for SysinfoTable {
    type Entry = SysinfoProcess;

    fn current_owner(&self) -> Option<String> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        system
            .process(pid)
            .and_then(|process| process.user_id())
            .map(|uid| format!("{uid:?}"))
    }

    fn snapshot(&self) -> ProbeResult<Vec<SysinfoProcess>> {
        let system = Self::refreshed_system();
        let processes = system.processes();
        if processes.is_empty() {
            return Err(ProbeError::Enumeration(
                "process list is empty".to_string(),
            ));
        }

        let children = Arc::new(index_children(processes.iter().filter_map(
            |(pid, process)| process.parent().map(|parent| (pid.as_u32(), parent.as_u32())),
        )));

        Ok(processes
            .iter()
            .map(|(pid, process)| SysinfoProcess {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                status: status_from_sysinfo(process.status()),
                cmdline: process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy().into_owned())
                    .collect(),
                cwd: process.cwd().map(|path| path.to_path_buf()),
                owner: process.user_id().map(|uid| format!("{uid:?}")),
                children: Arc::clone(&children),
            })
            .collect())
    }
}

/// Values captured when the snapshot was refreshed
#[derive(Debug)]
pub struct SysinfoProcess {
    pid: u32,
    name: String,
    status: ProcessStatus,
    cmdline: Vec<String>,
    cwd: Option<PathBuf>,
    owner: Option<String>,
    children: Arc<ChildIndex>,
}

impl ProcessEntry for SysinfoProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn name(&self) -> ProbeResult<String> {
        Ok(self.name.clone())
    }

    fn status(&self) -> ProbeResult<ProcessStatus> {
        Ok(self.status)
    }

    // sysinfo reports an unreadable command line as an empty one
    fn cmdline(&self) -> ProbeResult<Vec<String>> {
        if self.cmdline.is_empty() {
            return Err(ProbeError::AccessDenied { pid: self.pid });
        }
        Ok(self.cmdline.clone())
    }

    fn owner(&self) -> ProbeResult<String> {
        self.owner
            .clone()
            .ok_or(ProbeError::AccessDenied { pid: self.pid })
    }

    fn cwd(&self) -> ProbeResult<PathBuf> {
        self.cwd
            .clone()
            .ok_or(ProbeError::AccessDenied { pid: self.pid })
    }

    fn descendants(&self) -> ProbeResult<Vec<u32>> {
        Ok(collect_descendants(&self.children, self.pid))
    }

    fn listening_ports(&self) -> ProbeResult<Vec<u16>> {
        Err(ProbeError::Unsupported("listening socket lookup"))
    }
}

fn status_from_sysinfo(status: sysinfo::ProcessStatus) -> ProcessStatus {
    use sysinfo::ProcessStatus as Sys;
    match status {
        Sys::Run => ProcessStatus::Running,
        Sys::Sleep => ProcessStatus::Sleeping,
        Sys::Idle => ProcessStatus::Idle,
        Sys::Stop => ProcessStatus::Stopped,
        Sys::Tracing => ProcessStatus::TracingStop,
        Sys::Zombie => ProcessStatus::Zombie,
        Sys::Dead => ProcessStatus::Dead,
        Sys::Wakekill => ProcessStatus::WakeKill,
        Sys::Waking => ProcessStatus::Waking,
        Sys::Parked => ProcessStatus::Parked,
        Sys::LockBlocked => ProcessStatus::Locked,
        Sys::UninterruptibleDiskSleep => ProcessStatus::DiskSleep,
        _ => ProcessStatus::Unknown,
    }
}

#[cfg(not(unix))]
pub fn process_alive(pid: u32) -> bool {
    let mut system = System::new();
    let pid = sysinfo::Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

#[cfg(not(unix))]
pub fn kill_process(pid: u32) -> std::io::Result<()> {
    let mut system = System::new();
    let sys_pid = sysinfo::Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    match system.process(sys_pid) {
        Some(process) if !process.kill() => Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("failed to kill process {pid}"),
        )),
        _ => Ok(()),
    }
}

/// No SIGTERM off Unix; the process is killed right away.
#[cfg(not(unix))]
pub fn terminate_process(pid: u32) -> std::io::Result<()> {
    kill_process(pid)
}

/// No process-group handling is needed off Unix.
#[cfg(not(unix))]
pub fn prepare_detached(_cmd: &mut std::process::Command) -> std::io::Result<()> {
    Ok(())
}
