//! Solver instance discovery
//!
//! Walks a process table snapshot and keeps the processes that look like a
//! MAPDL gRPC server: a solver-like executable name, an alive status, the
//! `-grpc` switch and a numeric `-port` value. Each process is inspected in
//! isolation; a process that exits, turns into a zombie or denies access
//! mid-scan is skipped without affecting the others.

use crate::config::{DEFAULT_NAME_PATTERNS, GRPC_FLAG, PORT_FLAG};
use crate::core::models::InstanceDescriptor;
use crate::core::probe::{ProbeError, ProbeResult, ProcessEntry, ProcessTable};
use crate::error::WardenResult;
use crate::platform::{self, SystemTable};
use tracing::{debug, warn};

/// Case-insensitive substring match on executable names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverMatcher {
    patterns: Vec<String>,
}

impl SolverMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| pattern.as_ref().trim().to_lowercase())
            .filter(|pattern| !pattern.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, process_name: &str) -> bool {
        let name_lower = process_name.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| name_lower.contains(pattern.as_str()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for SolverMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_PATTERNS)
    }
}

/// Policy for processes whose command line cannot be read.
///
/// Processes owned by the calling user are kept with an empty command line
/// (they then fail the `-grpc` check like any other process without the
/// switch). Processes owned by anyone else are dropped silently. Other users'
/// process metadata is never reported when the OS refuses to show it.
#[derive(Debug, Clone, Default)]
pub struct OwnershipPolicy {
    current_owner: Option<String>,
}

impl OwnershipPolicy {
    pub fn new(current_owner: Option<String>) -> Self {
        Self { current_owner }
    }

    /// Whether a process with an unreadable command line stays in the scan.
    pub fn admits_unreadable<E: ProcessEntry + ?Sized>(&self, entry: &E) -> bool {
        match (&self.current_owner, entry.owner()) {
            (Some(current), Ok(owner)) => *current == owner,
            _ => false,
        }
    }
}

/// A solver process confirmed by name, status and the `-grpc` switch
#[derive(Debug)]
pub struct SolverProcess<E> {
    pub entry: E,
    pub cmdline: Vec<String>,
    /// `None` when `-port` is missing or not numeric
    pub port: Option<u16>,
}

pub fn has_grpc_flag(cmdline: &[String]) -> bool {
    cmdline.iter().any(|arg| arg == GRPC_FLAG)
}

/// Integer following the first `-port` switch.
pub fn parse_grpc_port(cmdline: &[String]) -> Option<u16> {
    let index = cmdline.iter().position(|arg| arg == PORT_FLAG)?;
    cmdline.get(index + 1)?.trim().parse().ok()
}

pub struct Discovery<T: ProcessTable> {
    table: T,
    matcher: SolverMatcher,
}

impl Discovery<SystemTable> {
    /// Discovery over the live OS process table.
    pub fn system() -> Self {
        Self::new(platform::system_table())
    }
}

impl<T: ProcessTable> Discovery<T> {
    pub fn new(table: T) -> Self {
        Self {
            table,
            matcher: SolverMatcher::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: SolverMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn matcher(&self) -> &SolverMatcher {
        &self.matcher
    }

    /// List every running solver gRPC instance visible to the current user.
    ///
    /// Only a failure to enumerate the process table is returned as an
    /// error; per-process failures are logged at debug level and skipped.
    pub fn list_instances(&self) -> WardenResult<Vec<InstanceDescriptor>> {
        let policy = OwnershipPolicy::new(self.table.current_owner());
        let mut instances = Vec::new();

        for entry in self.table.snapshot()? {
            match self.describe(&entry, &policy) {
                Ok(Some(descriptor)) => instances.push(descriptor),
                Ok(None) => {}
                Err(err) => log_skipped(&entry, &err),
            }
        }

        Ok(instances)
    }

    /// First solver process listening on `port` (IPv4), if any.
    pub fn find_instance_by_port(&self, port: u16) -> WardenResult<Option<T::Entry>> {
        let policy = OwnershipPolicy::new(self.table.current_owner());

        for entry in self.table.snapshot()? {
            match self.listens_on(&entry, &policy, port) {
                Ok(true) => return Ok(Some(entry)),
                Ok(false) => {}
                Err(err) => log_skipped(&entry, &err),
            }
        }

        Ok(None)
    }

    /// Every alive solver process carrying `-grpc`, with or without a port.
    pub fn solver_processes(&self) -> WardenResult<Vec<SolverProcess<T::Entry>>> {
        let policy = OwnershipPolicy::new(self.table.current_owner());
        let mut processes = Vec::new();

        for entry in self.table.snapshot()? {
            match self.grpc_cmdline(&entry, &policy) {
                Ok(Some(cmdline)) => {
                    let port = parse_grpc_port(&cmdline);
                    processes.push(SolverProcess {
                        entry,
                        cmdline,
                        port,
                    });
                }
                Ok(None) => {}
                Err(err) => log_skipped(&entry, &err),
            }
        }

        Ok(processes)
    }

    /// Name, status and `-grpc` checks shared by every operation.
    ///
    /// Returns the command line of a confirmed solver process, `None` for a
    /// process that is not one.
    fn grpc_cmdline(
        &self,
        entry: &T::Entry,
        policy: &OwnershipPolicy,
    ) -> ProbeResult<Option<Vec<String>>> {
        let name = entry.name()?;
        if !self.matcher.matches(&name) {
            return Ok(None);
        }

        if !entry.status()?.is_alive() {
            return Ok(None);
        }

        let cmdline = match entry.cmdline() {
            Ok(cmdline) => cmdline,
            Err(err) if err.is_access_denied() => {
                if !policy.admits_unreadable(entry) {
                    return Err(err);
                }
                debug!(
                    pid = entry.pid(),
                    "command line unreadable for own process, keeping it without one"
                );
                Vec::new()
            }
            Err(err) => return Err(err),
        };

        if !has_grpc_flag(&cmdline) {
            return Ok(None);
        }

        Ok(Some(cmdline))
    }

    fn describe(
        &self,
        entry: &T::Entry,
        policy: &OwnershipPolicy,
    ) -> ProbeResult<Option<InstanceDescriptor>> {
        let Some(cmdline) = self.grpc_cmdline(entry, policy)? else {
            return Ok(None);
        };

        let Some(port) = parse_grpc_port(&cmdline) else {
            debug!(pid = entry.pid(), "'-port' missing or not numeric");
            return Ok(None);
        };

        let is_instance = match entry.descendants() {
            Ok(descendants) => descendants.len() >= 2,
            Err(err) if err.is_vanished() => return Err(err),
            Err(err) => {
                debug!(pid = entry.pid(), error = %err, "descendants unavailable");
                false
            }
        };

        let cwd = match entry.cwd() {
            Ok(path) => path.display().to_string(),
            Err(err) if err.is_vanished() => return Err(err),
            Err(_) => String::new(),
        };

        let descriptor = InstanceDescriptor::new(entry.pid(), entry.name()?, entry.status()?, port)
            .with_cmdline(cmdline)
            .with_cwd(cwd)
            .with_owner(entry.owner().ok())
            .with_is_instance(is_instance);

        Ok(Some(descriptor))
    }

    fn listens_on(
        &self,
        entry: &T::Entry,
        policy: &OwnershipPolicy,
        port: u16,
    ) -> ProbeResult<bool> {
        if self.grpc_cmdline(entry, policy)?.is_none() {
            return Ok(false);
        }
        Ok(entry.listening_ports()?.contains(&port))
    }
}

/// List solver instances on the live process table.
pub fn list_instances() -> WardenResult<Vec<InstanceDescriptor>> {
    Discovery::system().list_instances()
}

/// Find the solver process listening on `port` on the live process table.
pub fn find_instance_by_port(port: u16) -> WardenResult<Option<platform::SystemEntry>> {
    Discovery::system().find_instance_by_port(port)
}

fn log_skipped<E: ProcessEntry>(entry: &E, err: &ProbeError) {
    match err {
        ProbeError::NoSuchProcess { .. } | ProbeError::ZombieProcess { .. } => {
            debug!(pid = entry.pid(), "process vanished during scan");
        }
        ProbeError::AccessDenied { .. } | ProbeError::Unsupported(_) => {
            debug!(pid = entry.pid(), error = %err, "process not inspectable");
        }
        _ => warn!(pid = entry.pid(), error = %err, "skipping process"),
    }
}
