//! Local port probing

use crate::config::LOCALHOST;
use crate::core::discovery::{has_grpc_flag, SolverMatcher};
use crate::core::models::PortStatus;
use crate::core::probe::{ProcessEntry, ProcessTable};
use crate::error::{errors, WardenResult};
use crate::platform;
use std::net::TcpListener;
use tracing::debug;

/// Whether binding `host:port` fails.
pub fn port_in_use_by_socket(port: u16, host: &str) -> bool {
    TcpListener::bind((host, port)).is_err()
}

/// Availability of `port` on localhost and the process listening on it.
pub fn check_port_status(port: u16) -> PortStatus {
    check_port_status_with(&platform::system_table(), &SolverMatcher::default(), port, LOCALHOST)
}

pub fn check_port_status_with<T: ProcessTable>(
    table: &T,
    matcher: &SolverMatcher,
    port: u16,
    host: &str,
) -> PortStatus {
    let bindable = !port_in_use_by_socket(port, host);

    match process_listening_on(table, port) {
        Some(entry) => {
            let used_by_solver = is_solver_process(&entry, matcher);
            PortStatus::taken(port, entry.pid(), used_by_solver)
        }
        None => PortStatus::free(port, bindable),
    }
}

/// First available port in `start..start + max_attempts`.
pub fn find_available_port(start: u16, max_attempts: u16) -> WardenResult<u16> {
    find_available_port_with(
        &platform::system_table(),
        &SolverMatcher::default(),
        start,
        max_attempts,
    )
}

pub fn find_available_port_with<T: ProcessTable>(
    table: &T,
    matcher: &SolverMatcher,
    start: u16,
    max_attempts: u16,
) -> WardenResult<u16> {
    for offset in 0..max_attempts {
        let Some(port) = start.checked_add(offset) else {
            break;
        };
        if check_port_status_with(table, matcher, port, LOCALHOST).available {
            debug!(port, "found available port");
            return Ok(port);
        }
    }

    Err(errors::network_error(format!(
        "No available port found in range {}-{}",
        start,
        start.saturating_add(max_attempts)
    )))
}

/// Any process, solver or not, with an IPv4 listener on `port`.
fn process_listening_on<T: ProcessTable>(table: &T, port: u16) -> Option<T::Entry> {
    let entries = match table.snapshot() {
        Ok(entries) => entries,
        Err(err) => {
            debug!(error = %err, "cannot enumerate processes for port lookup");
            return None;
        }
    };

    entries.into_iter().find(|entry| {
        entry
            .listening_ports()
            .map(|ports| ports.contains(&port))
            .unwrap_or(false)
    })
}

fn is_solver_process<E: ProcessEntry>(entry: &E, matcher: &SolverMatcher) -> bool {
    let name_matches = entry
        .name()
        .map(|name| matcher.matches(&name))
        .unwrap_or(false);

    name_matches
        && entry
            .cmdline()
            .map(|cmdline| has_grpc_flag(&cmdline))
            .unwrap_or(false)
}
