//! `stop`: kill solver instances by port, by pid or all of them

use super::{print_error, print_success, print_warning, StopArgs};
use crate::config::DEFAULT_PORT;
use crate::core::discovery::{Discovery, SolverMatcher};
use crate::core::probe::{ProcessEntry, ProcessStatus, ProcessTable};
use crate::error::WardenResult;
use crate::platform;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTarget {
    All,
    Port(u16),
    Pid(u32),
}

impl StopTarget {
    /// `--all` wins, then `--port`; without either, `--pid`, else the default port.
    pub fn from_args(args: &StopArgs) -> Self {
        match (args.all, args.port, args.pid) {
            (true, ..) => StopTarget::All,
            (false, Some(port), _) => StopTarget::Port(port),
            (false, None, Some(pid)) => StopTarget::Pid(pid),
            (false, None, None) => StopTarget::Port(DEFAULT_PORT),
        }
    }

    fn selects(&self, port: Option<u16>) -> bool {
        match self {
            StopTarget::All => true,
            StopTarget::Port(target) => port == Some(*target),
            StopTarget::Pid(_) => false,
        }
    }
}

pub fn execute(args: &StopArgs, matcher: SolverMatcher) -> WardenResult<()> {
    match StopTarget::from_args(args) {
        StopTarget::Pid(pid) => stop_pid(pid),
        target => stop_solvers(target, matcher),
    }
}

fn stop_solvers(target: StopTarget, matcher: SolverMatcher) -> WardenResult<()> {
    let processes = Discovery::system().with_matcher(matcher).solver_processes()?;

    let mut killed = false;
    for process in processes.iter().filter(|process| target.selects(process.port)) {
        let pid = process.entry.pid();
        match platform::kill_process(pid) {
            Ok(()) => killed = true,
            Err(err) => print_warning(format!("Could not stop process {pid}: {err}")),
        }
    }

    let scope = match target {
        StopTarget::Port(port) => format!(" running on port {port}"),
        _ => String::new(),
    };
    if killed {
        print_success(format!("Ansys instances{scope} have been stopped."));
    } else {
        print_error(format!("No Ansys instances{scope} have been found."));
    }
    Ok(())
}

fn stop_pid(pid: u32) -> WardenResult<()> {
    let table = platform::system_table();
    let Some(entry) = table.snapshot()?.into_iter().find(|entry| entry.pid() == pid) else {
        print_error(format!("No process with PID {pid} has been found."));
        return Ok(());
    };

    let descendants = entry.descendants().unwrap_or_else(|err| {
        debug!(pid, error = %err, "descendants unavailable");
        Vec::new()
    });

    // children first so the parent cannot respawn them
    for child in descendants.iter().rev() {
        if let Err(err) = platform::kill_process(*child) {
            debug!(pid = *child, error = %err, "failed to kill child");
        }
    }
    let result = platform::kill_process(pid);

    if result.is_err() || (platform::process_alive(pid) && !is_gone(&table, pid)) {
        print_error(format!(
            "The process with PID {pid} and its children could not be killed."
        ));
    } else {
        print_success(format!(
            "The process with PID {pid} and its children have been stopped."
        ));
    }
    Ok(())
}

/// Gone from the table, or a zombie waiting for its parent to reap it.
fn is_gone<T: ProcessTable>(table: &T, pid: u32) -> bool {
    table
        .snapshot()
        .ok()
        .and_then(|entries| entries.into_iter().find(|entry| entry.pid() == pid))
        .and_then(|entry| entry.status().ok())
        .map_or(true, |status| status == ProcessStatus::Zombie)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn args(port: Option<u16>, pid: Option<u32>, all: bool) -> StopArgs {
        StopArgs { port, pid, all }
    }

    #[test_case(args(None, None, false), StopTarget::Port(50052); "default port")]
    #[test_case(args(Some(50060), None, false), StopTarget::Port(50060); "explicit port")]
    #[test_case(args(None, Some(42), false), StopTarget::Pid(42); "pid only")]
    #[test_case(args(Some(50060), Some(42), false), StopTarget::Port(50060); "port beats pid")]
    #[test_case(args(None, None, true), StopTarget::All; "all")]
    fn target_selection(args: StopArgs, expected: StopTarget) {
        assert_eq!(StopTarget::from_args(&args), expected);
    }

    #[test]
    fn port_target_matches_parsed_port_only() {
        let target = StopTarget::Port(50052);
        assert!(target.selects(Some(50052)));
        assert!(!target.selects(Some(50053)));
        assert!(!target.selects(None));
        assert!(StopTarget::All.selects(None));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn killed_child_counts_as_gone_before_reaping() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();

        platform::kill_process(pid).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(is_gone(&platform::system_table(), pid));

        child.wait().unwrap();
    }
}
