use crate::config::GRACEFUL_STOP_TIMEOUT;
use std::io;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const TERMINATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Detach a solver from the CLI's process group
///
/// The solver keeps running after `mapdl-warden start` returns, so unlike a
/// supervised child it gets no parent death signal.
pub fn prepare_detached(cmd: &mut Command) -> io::Result<()> {
    use std::os::unix::process::CommandExt;

    unsafe {
        cmd.pre_exec(|| {
            if set_process_group() != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    Ok(())
}

/// Check if process is alive
pub fn process_alive(pid: u32) -> bool {
    match send_signal(pid, 0) {
        Ok(()) => true,
        // EPERM means the process exists but belongs to someone else
        Err(err) => err.raw_os_error() == Some(libc::EPERM),
    }
}

/// Kill process with SIGKILL
///
/// A process that is already gone counts as killed.
pub fn kill_process(pid: u32) -> io::Result<()> {
    if !process_alive(pid) {
        return Ok(());
    }

    match send_signal(pid, libc::SIGKILL) {
        Ok(()) => {
            debug!(pid, "sent SIGKILL");
            Ok(())
        }
        Err(err) if err.raw_os_error() == Some(libc::ESRCH) => Ok(()),
        Err(err) => Err(err),
    }
}

/// SIGTERM, then SIGKILL once the grace period is over
///
/// An unreaped child stays visible to `process_alive` after SIGTERM, so a
/// caller owning the child still gets the SIGKILL after the grace period.
pub fn terminate_process(pid: u32) -> io::Result<()> {
    if !process_alive(pid) {
        return Ok(());
    }

    match send_signal(pid, libc::SIGTERM) {
        Ok(()) => debug!(pid, "sent SIGTERM"),
        Err(err) if err.raw_os_error() == Some(libc::ESRCH) => return Ok(()),
        Err(err) => return Err(err),
    }

    let deadline = Instant::now() + GRACEFUL_STOP_TIMEOUT;
    while Instant::now() < deadline {
        if !process_alive(pid) {
            return Ok(());
        }
        thread::sleep(TERMINATE_POLL_INTERVAL);
    }

    kill_process(pid)
}

/// Encapsulates unsafe setpgid call
unsafe fn set_process_group() -> libc::c_int {
    unsafe { libc::setpgid(0, 0) }
}

/// Encapsulates unsafe kill call
fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let c_pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {pid}")))?;
    // pid 0 and negative values would signal whole process groups
    if c_pid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal pid {pid}"),
        ));
    }

    let result = unsafe { libc::kill(c_pid, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
