//! `port`: report who uses a local port

use crate::core::models::PortStatus;
use crate::error::WardenResult;
use crate::network::check_port_status;
use colored::Colorize;

pub fn execute(port: u16) -> WardenResult<()> {
    println!("{}", describe(&check_port_status(port)));
    Ok(())
}

pub fn describe(status: &PortStatus) -> String {
    let port = status.port.to_string().cyan();
    match (status.available, status.pid, status.used_by_solver) {
        (true, ..) => format!("Port {} is {}.", port, "available".green()),
        (false, Some(pid), true) => format!(
            "Port {} is used by a MAPDL instance (PID={}).",
            port,
            pid.to_string().yellow()
        ),
        (false, Some(pid), false) => format!(
            "Port {} is used by another process (PID={}).",
            port,
            pid.to_string().yellow()
        ),
        (false, None, _) => format!("Port {} is {}.", port, "in use".red()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptions_name_the_user_of_the_port() {
        colored::control::set_override(false);

        assert_eq!(describe(&PortStatus::free(50052, true)), "Port 50052 is available.");
        assert_eq!(
            describe(&PortStatus::taken(50052, 7, true)),
            "Port 50052 is used by a MAPDL instance (PID=7)."
        );
        assert_eq!(
            describe(&PortStatus::taken(50052, 7, false)),
            "Port 50052 is used by another process (PID=7)."
        );
        assert_eq!(describe(&PortStatus::free(50052, false)), "Port 50052 is in use.");
    }
}
