//! `start`: launch a solver in gRPC mode

use super::{print_success, StartArgs};
use crate::config::DEFAULT_START_TIMEOUT;
use crate::error::WardenResult;
use crate::launcher::{self, LaunchConfig};
use crate::utils::config_paths::UserConfig;
use std::time::Duration;

pub fn launch_config(args: &StartArgs, user_config: &UserConfig) -> LaunchConfig {
    let start_timeout = args
        .start_timeout
        .map(Duration::from_secs)
        .or_else(|| user_config.start_timeout())
        .unwrap_or(DEFAULT_START_TIMEOUT);

    LaunchConfig {
        exec_file: args.exec_file.clone(),
        run_location: args.run_location.clone(),
        jobname: args.jobname.clone(),
        nproc: args.nproc,
        ram: args.ram,
        port: args.port,
        additional_switches: args.additional_switches.clone(),
        license_type: args.license_type.clone(),
        version: args.version.clone(),
        start_timeout,
        override_lock: args.override_lock,
    }
}

pub fn execute(args: &StartArgs, user_config: &UserConfig) -> WardenResult<()> {
    let config = launch_config(args, user_config);
    let instance = launcher::launch(&config, user_config)?;

    print_success(format!(
        "Launched an MAPDL instance (PID={}) at {}:{}",
        instance.pid, instance.ip, instance.port
    ));
    Ok(())
}
