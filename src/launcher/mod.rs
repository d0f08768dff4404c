//! Local solver launcher
//!
//! Starts a solver in gRPC mode as a detached process and waits until it
//! listens on its port.

pub mod command;
pub mod exec;
pub mod files;

pub use command::{generate_launch_command, license_switch, parse_version};
pub use exec::resolve_exec_file;
pub use files::{check_lock_file, remove_err_files};

use crate::config::{
    DEFAULT_JOBNAME, DEFAULT_NPROC, DEFAULT_PORT, DEFAULT_START_TIMEOUT, LAUNCH_OUTPUT_FILE,
    LAUNCH_POLL_INTERVAL, LOCALHOST, NODIAG_ENV, PORT_ENV, PORT_SEARCH_ATTEMPTS,
};
use crate::error::{errors, WardenResult};
use crate::network::{find_available_port, port_in_use_by_socket};
use crate::platform;
use crate::utils::config_paths::UserConfig;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Invalid solver version '{0}', expected a release like '22.2' or '222'")]
    InvalidVersion(String),
    #[error("Solver executable not found: {0}")]
    ExecNotFound(String),
    #[error("Lock file exists at '{}'. Use --override or delete the lock file to start", .path.display())]
    LockFile { path: PathBuf },
    #[error("Unable to remove lock file '{}', another instance might be running there", .path.display())]
    LockFileRemoval {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error at '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to spawn '{exec}': {source}")]
    Spawn {
        exec: String,
        #[source]
        source: io::Error,
    },
    #[error("Solver process {pid} exited ({status}) before listening on port {port}{}", format_output(.output))]
    Exited {
        pid: u32,
        port: u16,
        status: String,
        output: String,
    },
    #[error("Solver did not listen on port {port} within {}s", .timeout.as_secs())]
    Timeout { port: u16, timeout: Duration },
}

fn format_output(output: &str) -> String {
    if output.is_empty() {
        String::new()
    } else {
        format!(":\n{output}")
    }
}

/// Everything `start` can set; unset values fall back to env and config
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub exec_file: Option<PathBuf>,
    pub run_location: Option<PathBuf>,
    pub jobname: String,
    pub nproc: u32,
    /// Initial workspace in MB
    pub ram: Option<u64>,
    pub port: Option<u16>,
    pub additional_switches: String,
    pub license_type: Option<String>,
    pub version: Option<String>,
    pub start_timeout: Duration,
    pub override_lock: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            exec_file: None,
            run_location: None,
            jobname: DEFAULT_JOBNAME.to_string(),
            nproc: DEFAULT_NPROC,
            ram: None,
            port: None,
            additional_switches: String::new(),
            license_type: None,
            version: None,
            start_timeout: DEFAULT_START_TIMEOUT,
            override_lock: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchedInstance {
    pub ip: String,
    pub port: u16,
    pub pid: u32,
    pub run_location: PathBuf,
}

/// Preferred port: CLI, then `MAPDL_WARDEN_PORT`, then the user config.
pub fn resolve_port(explicit: Option<u16>, user_config: &UserConfig) -> WardenResult<u16> {
    if let Some(port) = explicit {
        return Ok(port);
    }

    if let Ok(value) = std::env::var(PORT_ENV) {
        return value.trim().parse().map_err(|_| {
            errors::validation_error(
                format!("{PORT_ENV} must be a port number, got '{value}'"),
                Some(PORT_ENV.to_string()),
                Some(value.clone()),
            )
        });
    }

    Ok(user_config.default_port.unwrap_or(DEFAULT_PORT))
}

/// Run location given on the command line, or a fresh temporary directory.
pub fn prepare_run_location(requested: Option<&Path>) -> Result<PathBuf, LaunchError> {
    let run_location = match requested {
        Some(path) => path.to_path_buf(),
        None => std::env::temp_dir().join(format!("mapdl-warden-{}", uuid::Uuid::new_v4())),
    };

    fs::create_dir_all(&run_location).map_err(|source| LaunchError::Io {
        path: run_location.clone(),
        source,
    })?;
    Ok(run_location)
}

/// Start a solver and wait until it listens on its gRPC port.
pub fn launch(config: &LaunchConfig, user_config: &UserConfig) -> WardenResult<LaunchedInstance> {
    let version = config.version.as_deref().map(parse_version).transpose()?;
    let exec_file = resolve_exec_file(config.exec_file.as_deref(), version, user_config)?;

    let preferred = resolve_port(config.port, user_config)?;
    let port = find_available_port(preferred, PORT_SEARCH_ATTEMPTS)?;
    if port != preferred {
        info!(preferred, port, "preferred port is taken");
    }

    let run_location = prepare_run_location(config.run_location.as_deref())?;
    check_lock_file(&run_location, &config.jobname, config.override_lock)?;
    remove_err_files(&run_location, &config.jobname)?;

    let switches = license_switch(config.license_type.as_deref(), &config.additional_switches);
    let command = generate_launch_command(
        &exec_file,
        &config.jobname,
        config.nproc,
        config.ram,
        &switches,
        port,
    );

    let output_file = run_location.join(LAUNCH_OUTPUT_FILE);
    let mut child = spawn_detached(&command, &run_location, &output_file)?;
    let pid = child.id();
    info!(pid, port, run_location = %run_location.display(), "solver started");

    wait_until_listening(&mut child, port, config.start_timeout, &output_file)?;

    Ok(LaunchedInstance {
        ip: LOCALHOST.to_string(),
        port,
        pid,
        run_location,
    })
}

fn spawn_detached(
    command: &[String],
    run_location: &Path,
    output_file: &Path,
) -> Result<Child, LaunchError> {
    let Some((program, args)) = command.split_first() else {
        return Err(LaunchError::ExecNotFound("empty launch command".to_string()));
    };

    let io_error = |source| LaunchError::Io {
        path: output_file.to_path_buf(),
        source,
    };
    let stdout = File::create(output_file).map_err(io_error)?;
    let stderr = stdout.try_clone().map_err(io_error)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(run_location)
        .env(NODIAG_ENV, "TRUE")
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    platform::prepare_detached(&mut cmd).map_err(|source| LaunchError::Spawn {
        exec: program.clone(),
        source,
    })?;

    debug!(command = %command.join(" "), "spawning solver");
    cmd.spawn().map_err(|source| LaunchError::Spawn {
        exec: program.clone(),
        source,
    })
}

/// Poll until something listens on `port`; stop the child on timeout.
fn wait_until_listening(
    child: &mut Child,
    port: u16,
    timeout: Duration,
    output_file: &Path,
) -> Result<(), LaunchError> {
    let pid = child.id();
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait().map_err(|source| LaunchError::Io {
            path: output_file.to_path_buf(),
            source,
        })? {
            return Err(LaunchError::Exited {
                pid,
                port,
                status: status.to_string(),
                output: files::tail(output_file, 20),
            });
        }

        if port_in_use_by_socket(port, LOCALHOST) {
            debug!(pid, port, "solver is listening");
            return Ok(());
        }

        if Instant::now() >= deadline {
            if let Err(err) = platform::terminate_process(pid) {
                debug!(pid, error = %err, "failed to stop solver after timeout");
            }
            if let Err(err) = child.wait() {
                debug!(pid, error = %err, "failed to reap solver after timeout");
            }
            return Err(LaunchError::Timeout { port, timeout });
        }

        thread::sleep(LAUNCH_POLL_INTERVAL);
    }
}
