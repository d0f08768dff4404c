//! Command line definition and parsing

use crate::config::LOG_ENV;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Options of `list`
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    /// Print only full instances (processes with at least two children)
    #[arg(short = 'i', long)]
    pub instances: bool,
    /// Print the command line and working directory of each process
    #[arg(short = 'l', long)]
    pub long: bool,
    /// Print the command line of each process
    #[arg(short = 'c', long)]
    pub cmd: bool,
    /// Print the working directory of each process
    #[arg(long = "cwd", visible_alias = "location")]
    pub location: bool,
    /// Print the instances as JSON
    #[arg(long, conflicts_with_all = ["long", "cmd", "location"])]
    pub json: bool,
}

impl ListArgs {
    pub fn show_cmd(&self) -> bool {
        self.cmd || self.long
    }

    pub fn show_location(&self) -> bool {
        self.location || self.long
    }
}

/// Options of `stop`
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StopArgs {
    /// Stop the instances listening on this gRPC port (default 50052)
    #[arg(long, conflicts_with = "all")]
    pub port: Option<u16>,
    /// Stop this process and all of its children
    #[arg(long, conflicts_with = "all")]
    pub pid: Option<u32>,
    /// Stop every solver instance
    #[arg(long)]
    pub all: bool,
}

/// Options of `start`
#[derive(Args, Debug, Clone, PartialEq)]
pub struct StartArgs {
    /// Solver executable, found automatically when omitted
    #[arg(long, value_name = "PATH")]
    pub exec_file: Option<PathBuf>,
    /// Working directory of the solver, a new temporary directory by default
    #[arg(long, value_name = "DIR")]
    pub run_location: Option<PathBuf>,
    /// Job name
    #[arg(long, default_value = crate::config::DEFAULT_JOBNAME)]
    pub jobname: String,
    /// Number of processors
    #[arg(long, default_value_t = crate::config::DEFAULT_NPROC)]
    pub nproc: u32,
    /// Initial workspace in MB
    #[arg(long)]
    pub ram: Option<u64>,
    /// gRPC port; the first free port from this one is used
    #[arg(long)]
    pub port: Option<u16>,
    /// Extra switches passed to the solver, e.g. "-smp"
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub additional_switches: String,
    /// Seconds to wait for the solver to listen
    #[arg(long, value_name = "SECONDS")]
    pub start_timeout: Option<u64>,
    /// License type or name, e.g. "premium" or "meba"
    #[arg(long)]
    pub license_type: Option<String>,
    /// Solver release, e.g. 22.2 or 222
    #[arg(long)]
    pub version: Option<String>,
    /// Remove an existing lock file in the run location
    #[arg(long = "override")]
    pub override_lock: bool,
}

/// Options of `login`
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginArgs {
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    /// Cluster URL, e.g. https://myserver:3000/hps
    #[arg(long)]
    pub url: Option<String>,
    /// Store the given values as the defaults
    #[arg(long)]
    pub default: bool,
    /// Print the access token
    #[arg(long)]
    pub test_token: bool,
}

/// Options of `logout`
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct LogoutArgs {
    /// Forget the credentials stored for this cluster URL
    #[arg(long, conflicts_with = "default")]
    pub url: Option<String>,
    /// Forget the default credentials
    #[arg(long)]
    pub default: bool,
}

/// Options of `submit`
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct SubmitArgs {
    /// Python, shell or APDL file to run on the cluster
    #[arg(value_name = "MAIN_FILE")]
    pub main_file: PathBuf,
    /// Project name
    #[arg(long)]
    pub name: Option<String>,
    /// Cluster URL, e.g. https://myserver:3000/hps
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    /// Python version on the cluster
    #[arg(long)]
    pub python: Option<f64>,
    /// Comma separated files to upload with the main file
    #[arg(long, value_delimiter = ',')]
    pub extra_files: Vec<PathBuf>,
    /// Comma separated files to collect when the job ends
    #[arg(long, value_delimiter = ',')]
    pub output_files: Vec<String>,
    /// Shell script running a Python main file
    #[arg(long)]
    pub shell_file: Option<PathBuf>,
    /// Python requirements installed before the main file runs
    #[arg(long)]
    pub requirements_file: Option<PathBuf>,
    /// Job settings file, ./hps_config.json by default
    #[arg(long)]
    pub config_file: Option<PathBuf>,
    /// Write the resolved settings back to the config file
    #[arg(long)]
    pub save_config_file: bool,
    #[arg(long)]
    pub num_cores: Option<u32>,
    /// Memory in MB
    #[arg(long)]
    pub memory: Option<u64>,
    /// Disk space in MB
    #[arg(long)]
    pub disk_space: Option<u64>,
    /// Run the job alone on its nodes
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub exclusive: Option<bool>,
    /// Seconds before the job is stopped, 0 for no limit
    #[arg(long, value_name = "SECONDS")]
    pub max_execution_time: Option<u64>,
    /// Wait until the job has finished
    #[arg(long)]
    pub wait: bool,
    /// How to run the main file, detected from its extension by default
    #[arg(long, value_parser = ["python", "shell", "apdl"])]
    pub mode: Option<String>,
}

/// Discover, start and stop local MAPDL gRPC instances
#[derive(Parser, Debug, Clone)]
#[command(
    name = crate::config::APP_NAME,
    about = "Discover, start and stop local MAPDL gRPC instances",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, global = true, env = LOG_ENV, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List running MAPDL instances
    List(ListArgs),

    /// Stop MAPDL instances
    Stop(StopArgs),

    /// Launch a MAPDL instance in gRPC mode
    Start(StartArgs),

    /// Show whether a port is free or which process uses it
    Port {
        #[arg(value_name = "PORT")]
        port: u16,
    },

    /// Authenticate against an HPC cluster and store the credentials
    Login(LoginArgs),

    /// Delete stored HPC credentials
    Logout(LogoutArgs),

    /// Submit a job to an HPC cluster
    Submit(SubmitArgs),
}

impl Cli {
    /// Try to parse arguments (for tests or custom argv)
    pub fn try_parse_command_from<I, T>(iter: I) -> Result<Commands, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Ok(Cli::try_parse_from(iter)?.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_listing_implies_cmd_and_location() {
        let Commands::List(args) = Cli::try_parse_command_from(["mapdl-warden", "list", "-l"])
            .unwrap()
        else {
            panic!("expected list");
        };

        assert!(args.show_cmd());
        assert!(args.show_location());
        assert!(!args.instances);
    }

    #[test]
    fn location_alias_is_accepted() {
        let Commands::List(args) =
            Cli::try_parse_command_from(["mapdl-warden", "list", "--location"]).unwrap()
        else {
            panic!("expected list");
        };

        assert!(args.show_location());
        assert!(!args.show_cmd());
    }

    #[test]
    fn stop_all_conflicts_with_port() {
        assert!(
            Cli::try_parse_command_from(["mapdl-warden", "stop", "--all", "--port", "50052"])
                .is_err()
        );
    }

    #[test]
    fn start_accepts_hyphenated_switches() {
        let Commands::Start(args) = Cli::try_parse_command_from([
            "mapdl-warden",
            "start",
            "--additional-switches",
            "-smp",
            "--nproc",
            "4",
            "--override",
        ])
        .unwrap() else {
            panic!("expected start");
        };

        assert_eq!(args.additional_switches, "-smp");
        assert_eq!(args.nproc, 4);
        assert_eq!(args.jobname, "file");
        assert!(args.override_lock);
    }

    #[test]
    fn submit_splits_file_lists() {
        let Commands::Submit(args) = Cli::try_parse_command_from([
            "mapdl-warden",
            "submit",
            "run.py",
            "--extra-files",
            "a.cdb,b.cdb",
            "--output-files",
            "out.txt",
            "--exclusive",
            "--wait",
        ])
        .unwrap() else {
            panic!("expected submit");
        };

        assert_eq!(args.main_file, PathBuf::from("run.py"));
        assert_eq!(args.extra_files, vec![PathBuf::from("a.cdb"), PathBuf::from("b.cdb")]);
        assert_eq!(args.output_files, vec!["out.txt".to_string()]);
        assert_eq!(args.exclusive, Some(true));
        assert!(args.wait);
        assert_eq!(args.num_cores, None);
    }

    #[test]
    fn submit_rejects_unknown_mode() {
        assert!(
            Cli::try_parse_command_from(["mapdl-warden", "submit", "run.py", "--mode", "perl"])
                .is_err()
        );
    }
}
