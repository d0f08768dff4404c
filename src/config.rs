use std::time::Duration;

pub const APP_NAME: &str = "mapdl-warden";

/// Substrings identifying solver executables
pub const DEFAULT_NAME_PATTERNS: &[&str] = &["ansys", "mapdl"];
pub const GRPC_FLAG: &str = "-grpc";
pub const PORT_FLAG: &str = "-port";

pub const LOCALHOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 50052;
// Ports probed after the preferred one when it is taken
pub const PORT_SEARCH_ATTEMPTS: u16 = 100;

pub const DEFAULT_JOBNAME: &str = "file";
pub const DEFAULT_NPROC: u32 = 2;
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(45);
pub const LAUNCH_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const LAUNCH_OUTPUT_FILE: &str = ".__tmp__.out";
// Between SIGTERM and SIGKILL
pub const GRACEFUL_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Oldest to newest installed release the exec lookup knows about
pub const SUPPORTED_VERSIONS: &[u32] = &[
    202, 203, 211, 212, 213, 221, 222, 231, 232, 241, 242, 251, 252,
];

pub const PORT_ENV: &str = "MAPDL_WARDEN_PORT";
pub const EXEC_ENV: &str = "MAPDL_WARDEN_EXEC";
pub const LOG_ENV: &str = "MAPDL_WARDEN_LOG";
pub const NODIAG_ENV: &str = "ANS_CMD_NODIAG";

pub const CONFIG_DIRECTORY: &str = ".mapdl-warden";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

// HPC platform authentication
pub const DEFAULT_IDENTIFIER: &str = "defaultconfig";
pub const DEFAULT_EXPIRATION_MINUTES: i64 = 4 * 24 * 60;
pub const AUTH_CLIENT_ID: &str = "rep-cli";
pub const AUTH_REALM: &str = "rep";
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

// HPC job submission
pub const HPS_CONFIG_FILE: &str = "hps_config.json";
pub const JMS_API_PATH: &str = "jms/api/v1";
pub const FS_API_PATH: &str = "fs/api/v1";
pub const DEFAULT_PROJECT_NAME: &str = "My PyMAPDL job";
pub const DEFAULT_PYTHON: f64 = 3.0;
pub const DEFAULT_JOB_CORES: u32 = 1;
// MB
pub const DEFAULT_JOB_MEMORY: u64 = 100;
pub const DEFAULT_JOB_DISK_SPACE: u64 = 100;
pub const APDL_OUTPUT_FILE: &str = "apdl_output.out";
pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);
