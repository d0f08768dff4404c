//! Unified error handling for mapdl-warden
//!
//! Module-local errors (`ProbeError`, `LaunchError`, `CredentialError`,
//! `JobError`) are
//! converted into [`WardenError`] at the crate boundary, which carries a
//! category, a user-facing message and the original source.

use crate::core::probe::ProbeError;
use crate::hpc::credentials::CredentialError;
use crate::hpc::jobs::JobError;
use crate::launcher::LaunchError;
use std::io;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum WardenError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        source: Option<BoxedSource>,
    },

    /// Process inspection and signalling errors
    #[error("Process error: {message}")]
    Process {
        message: String,
        pid: Option<u32>,
        source: Option<BoxedSource>,
    },

    /// Solver launch errors
    #[error("Launch error: {message}")]
    Launch {
        message: String,
        source: Option<BoxedSource>,
    },

    /// Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        url: Option<String>,
        source: Option<BoxedSource>,
    },

    /// Authentication errors
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        source: Option<BoxedSource>,
    },

    /// Filesystem errors
    #[error("Filesystem error: {message} (path: {path})")]
    Filesystem {
        message: String,
        path: String,
        source: Option<BoxedSource>,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        value: Option<String>,
    },

    /// Timeout errors
    #[error("Timeout error: {message} (timeout: {timeout_ms}ms)")]
    Timeout { message: String, timeout_ms: u64 },

    /// Unknown errors
    #[error("Unknown error: {message}")]
    Unknown {
        message: String,
        source: Option<BoxedSource>,
    },
}

impl WardenError {
    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            WardenError::Config { .. } => ErrorCategory::Config,
            WardenError::Process { .. } => ErrorCategory::Process,
            WardenError::Launch { .. } => ErrorCategory::Launch,
            WardenError::Network { .. } => ErrorCategory::Network,
            WardenError::Auth { .. } => ErrorCategory::Auth,
            WardenError::Filesystem { .. } => ErrorCategory::Filesystem,
            WardenError::Validation { .. } => ErrorCategory::Validation,
            WardenError::Timeout { .. } => ErrorCategory::Timeout,
            WardenError::Unknown { .. } => ErrorCategory::Unknown,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            WardenError::Config { message, .. } => {
                format!("Configuration problem: {}", message)
            }
            WardenError::Process { message, pid, .. } => match pid {
                Some(pid) => format!("Process {} problem: {}", pid, message),
                None => format!("Process problem: {}", message),
            },
            WardenError::Launch { message, .. } => {
                format!("Could not launch MAPDL: {}", message)
            }
            WardenError::Network { message, url, .. } => match url {
                Some(url) => format!("Network issue ({}): {}", url, message),
                None => format!("Network issue: {}", message),
            },
            WardenError::Auth { message, .. } => {
                format!("Authentication failed: {}", message)
            }
            WardenError::Filesystem { message, path, .. } => {
                format!("File system problem at '{}': {}", path, message)
            }
            WardenError::Validation { message, .. } => {
                format!("Input validation failed: {}", message)
            }
            WardenError::Timeout {
                message,
                timeout_ms,
            } => {
                format!(
                    "Operation timed out after {:.1}s: {}",
                    *timeout_ms as f64 / 1000.0,
                    message
                )
            }
            WardenError::Unknown { message, .. } => {
                format!("Unexpected error: {}", message)
            }
        }
    }
}

impl From<io::Error> for WardenError {
    fn from(err: io::Error) -> Self {
        WardenError::Filesystem {
            message: format!("I/O error: {err}"),
            path: "<io>".to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        WardenError::Config {
            message: format!("invalid JSON: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|url| url.to_string());
        WardenError::Network {
            message: err.to_string(),
            url,
            source: Some(Box::new(err)),
        }
    }
}

impl From<ProbeError> for WardenError {
    fn from(err: ProbeError) -> Self {
        WardenError::Process {
            message: err.to_string(),
            pid: err.pid(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<LaunchError> for WardenError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::Timeout { timeout, .. } => WardenError::Timeout {
                message: err.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            },
            LaunchError::InvalidVersion(ref value) => WardenError::Validation {
                message: err.to_string(),
                field: Some("version".to_string()),
                value: Some(value.clone()),
            },
            other => WardenError::Launch {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

impl From<CredentialError> for WardenError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Io { ref path, .. } => WardenError::Filesystem {
                message: err.to_string(),
                path: path.display().to_string(),
                source: Some(Box::new(err)),
            },
            other => WardenError::Auth {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

impl From<JobError> for WardenError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Io { ref path, .. } => WardenError::Filesystem {
                message: err.to_string(),
                path: path.display().to_string(),
                source: Some(Box::new(err)),
            },
            JobError::Config { .. } => WardenError::Config {
                message: err.to_string(),
                source: Some(Box::new(err)),
            },
            JobError::MissingFile(ref path) => WardenError::Validation {
                message: err.to_string(),
                field: Some("file".to_string()),
                value: Some(path.display().to_string()),
            },
            other => WardenError::Validation {
                message: other.to_string(),
                field: Some("mode".to_string()),
                value: None,
            },
        }
    }
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Process,
    Launch,
    Network,
    Auth,
    Filesystem,
    Validation,
    Timeout,
    Unknown,
}

impl ErrorCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            ErrorCategory::Config => "Configuration",
            ErrorCategory::Process => "Process",
            ErrorCategory::Launch => "Launch",
            ErrorCategory::Network => "Network",
            ErrorCategory::Auth => "Authentication",
            ErrorCategory::Filesystem => "Filesystem",
            ErrorCategory::Validation => "Validation",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::Unknown => "Unknown",
        }
    }
}

/// Result type alias for convenience
pub type WardenResult<T> = Result<T, WardenError>;

/// Convenience functions for creating common errors
pub mod errors {
    use super::*;

    pub fn network_error(message: impl Into<String>) -> WardenError {
        WardenError::Network {
            message: message.into(),
            url: None,
            source: None,
        }
    }

    pub fn validation_error(
        message: impl Into<String>,
        field: Option<String>,
        value: Option<String>,
    ) -> WardenError {
        WardenError::Validation {
            message: message.into(),
            field,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_categories() {
        let network_err = errors::network_error("test");
        assert_eq!(network_err.category(), ErrorCategory::Network);

        let validation_err = errors::validation_error("bad", Some("port".to_string()), None);
        assert_eq!(validation_err.category(), ErrorCategory::Validation);
        assert_eq!(validation_err.category().display_name(), "Validation");
    }

    #[test]
    fn credential_io_errors_name_the_file() {
        let err: WardenError = CredentialError::Io {
            path: "/tmp/credentials.json".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();

        assert_eq!(err.category(), ErrorCategory::Filesystem);
        assert!(err.user_message().contains("/tmp/credentials.json"));
    }

    #[test]
    fn probe_errors_keep_their_pid() {
        let err: WardenError = ProbeError::AccessDenied { pid: 77 }.into();
        assert_eq!(err.category(), ErrorCategory::Process);
        assert!(err.user_message().contains("77"));
    }

    #[test]
    fn launch_timeout_becomes_timeout_error() {
        let err: WardenError = LaunchError::Timeout {
            port: 50052,
            timeout: Duration::from_secs(3),
        }
        .into();
        match err {
            WardenError::Timeout { timeout_ms, .. } => assert_eq!(timeout_ms, 3000),
            other => panic!("expected timeout error, got {other:?}"),
        }
    }

    #[test]
    fn job_errors_map_to_categories() {
        let missing: WardenError = JobError::MissingFile("run.py".into()).into();
        assert_eq!(missing.category(), ErrorCategory::Validation);
        assert!(missing.user_message().contains("run.py"));

        let config: WardenError = JobError::Config {
            path: "hps_config.json".into(),
            source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        }
        .into();
        assert_eq!(config.category(), ErrorCategory::Config);
    }

    #[test]
    fn invalid_version_is_a_validation_error() {
        let err: WardenError = LaunchError::InvalidVersion("abc".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }
}
