//! Configuration file locations
//!
//! Everything persistent lives in ~/.mapdl-warden/: the user config and the
//! HPC credential store.

use crate::config::{CONFIG_DIRECTORY, CONFIG_FILE_NAME, CREDENTIALS_FILE_NAME};
use crate::core::discovery::SolverMatcher;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// User configuration (read from config.json)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserConfig {
    /// Executable name substrings identifying solver processes
    #[serde(default)]
    pub name_patterns: Vec<String>,
    /// Solver executable used by `start` (supports ~ expansion)
    #[serde(default)]
    pub exec_file: Option<String>,
    #[serde(default)]
    pub default_port: Option<u16>,
    #[serde(default)]
    pub start_timeout_secs: Option<u64>,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl UserConfig {
    /// Load from a config file; a missing or malformed file yields the defaults
    pub fn load(config_file: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(config_file) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!(path = %config_file.display(), error = %err, "ignoring malformed config file");
                Self::default()
            }
        }
    }

    pub fn matcher(&self) -> SolverMatcher {
        if self.name_patterns.is_empty() {
            SolverMatcher::default()
        } else {
            SolverMatcher::new(&self.name_patterns)
        }
    }

    pub fn exec_file(&self) -> Option<PathBuf> {
        self.exec_file.as_deref().map(expand_home)
    }

    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_secs.map(Duration::from_secs)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Configuration paths
pub struct ConfigPaths {
    /// ~/.mapdl-warden/
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub credentials_file: PathBuf,
    pub user_config: UserConfig,
}

impl ConfigPaths {
    pub fn new() -> Result<Self> {
        let home_dir =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot find home directory"))?;
        Ok(Self::with_home(&home_dir))
    }

    pub fn with_home(home_dir: &Path) -> Self {
        let config_dir = home_dir.join(CONFIG_DIRECTORY);
        let config_file = config_dir.join(CONFIG_FILE_NAME);
        let user_config = UserConfig::load(&config_file);

        Self {
            credentials_file: config_dir.join(CREDENTIALS_FILE_NAME),
            config_file,
            config_dir,
            user_config,
        }
    }
}
