//! Solver executable lookup

use super::LaunchError;
use crate::config::{EXEC_ENV, SUPPORTED_VERSIONS};
use crate::utils::config_paths::UserConfig;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locate the solver executable.
///
/// Order: explicit path, `MAPDL_WARDEN_EXEC`, the user config, then a PATH
/// search for `ansys<ver>` (the requested release, or every known release
/// from newest to oldest) followed by `mapdl`.
pub fn resolve_exec_file(
    explicit: Option<&Path>,
    version: Option<u32>,
    user_config: &UserConfig,
) -> Result<PathBuf, LaunchError> {
    let from_env = std::env::var_os(EXEC_ENV).map(PathBuf::from);
    resolve_exec_file_from(explicit, from_env, version, user_config, None)
}

pub(crate) fn resolve_exec_file_from(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
    version: Option<u32>,
    user_config: &UserConfig,
    search_path: Option<&OsStr>,
) -> Result<PathBuf, LaunchError> {
    let configured = [
        (explicit.map(Path::to_path_buf), "command line"),
        (from_env, EXEC_ENV),
        (user_config.exec_file(), "user config"),
    ];

    for (candidate, origin) in configured {
        if let Some(path) = candidate {
            if !path.is_file() {
                return Err(LaunchError::ExecNotFound(format!(
                    "'{}' from {} does not exist",
                    path.display(),
                    origin
                )));
            }
            debug!(path = %path.display(), origin, "using configured executable");
            return Ok(path);
        }
    }

    for name in candidate_names(version) {
        let found = match search_path {
            Some(paths) => which::which_in(&name, Some(paths), "."),
            None => which::which(&name),
        };
        if let Ok(path) = found {
            debug!(path = %path.display(), "found executable on PATH");
            return Ok(path);
        }
    }

    Err(LaunchError::ExecNotFound(match version {
        Some(version) => format!("no executable found for release {version}"),
        None => "no solver executable found on PATH".to_string(),
    }))
}

fn candidate_names(version: Option<u32>) -> Vec<String> {
    match version {
        Some(version) => vec![format!("ansys{version}")],
        None => SUPPORTED_VERSIONS
            .iter()
            .rev()
            .map(|version| format!("ansys{version}"))
            .chain(std::iter::once("mapdl".to_string()))
            .collect(),
    }
}
