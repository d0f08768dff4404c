//! Solver command line construction

use super::LaunchError;
use std::path::Path;
use tracing::{debug, warn};

/// License names the solver accepts after `-p`
pub const ALLOWABLE_LICENSES: &[&str] = &["ansys", "meba", "mech_2", "mech_1"];

/// Append the `-p <license>` switch for `license_type` to `additional_switches`.
///
/// Descriptions are mapped onto license names (`"enterprise solver"` becomes
/// `meba`). Unknown names are passed through with a warning; newer license
/// servers ignore them. Without a license type, an existing `-p` switch is
/// validated the same way and left untouched.
pub fn license_switch(license_type: Option<&str>, additional_switches: &str) -> String {
    let Some(license_type) = license_type else {
        if let Some(existing) = requested_license(additional_switches) {
            if !ALLOWABLE_LICENSES.contains(&existing) {
                warn!(
                    license = existing,
                    "additional switch '-p {}' is not a recognized license name, trying it anyway",
                    existing
                );
            }
            debug!(license = existing, "license taken from additional switches");
        }
        return additional_switches.to_string();
    };

    let requested = license_type.trim().to_lowercase();
    let license = if requested.contains("preppost") {
        "preppost".to_string()
    } else if requested.contains("enterprise") && !requested.contains("solver") {
        "ansys".to_string()
    } else if requested.contains("enterprise") {
        "meba".to_string()
    } else if requested.contains("premium") {
        "mech_2".to_string()
    } else if requested.contains("pro") {
        "mech_1".to_string()
    } else {
        if !ALLOWABLE_LICENSES.contains(&requested.as_str()) {
            warn!(
                license = %requested,
                allowed = ?ALLOWABLE_LICENSES,
                "license type is not a recognized license name, trying it anyway"
            );
        }
        requested
    };

    debug!(license = %license, "using license type");
    format!("{} -p {}", additional_switches, license)
        .trim()
        .to_string()
}

/// First license requested with `-p` in a switch string.
fn requested_license(switches: &str) -> Option<&str> {
    let mut tokens = switches.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "-p" {
            return tokens.next();
        }
    }
    None
}

/// Parse a solver release as `22.2` or `222` into `222`.
pub fn parse_version(value: &str) -> Result<u32, LaunchError> {
    let invalid = || LaunchError::InvalidVersion(value.to_string());
    let trimmed = value.trim();

    let digits = match trimmed.split_once('.') {
        Some((major, minor)) if major.len() == 2 && minor.len() == 1 => format!("{major}{minor}"),
        Some(_) => return Err(invalid()),
        None if trimmed.len() == 3 => trimmed.to_string(),
        None => return Err(invalid()),
    };

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse().map_err(|_| invalid())
}

/// Command starting the solver as a gRPC server.
///
/// Layout: `exec -j <job> -np <n> [-m <ram>] <switches...> -port <p> -grpc`
pub fn generate_launch_command(
    exec_file: &Path,
    jobname: &str,
    nproc: u32,
    ram_mb: Option<u64>,
    additional_switches: &str,
    port: u16,
) -> Vec<String> {
    let mut command = vec![
        exec_file.display().to_string(),
        "-j".to_string(),
        jobname.to_string(),
        "-np".to_string(),
        nproc.to_string(),
    ];

    if let Some(ram) = ram_mb {
        command.push("-m".to_string());
        command.push(ram.to_string());
    }

    command.extend(additional_switches.split_whitespace().map(str::to_string));
    command.push("-port".to_string());
    command.push(port.to_string());
    command.push("-grpc".to_string());

    debug!(command = %command.join(" "), "generated launch command");
    command
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use test_case::test_case;

    #[test_case("preppost", "-p preppost")]
    #[test_case("Enterprise", "-p ansys")]
    #[test_case("enterprise solver", "-p meba")]
    #[test_case("premium", "-p mech_2")]
    #[test_case("Pro", "-p mech_1")]
    #[test_case("aa_r", "-p aa_r")]
    fn license_descriptions_map_to_names(license_type: &str, expected: &str) {
        assert_eq!(license_switch(Some(license_type), ""), expected);
    }

    #[test]
    fn license_is_appended_to_existing_switches() {
        assert_eq!(
            license_switch(Some("premium"), "-smp"),
            "-smp -p mech_2"
        );
    }

    #[test]
    fn existing_license_switch_is_kept() {
        assert_eq!(license_switch(None, "-p meba -smp"), "-p meba -smp");
        assert_eq!(requested_license("-smp -p  aa_r"), Some("aa_r"));
        assert_eq!(requested_license("-np 4"), None);
    }

    #[test_case("22.2", 222)]
    #[test_case("222", 222)]
    #[test_case(" 24.1 ", 241)]
    fn versions_parse(value: &str, expected: u32) {
        assert_eq!(parse_version(value).unwrap(), expected);
    }

    #[test_case("2022R2")]
    #[test_case("22")]
    #[test_case("2.22")]
    #[test_case("abc")]
    #[test_case("")]
    fn malformed_versions_are_rejected(value: &str) {
        assert!(matches!(
            parse_version(value),
            Err(LaunchError::InvalidVersion(_))
        ));
    }

    #[test]
    fn launch_command_layout() {
        let command = generate_launch_command(
            &PathBuf::from("/ansys_inc/v242/ansys/bin/ansys242"),
            "file",
            4,
            Some(2048),
            "-smp  -p mech_1",
            50053,
        );

        assert_eq!(
            command,
            vec![
                "/ansys_inc/v242/ansys/bin/ansys242",
                "-j",
                "file",
                "-np",
                "4",
                "-m",
                "2048",
                "-smp",
                "-p",
                "mech_1",
                "-port",
                "50053",
                "-grpc",
            ]
        );
    }

    #[test]
    fn launch_command_without_optional_parts() {
        let command =
            generate_launch_command(&PathBuf::from("mapdl"), "job", 2, None, "", 50052);

        assert_eq!(
            command,
            vec!["mapdl", "-j", "job", "-np", "2", "-port", "50052", "-grpc"]
        );
    }
}
