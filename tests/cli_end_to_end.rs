use assert_cmd::prelude::*;
use mapdl_warden::config::LOG_ENV;
use predicates::prelude::*;
use std::net::TcpListener;
use std::process::Command;
use tempfile::TempDir;

struct TempHome {
    dir: TempDir,
}

impl TempHome {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("temp dir"),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("mapdl-warden").expect("binary built");
        cmd.env("HOME", self.dir.path());
        if cfg!(windows) {
            cmd.env("USERPROFILE", self.dir.path());
        }
        cmd.env("RUST_LOG", "off");
        cmd.env("NO_COLOR", "1");
        cmd.env_remove(LOG_ENV);
        cmd
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

#[test]
fn help_command_displays_usage_information() {
    let home = TempHome::new();

    home.command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("mapdl-warden"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("stop"));
}

#[test]
fn list_json_prints_an_array() {
    let home = TempHome::new();

    let output = home.command().args(["list", "--json"]).output().expect("run list");
    assert!(output.status.success());

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("list --json prints JSON");
    assert!(value.is_array());
}

#[test]
fn stop_without_matching_instance_reports_error() {
    let home = TempHome::new();

    home.command()
        .args(["stop", "--port", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "No Ansys instances running on port 1 have been found.",
        ));
}

#[test]
fn port_command_reports_free_port() {
    let home = TempHome::new();
    let port = free_port();

    home.command()
        .args(["port", &port.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Port {port} is available.")));
}

#[test]
fn port_command_reports_port_in_use() {
    let home = TempHome::new();
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();

    home.command()
        .args(["port", &port.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Port {port} is")))
        .stdout(predicate::str::contains("available").not());
}

#[test]
fn start_with_missing_executable_fails() {
    let home = TempHome::new();
    let missing = home.dir.path().join("no-such-solver");

    home.command()
        .args(["start", "--exec-file"])
        .arg(&missing)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Solver executable not found"));
}

#[test]
fn default_credentials_round_trip() {
    let home = TempHome::new();

    home.command()
        .args(["logout", "--default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No credentials stored for defaultconfig"));

    home.command()
        .args(["login", "--default"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("--default needs at least one of"));

    home.command()
        .args(["login", "--default", "--url", "https://cluster:3000/hps"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Default credentials have been stored."));
    assert!(home
        .dir
        .path()
        .join(".mapdl-warden")
        .join("credentials.json")
        .is_file());

    home.command()
        .args(["logout", "--default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Credentials for defaultconfig have been deleted."));
}

#[test]
fn submit_with_missing_main_file_fails() {
    let home = TempHome::new();

    home.command()
        .current_dir(home.dir.path())
        .args(["submit", "missing.py", "--url", "https://cluster:3000/hps"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("The file 'missing.py' must exist"));
}
