//! CLI subprocess integration tests.
//!
//! These tests invoke the `vessel` binary as a subprocess and verify exit
//! codes, stdout content, and JSON output.

use std::path::Path;
use std::process::{Command, Output};

const CONFIG: &str = r#"config_version = 1

[locks]
retries = 200
retry_interval_ms = 5

[machines.web]
box = "bento/ubuntu"
hostname = "web.local"
synced_folders = ["./src:/vagrant"]

[machines.web.facts]
kernel = "Linux"
os_id = "ubuntu"
os_like = "debian"

[machines.db]
guest = "fedora"
"#;

fn vessel(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vessel"))
        .current_dir(dir)
        .env_remove("VESSEL_LOG")
        .args(args)
        .output()
        .unwrap()
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("vessel.toml"), CONFIG).unwrap();
    dir
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn cli_version_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let output = vessel(dir.path(), &["--version"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("vessel"));
}

#[test]
fn cli_help_lists_lifecycle_commands() {
    let dir = tempfile::tempdir().unwrap();
    let output = vessel(dir.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["up", "halt", "destroy", "status", "snapshot", "package", "detect"] {
        assert!(stdout.contains(cmd), "help must list '{cmd}'");
    }
}

#[test]
fn cli_up_status_destroy_round() {
    let dir = workspace();

    let output = vessel(dir.path(), &["--json", "up", "--parallel", "2"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report = json(&output);
    assert_eq!(report.as_array().unwrap().len(), 2);

    let output = vessel(dir.path(), &["--json", "status", "web"]);
    assert!(output.status.success());
    let status = json(&output);
    assert_eq!(status[0]["name"], "web");
    assert_eq!(status[0]["state"], "running");
    assert_eq!(status[0]["hostname"], "web.local");

    let output = vessel(dir.path(), &["--json", "destroy", "--force", "web"]);
    assert!(output.status.success());
    assert_eq!(json(&output)[0]["result"], "ok");

    let output = vessel(dir.path(), &["--json", "status", "web"]);
    assert_eq!(json(&output)[0]["state"], serde_json::Value::Null);
}

#[test]
fn cli_destroy_without_force_is_declined_when_not_interactive() {
    let dir = workspace();
    assert!(vessel(dir.path(), &["up", "db"]).status.success());

    let output = vessel(dir.path(), &["--json", "destroy", "db"]);
    assert!(output.status.success());
    assert_eq!(json(&output)[0]["result"], "skipped");
    assert!(dir.path().join(".vessel").join("machines.json").exists());
}

#[test]
fn cli_snapshot_and_package() {
    let dir = workspace();
    assert!(vessel(dir.path(), &["up", "web"]).status.success());

    let output = vessel(dir.path(), &["--json", "snapshot", "web", "clean"]);
    assert!(output.status.success());

    let output = vessel(dir.path(), &["snapshot", "web", "clean"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));

    let output = vessel(dir.path(), &["--json", "package", "web", "--output", "web.box"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(dir.path().join("web.box").exists());
}

#[test]
fn cli_detect_from_facts() {
    let dir = workspace();
    let output = vessel(
        dir.path(),
        &["--json", "detect", "--fact", "kernel=Linux", "--fact", "os_id=fedora"],
    );
    assert!(output.status.success());
    let payload = json(&output);
    assert_eq!(payload["detected"], "fedora");
    assert_eq!(payload["chain"], serde_json::json!(["fedora", "redhat", "linux"]));
}

#[test]
fn cli_detect_failure_exits_three() {
    let dir = workspace();
    let output = vessel(dir.path(), &["detect", "--fact", "os_id=plan9"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_cap_reports_owner() {
    let dir = workspace();
    let output = vessel(dir.path(), &["--json", "cap", "guest", "ubuntu", "halt"]);
    assert!(output.status.success());
    assert_eq!(json(&output)["owner"], "linux");

    let output = vessel(dir.path(), &["cap", "host", "windows", "rsync_command"]);
    assert_eq!(output.status.code(), Some(1));

    let output = vessel(dir.path(), &["cap", "guest", "beos", "halt"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_bad_config_exits_two() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("vessel.toml"), "config_version = 9\n").unwrap();
    let output = vessel(dir.path(), &["status"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("config_version"));
}

#[test]
fn cli_plugins_json_lists_builtins() {
    let dir = tempfile::tempdir().unwrap();
    let output = vessel(dir.path(), &["--json", "plugins"]);
    assert!(output.status.success());
    let snapshot = json(&output);
    let guests = snapshot["categories"]["guest"].as_array().unwrap();
    assert!(guests.iter().any(|g| g["name"] == "ubuntu"));
}

#[test]
fn cli_unknown_machine_fails() {
    let dir = workspace();
    let output = vessel(dir.path(), &["up", "ghost"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown machine"));
}
