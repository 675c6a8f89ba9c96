use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

const PROFILE: &str = r#"
temperature_list = [40.0, 50.0]
stroke_positions = [10.0, 100.0, 200.0]
peak_force_duration_ms = 20
peak_force_interval_ms = 10

[stabilization]
robot_move_ms = 0
temperature_ms = 0
power_ms = 0
loadcell_zero_ms = 0

[mcu]
verify_interval_ms = 10

[pass_criteria]
min_stabilization_time_s = 0.0
spec_points = [[45.0, 100.0, 10.0, 0.0]]
"#;

// Mock rig with a "default" profile and one that fails validation.
fn write_rig(dir: &TempDir) -> PathBuf {
    let rig = r#"
[hardware.digital_io]
channels = 16
servo_brake_release = 3

[profiles]
dir = "profiles"
"#;
    let profiles = dir.path().join("profiles");
    fs::create_dir_all(&profiles).unwrap();
    fs::write(profiles.join("default.toml"), PROFILE).unwrap();
    fs::write(
        profiles.join("broken.toml"),
        format!("fan_speed = 11\nvoltage = 0.0\n{PROFILE}"),
    )
    .unwrap();
    let path = dir.path().join("rig.toml");
    fs::write(&path, rig).unwrap();
    path
}

fn eol(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("eol").unwrap();
    cmd.arg("--config").arg(cfg).arg("--log-level").arg("warn");
    cmd
}

#[rstest]
#[case::pass("default", "5.0", 0, "PASS")]
#[case::out_of_bounds("default", "50.0", 3, "FAIL")]
#[case::invalid_profile("broken", "5.0", 4, "NOT EVALUATED")]
fn run_exit_codes(
    #[case] profile: &str,
    #[case] force: &str,
    #[case] exit_code: i32,
    #[case] verdict: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_rig(&dir);

    eol(&cfg)
        .env("EOL_MOCK_FORCE", force)
        .args(["run", "--profile", profile, "--dut", "DUT-1", "--operator", "op"])
        .assert()
        .code(exit_code)
        .stdout(predicate::str::contains(verdict));
}

#[test]
fn failed_run_names_the_point() {
    let dir = tempdir().unwrap();
    let cfg = write_rig(&dir);

    eol(&cfg)
        .env("EOL_MOCK_FORCE", "50.0")
        .args(["run", "--dut", "DUT-1"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("out of bounds"));
}

#[test]
fn run_json_is_parseable() {
    let dir = tempdir().unwrap();
    let cfg = write_rig(&dir);

    let out = eol(&cfg)
        .env("EOL_MOCK_FORCE", "5.0")
        .args(["--json", "run", "--dut", "DUT-1"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(0));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["status"], "COMPLETED");
    assert_eq!(v["is_passed"], true);
    assert_eq!(v["measurements"].as_array().unwrap().len(), 6);
}

#[test]
fn unknown_profile_is_an_error() {
    let dir = tempdir().unwrap();
    let cfg = write_rig(&dir);

    eol(&cfg)
        .args(["run", "--profile", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nope"));
}

#[test]
fn health_json_lists_devices() {
    let dir = tempdir().unwrap();
    let cfg = write_rig(&dir);

    let out = eol(&cfg).args(["--json", "health"]).output().unwrap();
    assert_eq!(out.status.code(), Some(0));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["running"], false);
    assert_eq!(v["emergency_stop"], false);
    assert_eq!(v["hardware"]["robot"], true);
    assert_eq!(v["hardware"]["mcu"], true);
}

#[test]
fn self_check_reports_ok() {
    let dir = tempdir().unwrap();
    let cfg = write_rig(&dir);

    eol(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-check ok"));
}

#[test]
fn estop_stops_robot_and_power() {
    let dir = tempdir().unwrap();
    let cfg = write_rig(&dir);

    let out = eol(&cfg).args(["--json", "estop"]).output().unwrap();
    assert_eq!(out.status.code(), Some(0));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["robot_stopped"], true);
    assert_eq!(v["power_disabled"], true);
    assert_eq!(v["test_was_running"], false);
}

#[test]
fn missing_config_is_explained() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    eol(&missing)
        .arg("health")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could not be read"));
}

#[test]
fn invalid_rig_exits_with_validation_code() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rig.toml");
    fs::write(&path, "[hardware.mcu]\nretry_count = 0\n").unwrap();

    eol(&path)
        .arg("health")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("retry_count"));
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("eol")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-check").and(predicate::str::contains("estop")));
}
