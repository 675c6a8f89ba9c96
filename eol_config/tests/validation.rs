use eol_config::{DeviceKind, ProfileDir, ProfileError, SpecPoint, load_profile, load_toml};
use rstest::rstest;

#[test]
fn empty_profile_takes_rig_defaults() {
    let cfg = load_profile("").expect("parse TOML");
    assert_eq!(cfg.voltage, 18.0);
    assert_eq!(cfg.fan_speed, 10);
    assert_eq!(cfg.stroke_positions, vec![10.0, 60.0, 100.0, 140.0, 180.0, 220.0, 240.0]);
    assert_eq!(cfg.mcu.hold_time_ms, 10_000);
    assert_eq!(cfg.mcu.test_mode_settle_ms, 0);
    assert_eq!(cfg.pass_criteria.max_test_duration_s, 300.0);
    assert!(!cfg.power_integration);
    cfg.validate().expect("defaults are valid");
}

#[test]
fn spec_points_parse_from_arrays() {
    let toml = r#"
operating_temperature = 52.0
temperature_list = [38.0, 52.0]
stroke_positions = [10.0, 240.0]

[pass_criteria]
force_limit_max = 150.0
spec_points = [
    [38.0, 10.0, 60.0, 20.0],
    [52.0, 240.0, 90.0, 40.0],
]
"#;
    let cfg = load_profile(toml).expect("parse TOML");
    assert_eq!(
        cfg.pass_criteria.spec_points[1],
        SpecPoint {
            temperature: 52.0,
            stroke: 240.0,
            upper: 90.0,
            lower: 40.0
        }
    );
    cfg.validate().expect("valid profile should pass");
}

#[test]
fn every_violation_is_reported_at_once() {
    let toml = r#"
voltage = 40.0
fan_speed = 0
temperature_list = []
stroke_positions = [10.0, 300.0]

[pass_criteria]
force_limit_min = 50.0
force_limit_max = 10.0
spec_points = [[30.0, 0.0, 5.0, 10.0]]
"#;
    let cfg = load_profile(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    let fields = err.fields();
    for expected in [
        "voltage",
        "fan_speed",
        "temperature_list",
        "stroke_positions[1]",
        "pass_criteria.force_limit_min",
        "pass_criteria.spec_points[0].limits",
    ] {
        assert!(fields.contains(&expected), "missing {expected} in {fields:?}");
    }
    assert!(err.len() >= 6);
    let msg = err.to_string();
    assert!(msg.starts_with("configuration invalid ("), "{msg}");
    assert!(msg.contains("fan_speed: must be in 1..=10 (got 0)"), "{msg}");
}

#[rstest]
#[case("max_test_duration_s = 0.0", "pass_criteria.max_test_duration_s")]
#[case("max_test_duration_s = 3601.0", "pass_criteria.max_test_duration_s")]
#[case("measurement_tolerance = 0.0", "pass_criteria.measurement_tolerance")]
#[case("temperature_limit_min = 90.0", "pass_criteria.temperature_limit_min")]
#[case("spec_points = [[250.0, 0.0, 10.0, 0.0]]", "pass_criteria.spec_points[0].temperature")]
#[case("spec_points = [[30.0, -1.0, 10.0, 0.0]]", "pass_criteria.spec_points[0].stroke")]
#[case("spec_points = [[30.0, 0.0, 10.0, -2.0]]", "pass_criteria.spec_points[0].lower")]
fn pass_criteria_rules(#[case] line: &str, #[case] field: &str) {
    let cfg = load_profile(&format!("[pass_criteria]\n{line}\n")).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(err.fields().contains(&field), "{field} not in {err}");
}

#[rstest]
#[case::single(&[12.0], true)]
#[case::inside_spread(&[10.0, 10.4, 9.6], true)]
#[case::one_outlier(&[10.0, 10.0, 11.5], false)]
fn repeated_readings_are_stable_within_tolerance(#[case] readings: &[f64], #[case] stable: bool) {
    let cfg = load_profile("[pass_criteria]\nmeasurement_tolerance = 0.5\n").expect("parse TOML");
    assert_eq!(cfg.pass_criteria.is_stable(readings), stable);
}

#[test]
fn temperatures_outside_pass_criteria_are_rejected() {
    let toml = r#"
upper_temperature = 120.0
operating_temperature = 95.0
temperature_list = [40.0, 95.0]
"#;
    let err = load_profile(toml).unwrap().validate().expect_err("should reject");
    let fields = err.fields();
    assert!(fields.contains(&"operating_temperature"), "{err}");
    assert!(fields.contains(&"temperature_list[1]"), "{err}");
    assert!(!fields.contains(&"temperature_list[0]"), "{err}");
}

#[test]
fn rig_file_selects_device_kinds() {
    let toml = r#"
[hardware.mcu]
kind = "real"
port = "/dev/ttyACM0"
baud_rate = 115200

[hardware.power_supply]
kind = "real"
host = "10.0.0.5"
port = 5025

[hardware.digital_io]
servo_brake_release = 3

[logging]
level = "debug"
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    assert_eq!(cfg.hardware.mcu.kind, DeviceKind::Real);
    assert_eq!(cfg.hardware.loadcell.kind, DeviceKind::Mock);
    assert_eq!(cfg.hardware.digital_io.servo_brake_release, Some(3));
    cfg.validate().expect("valid rig file");
}

#[test]
fn rig_file_rejects_bad_rotation_and_brake_channel() {
    let toml = r#"
[hardware.digital_io]
channels = 8
servo_brake_release = 8

[logging]
rotation = "weekly"
"#;
    let err = load_toml(toml).unwrap().validate().expect_err("should reject");
    assert_eq!(
        err.fields(),
        vec!["hardware.digital_io.servo_brake_release", "logging.rotation"]
    );
}

#[test]
fn profile_dir_loads_by_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("short.toml"), "repeat_count = 2\n").unwrap();
    std::fs::write(dir.path().join("broken.toml"), "repeat_count = \"two\"\n").unwrap();
    let profiles = ProfileDir::new(dir.path());

    assert_eq!(profiles.load("short").unwrap().repeat_count, 2);
    assert_eq!(profiles.list().unwrap(), vec!["broken", "short"]);
    match profiles.load("missing") {
        Err(ProfileError::NotFound { name, .. }) => assert_eq!(name, "missing"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    match profiles.load("broken") {
        Err(ProfileError::Parse { .. }) => {}
        other => panic!("expected Parse, got {other:?}"),
    }
}

#[test]
fn rig_file_resolves_profiles_next_to_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rig.toml");
    std::fs::write(&path, "[profiles]\ndir = \"profiles\"\n").unwrap();
    let cfg = eol_config::Config::load_file(&path).unwrap();
    assert_eq!(cfg.profile_dir().dir(), dir.path().join("profiles"));
}

#[test]
fn shipped_rig_and_profile_are_valid() {
    let etc = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../etc");
    let cfg = eol_config::Config::load_file(&etc.join("eol_config.toml")).expect("rig file");
    assert_eq!(cfg.hardware.mcu.kind, DeviceKind::Mock);
    let profile = cfg.profile_dir().load("default").expect("default profile");
    profile.validate().expect("default profile is valid");
    assert_eq!(profile.pass_criteria.spec_points.len(), 4);
}
