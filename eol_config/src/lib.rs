#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the EOL rig.
//!
//! - `Config` is the rig file: which hardware to drive and how to log.
//! - `TestConfiguration` (with its `PassCriteria`) is one test profile,
//!   loaded from `<profiles dir>/<name>.toml` through `ProfileDir`.
//!
//! Validation never stops at the first problem: every violated field is
//! collected into one `ValidationErrors`.
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One violated field, e.g. `fan_speed: must be in 1..=10 (got 12)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Aggregate of every field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors {
    pub violations: Vec<FieldViolation>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Names of the violated fields, in the order they were checked.
    pub fn fields(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field.as_str()).collect()
    }

    fn require(&mut self, ok: bool, field: impl Into<String>, message: impl Into<String>) {
        if !ok {
            self.violations.push(FieldViolation {
                field: field.into(),
                message: message.into(),
            });
        }
    }

    fn absorb(&mut self, prefix: &str, other: Self) {
        self.violations
            .extend(other.violations.into_iter().map(|v| FieldViolation {
                field: format!("{prefix}.{}", v.field),
                message: v.message,
            }));
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration invalid ({} violation", self.len())?;
        if self.len() != 1 {
            f.write_str("s")?;
        }
        f.write_str(")")?;
        for (i, v) in self.violations.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Calibration tuple `[temperature, stroke, upper, lower]`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(from = "[f64; 4]")]
pub struct SpecPoint {
    pub temperature: f64,
    pub stroke: f64,
    pub upper: f64,
    pub lower: f64,
}

impl From<[f64; 4]> for SpecPoint {
    fn from([temperature, stroke, upper, lower]: [f64; 4]) -> Self {
        Self {
            temperature,
            stroke,
            upper,
            lower,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PassCriteria {
    pub force_limit_min: f64,
    pub force_limit_max: f64,
    pub temperature_limit_min: f64,
    pub temperature_limit_max: f64,
    /// Allowed spread of repeated readings around their mean. Band checks
    /// are strict and do not use it.
    pub measurement_tolerance: f64,
    pub position_tolerance: f64,
    /// Upper bound on the measurement phase, seconds.
    pub max_test_duration_s: f64,
    pub min_stabilization_time_s: f64,
    /// Sparse calibration scatter; order is irrelevant.
    pub spec_points: Vec<SpecPoint>,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            force_limit_min: 0.0,
            force_limit_max: 100.0,
            temperature_limit_min: -10.0,
            temperature_limit_max: 80.0,
            measurement_tolerance: 0.001,
            position_tolerance: 0.5,
            max_test_duration_s: 300.0,
            min_stabilization_time_s: 0.5,
            spec_points: Vec::new(),
        }
    }
}

impl PassCriteria {
    pub fn max_test_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_test_duration_s.max(0.0))
    }

    /// True when every reading lies within `measurement_tolerance` of the
    /// mean. Fewer than two readings are trivially stable.
    pub fn is_stable(&self, readings: &[f64]) -> bool {
        if readings.len() < 2 {
            return true;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = readings.iter().sum::<f64>() / readings.len() as f64;
        readings
            .iter()
            .all(|r| (r - mean).abs() <= self.measurement_tolerance)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = ValidationErrors::default();
        v.require(
            self.force_limit_min < self.force_limit_max,
            "force_limit_min",
            format!(
                "must be less than force_limit_max ({} >= {})",
                self.force_limit_min, self.force_limit_max
            ),
        );
        v.require(self.force_limit_min >= 0.0, "force_limit_min", "must be >= 0");
        v.require(
            self.temperature_limit_min < self.temperature_limit_max,
            "temperature_limit_min",
            format!(
                "must be less than temperature_limit_max ({} >= {})",
                self.temperature_limit_min, self.temperature_limit_max
            ),
        );
        v.require(
            self.measurement_tolerance > 0.0,
            "measurement_tolerance",
            "must be > 0",
        );
        v.require(
            self.position_tolerance > 0.0 && self.position_tolerance <= 100.0,
            "position_tolerance",
            "must be in (0, 100] mm",
        );
        v.require(
            self.max_test_duration_s > 0.0 && self.max_test_duration_s <= 3600.0,
            "max_test_duration_s",
            "must be in (0, 3600]",
        );
        v.require(
            (0.0..=60.0).contains(&self.min_stabilization_time_s),
            "min_stabilization_time_s",
            "must be in [0, 60]",
        );
        for (i, p) in self.spec_points.iter().enumerate() {
            v.require(
                (-100.0..=200.0).contains(&p.temperature),
                format!("spec_points[{i}].temperature"),
                format!("must be in [-100, 200] (got {})", p.temperature),
            );
            v.require(
                p.stroke >= 0.0,
                format!("spec_points[{i}].stroke"),
                "must be >= 0",
            );
            v.require(
                p.lower < p.upper,
                format!("spec_points[{i}].limits"),
                format!("lower ({}) must be less than upper ({})", p.lower, p.upper),
            );
            v.require(
                p.lower >= 0.0,
                format!("spec_points[{i}].lower"),
                "must be >= 0",
            );
        }
        v.into_result()
    }
}

/// Waits after each setup step, milliseconds.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Stabilization {
    /// After every robot move before reading force.
    pub robot_move_ms: u64,
    /// After a temperature setpoint has been confirmed.
    pub temperature_ms: u64,
    /// After each power supply setting.
    pub power_ms: u64,
    pub loadcell_zero_ms: u64,
}

impl Default for Stabilization {
    fn default() -> Self {
        Self {
            robot_move_ms: 100,
            temperature_ms: 100,
            power_ms: 500,
            loadcell_zero_ms: 100,
        }
    }
}

/// MCU command timing. The settle delays default to zero: the command
/// engine's timeout and retry handle slow answers.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct McuTiming {
    pub boot_timeout_ms: u64,
    pub test_mode_settle_ms: u64,
    pub upper_temperature_settle_ms: u64,
    pub fan_speed_settle_ms: u64,
    pub standby_heating_settle_ms: u64,
    pub operating_temperature_settle_ms: u64,
    pub standby_cooling_settle_ms: u64,
    /// LMA hold time sent with standby heating.
    pub hold_time_ms: u32,
    pub verify_attempts: u32,
    pub verify_interval_ms: u64,
}

impl Default for McuTiming {
    fn default() -> Self {
        Self {
            boot_timeout_ms: 30_000,
            test_mode_settle_ms: 0,
            upper_temperature_settle_ms: 0,
            fan_speed_settle_ms: 0,
            standby_heating_settle_ms: 0,
            operating_temperature_settle_ms: 0,
            standby_cooling_settle_ms: 0,
            hold_time_ms: 10_000,
            verify_attempts: 11,
            verify_interval_ms: 1000,
        }
    }
}

/// One test profile.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TestConfiguration {
    pub dut: Option<String>,
    pub operator_id: Option<String>,

    // Power supply
    pub voltage: f64,
    pub current: f64,
    pub current_limit: f64,
    pub max_voltage: f64,
    pub max_current: f64,

    // MCU
    pub upper_temperature: f64,
    pub fan_speed: u8,
    pub standby_temperature: f64,
    pub operating_temperature: f64,
    pub temperature_tolerance: f64,

    // Robot
    pub axis: u8,
    pub velocity: f64,
    pub acceleration: f64,
    pub deceleration: f64,
    pub initial_position: f64,
    pub max_stroke: f64,

    // Sequence
    pub temperature_list: Vec<f64>,
    pub stroke_positions: Vec<f64>,
    pub repeat_count: u32,
    pub retry_attempts: u32,
    pub timeout_seconds: u64,
    pub peak_force_duration_ms: u64,
    pub peak_force_interval_ms: u64,
    /// Integrate energy on the power analyzer across the measurement loop.
    pub power_integration: bool,

    pub stabilization: Stabilization,
    pub mcu: McuTiming,
    pub pass_criteria: PassCriteria,
}

impl Default for TestConfiguration {
    fn default() -> Self {
        Self {
            dut: None,
            operator_id: None,
            voltage: 18.0,
            current: 20.0,
            current_limit: 20.0,
            max_voltage: 30.0,
            max_current: 30.0,
            upper_temperature: 80.0,
            fan_speed: 10,
            standby_temperature: 38.0,
            operating_temperature: 60.0,
            temperature_tolerance: 3.0,
            axis: 0,
            velocity: 100.0,
            acceleration: 100.0,
            deceleration: 100.0,
            initial_position: 10.0,
            max_stroke: 240.0,
            temperature_list: (0..12).map(|i| 38.0 + 2.0 * f64::from(i)).collect(),
            stroke_positions: vec![10.0, 60.0, 100.0, 140.0, 180.0, 220.0, 240.0],
            repeat_count: 1,
            retry_attempts: 3,
            timeout_seconds: 60,
            peak_force_duration_ms: 1000,
            peak_force_interval_ms: 200,
            power_integration: false,
            stabilization: Stabilization::default(),
            mcu: McuTiming::default(),
            pass_criteria: PassCriteria::default(),
        }
    }
}

impl TestConfiguration {
    /// Number of (temperature, stroke) points per repeat.
    pub fn points_per_repeat(&self) -> usize {
        self.temperature_list.len() * self.stroke_positions.len()
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = ValidationErrors::default();
        let pc = &self.pass_criteria;

        v.require(self.voltage > 0.0, "voltage", "must be > 0");
        v.require(
            self.voltage < self.max_voltage,
            "voltage",
            format!("must be below max_voltage ({})", self.max_voltage),
        );
        v.require(self.current > 0.0, "current", "must be > 0");
        v.require(
            self.current < self.max_current,
            "current",
            format!("must be below max_current ({})", self.max_current),
        );
        v.require(
            self.current_limit > 0.0 && self.current_limit <= self.max_current,
            "current_limit",
            format!("must be in (0, {}]", self.max_current),
        );

        v.require(self.upper_temperature > 0.0, "upper_temperature", "must be > 0");
        v.require(
            (1..=10).contains(&self.fan_speed),
            "fan_speed",
            format!("must be in 1..=10 (got {})", self.fan_speed),
        );
        for (field, t) in [
            ("standby_temperature", self.standby_temperature),
            ("operating_temperature", self.operating_temperature),
        ] {
            v.require(
                t <= self.upper_temperature,
                field,
                format!("must not exceed upper_temperature ({})", self.upper_temperature),
            );
            v.require(
                (pc.temperature_limit_min..=pc.temperature_limit_max).contains(&t),
                field,
                format!(
                    "must be within pass_criteria temperature limits [{}, {}]",
                    pc.temperature_limit_min, pc.temperature_limit_max
                ),
            );
        }
        v.require(
            self.temperature_tolerance > 0.0,
            "temperature_tolerance",
            "must be > 0",
        );

        for (field, x) in [
            ("velocity", self.velocity),
            ("acceleration", self.acceleration),
            ("deceleration", self.deceleration),
        ] {
            v.require(x > 0.0, field, "must be > 0");
        }
        v.require(self.max_stroke > 0.0, "max_stroke", "must be > 0");
        v.require(
            (0.0..=self.max_stroke).contains(&self.initial_position),
            "initial_position",
            format!("must be in [0, {}]", self.max_stroke),
        );

        v.require(
            !self.temperature_list.is_empty(),
            "temperature_list",
            "must not be empty",
        );
        for (i, t) in self.temperature_list.iter().enumerate() {
            v.require(
                *t <= self.upper_temperature
                    && (pc.temperature_limit_min..=pc.temperature_limit_max).contains(t),
                format!("temperature_list[{i}]"),
                format!(
                    "{t} is outside [{}, {}]",
                    pc.temperature_limit_min,
                    pc.temperature_limit_max.min(self.upper_temperature)
                ),
            );
        }
        v.require(
            !self.stroke_positions.is_empty(),
            "stroke_positions",
            "must not be empty",
        );
        for (i, s) in self.stroke_positions.iter().enumerate() {
            v.require(
                (0.0..=self.max_stroke).contains(s),
                format!("stroke_positions[{i}]"),
                format!("{s} is outside [0, {}]", self.max_stroke),
            );
        }

        v.require(self.repeat_count >= 1, "repeat_count", "must be >= 1");
        v.require(self.retry_attempts >= 1, "retry_attempts", "must be >= 1");
        v.require(self.timeout_seconds > 0, "timeout_seconds", "must be > 0");
        v.require(
            self.peak_force_duration_ms > 0,
            "peak_force_duration_ms",
            "must be > 0",
        );
        v.require(
            self.peak_force_interval_ms > 0
                && self.peak_force_interval_ms <= self.peak_force_duration_ms,
            "peak_force_interval_ms",
            "must be in (0, peak_force_duration_ms]",
        );
        v.require(
            self.mcu.boot_timeout_ms > 0,
            "mcu.boot_timeout_ms",
            "must be > 0",
        );
        v.require(
            self.mcu.verify_attempts >= 1,
            "mcu.verify_attempts",
            "must be >= 1",
        );

        if let Err(e) = pc.validate() {
            v.absorb("pass_criteria", e);
        }
        v.into_result()
    }

    pub fn peak_window(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.peak_force_duration_ms),
            Duration::from_millis(self.peak_force_interval_ms),
        )
    }
}

pub fn load_profile(s: &str) -> Result<TestConfiguration, toml::de::Error> {
    toml::from_str::<TestConfiguration>(s)
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Mock,
    Real,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RobotCfg {
    pub kind: DeviceKind,
    /// AXL board interrupt line.
    pub irq: u8,
    pub poll_ms: u64,
    pub motion_timeout_ms: u64,
    pub home_timeout_ms: u64,
}

impl Default for RobotCfg {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Mock,
            irq: 7,
            poll_ms: 100,
            motion_timeout_ms: 30_000,
            home_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct McuCfg {
    pub kind: DeviceKind,
    pub port: String,
    pub baud_rate: u32,
    pub response_timeout_ms: u64,
    /// Wait for the delayed "temperature reached" status.
    pub terminal_timeout_ms: u64,
    /// Total attempts per command.
    pub retry_count: u32,
}

impl Default for McuCfg {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Mock,
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            response_timeout_ms: 5_000,
            terminal_timeout_ms: 120_000,
            retry_count: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoadCellCfg {
    pub kind: DeviceKind,
    pub port: String,
    pub baud_rate: u32,
    pub indicator_id: u8,
    pub response_timeout_ms: u64,
}

impl Default for LoadCellCfg {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Mock,
            port: "/dev/ttyUSB1".into(),
            baud_rate: 9_600,
            indicator_id: 1,
            response_timeout_ms: 3_000,
        }
    }
}

/// A SCPI instrument on the rig network.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ScpiCfg {
    pub kind: DeviceKind,
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    /// Output channel (supply) or input element (analyzer).
    pub channel: u8,
}

impl Default for ScpiCfg {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Mock,
            host: "127.0.0.1".into(),
            port: 5025,
            timeout_ms: 5_000,
            channel: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DigitalIoCfg {
    pub kind: DeviceKind,
    pub irq: u8,
    /// Channel count of the mock board.
    pub channels: u16,
    /// Output that releases the servo brake; `None` when the axis has no brake.
    pub servo_brake_release: Option<u16>,
}

impl Default for DigitalIoCfg {
    fn default() -> Self {
        Self {
            kind: DeviceKind::Mock,
            irq: 7,
            channels: 32,
            servo_brake_release: Some(0),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct HardwareConfig {
    pub robot: RobotCfg,
    pub mcu: McuCfg,
    pub loadcell: LoadCellCfg,
    pub power_supply: ScpiCfg,
    pub power_analyzer: ScpiCfg,
    pub digital_io: DigitalIoCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Profiles {
    /// Relative paths resolve against the rig file's directory.
    pub dir: PathBuf,
}

impl Default for Profiles {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("profiles"),
        }
    }
}

/// Rig file.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub hardware: HardwareConfig,
    pub logging: Logging,
    pub profiles: Profiles,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    /// Read, parse and validate a rig file; the profile directory is
    /// resolved against the file's location.
    pub fn load_file(path: &Path) -> eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
        let mut cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
        if cfg.profiles.dir.is_relative()
            && let Some(parent) = path.parent()
        {
            cfg.profiles.dir = parent.join(&cfg.profiles.dir);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn profile_dir(&self) -> ProfileDir {
        ProfileDir::new(&self.profiles.dir)
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut v = ValidationErrors::default();
        let hw = &self.hardware;

        v.require(hw.mcu.baud_rate > 0, "hardware.mcu.baud_rate", "must be > 0");
        v.require(
            hw.mcu.response_timeout_ms > 0,
            "hardware.mcu.response_timeout_ms",
            "must be > 0",
        );
        v.require(
            hw.mcu.terminal_timeout_ms >= hw.mcu.response_timeout_ms,
            "hardware.mcu.terminal_timeout_ms",
            "must be >= response_timeout_ms",
        );
        v.require(
            hw.mcu.retry_count >= 1,
            "hardware.mcu.retry_count",
            "must be >= 1",
        );
        if hw.mcu.kind == DeviceKind::Real {
            v.require(!hw.mcu.port.is_empty(), "hardware.mcu.port", "must be set");
        }

        v.require(
            hw.loadcell.baud_rate > 0,
            "hardware.loadcell.baud_rate",
            "must be > 0",
        );
        v.require(
            hw.loadcell.indicator_id <= 9,
            "hardware.loadcell.indicator_id",
            "must be in 0..=9",
        );
        if hw.loadcell.kind == DeviceKind::Real {
            v.require(
                !hw.loadcell.port.is_empty(),
                "hardware.loadcell.port",
                "must be set",
            );
        }

        for (name, scpi) in [
            ("power_supply", &hw.power_supply),
            ("power_analyzer", &hw.power_analyzer),
        ] {
            v.require(
                scpi.timeout_ms > 0,
                format!("hardware.{name}.timeout_ms"),
                "must be > 0",
            );
            if scpi.kind == DeviceKind::Real {
                v.require(
                    !scpi.host.is_empty(),
                    format!("hardware.{name}.host"),
                    "must be set",
                );
                v.require(scpi.port > 0, format!("hardware.{name}.port"), "must be > 0");
            }
        }

        v.require(
            hw.robot.poll_ms > 0,
            "hardware.robot.poll_ms",
            "must be > 0",
        );
        v.require(
            hw.robot.motion_timeout_ms > 0,
            "hardware.robot.motion_timeout_ms",
            "must be > 0",
        );
        v.require(
            hw.digital_io.channels > 0,
            "hardware.digital_io.channels",
            "must be > 0",
        );
        if let Some(ch) = hw.digital_io.servo_brake_release {
            v.require(
                ch < hw.digital_io.channels,
                "hardware.digital_io.servo_brake_release",
                format!("channel {ch} is outside 0..{}", hw.digital_io.channels),
            );
        }

        if let Some(rotation) = self.logging.rotation.as_deref() {
            v.require(
                matches!(rotation, "never" | "daily" | "hourly"),
                "logging.rotation",
                format!("must be never, daily or hourly (got {rotation:?})"),
            );
        }
        v.into_result()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid profile name {0:?}")]
    InvalidName(String),
    #[error("profile {name:?} not found at {path:?}")]
    NotFound { name: String, path: PathBuf },
    #[error("read profile {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse profile {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Profiles stored as `<dir>/<name>.toml`.
#[derive(Debug, Clone)]
pub struct ProfileDir {
    dir: PathBuf,
}

impl ProfileDir {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> Result<PathBuf, ProfileError> {
        let plain = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !name.starts_with('.');
        if !plain {
            return Err(ProfileError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.toml")))
    }

    /// Parse a profile. Validation is left to the caller so it can report
    /// every violation at once.
    pub fn load(&self, name: &str) -> Result<TestConfiguration, ProfileError> {
        let path = self.path_of(name)?;
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProfileError::NotFound {
                    name: name.to_string(),
                    path,
                });
            }
            Err(source) => return Err(ProfileError::Io { path, source }),
        };
        load_profile(&text).map_err(|source| ProfileError::Parse { path, source })
    }

    /// Profile names present in the directory, sorted.
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| ProfileError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|x| x == "toml"))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}
