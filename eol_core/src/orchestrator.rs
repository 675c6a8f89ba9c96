//! Hardware orchestration: the fixed device sequences a test runs through.
//!
//! The orchestrator owns one handle per device role and knows the order in
//! which they must be driven (power rails before servo, MCU boot before any
//! temperature command, and so on). It never decides pass/fail; it produces
//! measurements and surfaces device faults as `EolError`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eol_config::TestConfiguration;
use eol_traits::{
    Device, DeviceResult, DigitalIo, IntegrationValues, LoadCell, Mcu, MotionProfile, PowerAnalyzer,
    PowerSupply, Robot, StandbyHeating, TestMode,
};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{BuildError, EolError, Result};
use crate::estop::EmergencyLatch;
use crate::hw_error::map_hw_error;
use crate::measurement::{Measurement, MeasurementSet};

/// Last known robot location, tracked so homing can be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotState {
    Unknown,
    Moving,
    Home,
    InitialPosition,
    MaxStroke,
    MeasurementPosition,
}

/// Cloneable set of device handles.
#[derive(Clone)]
pub struct DeviceHandles {
    pub robot: Arc<dyn Robot>,
    pub mcu: Arc<dyn Mcu>,
    pub loadcell: Arc<dyn LoadCell>,
    pub power: Arc<dyn PowerSupply>,
    pub digital_io: Arc<dyn DigitalIo>,
    pub power_analyzer: Option<Arc<dyn PowerAnalyzer>>,
}

impl std::fmt::Debug for DeviceHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandles")
            .field("robot", &self.robot.name())
            .field("mcu", &self.mcu.name())
            .field("loadcell", &self.loadcell.name())
            .field("power", &self.power.name())
            .field("digital_io", &self.digital_io.name())
            .field(
                "power_analyzer",
                &self.power_analyzer.as_ref().map(|a| a.name()),
            )
            .finish()
    }
}

/// Outcome of a best-effort shutdown. Failures are listed, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, step: &str, r: std::result::Result<(), EolError>) {
        match r {
            Ok(()) => self.completed.push(step.to_string()),
            Err(e) => {
                tracing::warn!(step, error = %e, "shutdown step failed");
                self.failed.push(format!("{step}: {e}"));
            }
        }
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct OrchestratorBuilder {
    robot: Option<Arc<dyn Robot>>,
    mcu: Option<Arc<dyn Mcu>>,
    loadcell: Option<Arc<dyn LoadCell>>,
    power: Option<Arc<dyn PowerSupply>>,
    digital_io: Option<Arc<dyn DigitalIo>>,
    power_analyzer: Option<Arc<dyn PowerAnalyzer>>,
    brake_release: Option<u16>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn robot(mut self, robot: Arc<dyn Robot>) -> Self {
        self.robot = Some(robot);
        self
    }

    #[must_use]
    pub fn mcu(mut self, mcu: Arc<dyn Mcu>) -> Self {
        self.mcu = Some(mcu);
        self
    }

    #[must_use]
    pub fn loadcell(mut self, loadcell: Arc<dyn LoadCell>) -> Self {
        self.loadcell = Some(loadcell);
        self
    }

    #[must_use]
    pub fn power(mut self, power: Arc<dyn PowerSupply>) -> Self {
        self.power = Some(power);
        self
    }

    #[must_use]
    pub fn digital_io(mut self, dio: Arc<dyn DigitalIo>) -> Self {
        self.digital_io = Some(dio);
        self
    }

    /// Optional; required only when a profile asks for power integration.
    #[must_use]
    pub fn power_analyzer(mut self, analyzer: Arc<dyn PowerAnalyzer>) -> Self {
        self.power_analyzer = Some(analyzer);
        self
    }

    /// Digital output that releases the servo brake, driven high before the
    /// servo is enabled.
    #[must_use]
    pub const fn brake_release_channel(mut self, channel: Option<u16>) -> Self {
        self.brake_release = channel;
        self
    }

    pub fn build(self) -> Result<HardwareOrchestrator> {
        let missing = |name| eyre::Report::new(BuildError::MissingDevice(name));
        let handles = DeviceHandles {
            robot: self.robot.ok_or_else(|| missing("robot"))?,
            mcu: self.mcu.ok_or_else(|| missing("mcu"))?,
            loadcell: self.loadcell.ok_or_else(|| missing("loadcell"))?,
            power: self.power.ok_or_else(|| missing("power supply"))?,
            digital_io: self.digital_io.ok_or_else(|| missing("digital io"))?,
            power_analyzer: self.power_analyzer,
        };
        Ok(HardwareOrchestrator {
            hw: handles,
            brake_release: self.brake_release,
            latch: EmergencyLatch::default(),
            robot_state: Mutex::new(RobotState::Unknown),
            homed: AtomicBool::new(false),
        })
    }
}

// ── Orchestrator ────────────────────────────────────────────────────────────

pub struct HardwareOrchestrator {
    hw: DeviceHandles,
    brake_release: Option<u16>,
    latch: EmergencyLatch,
    robot_state: Mutex<RobotState>,
    homed: AtomicBool,
}

impl std::fmt::Debug for HardwareOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareOrchestrator")
            .field("hw", &self.hw)
            .field("robot_state", &self.robot_state())
            .field("estop", &self.latch.is_active())
            .finish_non_exhaustive()
    }
}

fn hw<T>(device: &str, operation: &str, r: DeviceResult<T>) -> std::result::Result<T, EolError> {
    r.map_err(|e| map_hw_error(device, operation, e.as_ref()))
}

async fn settle(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

async fn connect_one<D: Device + ?Sized>(device: &D) -> std::result::Result<(), EolError> {
    if device.is_connected() {
        return Ok(());
    }
    device.connect().await.map_err(|e| EolError::HardwareConnection {
        device: device.name().to_string(),
        reason: e.to_string(),
    })?;
    tracing::info!(device = device.name(), "connected");
    Ok(())
}

async fn disconnect_one<D: Device + ?Sized>(device: &D) -> std::result::Result<(), EolError> {
    if !device.is_connected() {
        return Ok(());
    }
    hw(device.name(), "disconnect", device.disconnect().await)
}

/// Dwell after a verified temperature: the stabilization delay, never
/// shorter than the pass criteria's minimum.
fn temperature_settle_ms(cfg: &TestConfiguration) -> u64 {
    let floor = Duration::try_from_secs_f64(cfg.pass_criteria.min_stabilization_time_s)
        .unwrap_or_default();
    let floor_ms = u64::try_from(floor.as_millis()).unwrap_or(u64::MAX);
    cfg.stabilization.temperature_ms.max(floor_ms)
}

fn profile(cfg: &TestConfiguration) -> MotionProfile {
    MotionProfile {
        velocity: cfg.velocity,
        acceleration: cfg.acceleration,
        deceleration: cfg.deceleration,
    }
}

impl HardwareOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn handles(&self) -> DeviceHandles {
        self.hw.clone()
    }

    pub fn latch(&self) -> EmergencyLatch {
        self.latch.clone()
    }

    pub fn robot_state(&self) -> RobotState {
        *self.robot_state.lock()
    }

    pub fn has_power_analyzer(&self) -> bool {
        self.hw.power_analyzer.is_some()
    }

    fn set_state(&self, s: RobotState) {
        *self.robot_state.lock() = s;
    }

    fn guard(&self) -> std::result::Result<(), EolError> {
        if self.latch.is_active() {
            Err(EolError::EmergencyStop)
        } else {
            Ok(())
        }
    }

    /// Connect every device that is not already connected. All devices are
    /// attempted; failures are combined into one connection error and the
    /// devices that did connect stay connected.
    pub async fn connect_all(&self) -> std::result::Result<(), EolError> {
        let h = &self.hw;
        let (robot, mcu, loadcell, power, dio) = tokio::join!(
            connect_one(&*h.robot),
            connect_one(&*h.mcu),
            connect_one(&*h.loadcell),
            connect_one(&*h.power),
            connect_one(&*h.digital_io),
        );
        let analyzer = match &h.power_analyzer {
            Some(a) => connect_one(&**a).await,
            None => Ok(()),
        };

        let failures: Vec<EolError> = [robot, mcu, loadcell, power, dio, analyzer]
            .into_iter()
            .filter_map(std::result::Result::err)
            .collect();
        match failures.as_slice() {
            [] => Ok(()),
            [one] => Err(one.clone()),
            many => {
                let devices: Vec<String> = many
                    .iter()
                    .map(|e| match e {
                        EolError::HardwareConnection { device, .. } => device.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                Err(EolError::HardwareConnection {
                    device: devices.join(", "),
                    reason: many
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; "),
                })
            }
        }
    }

    /// Device name to connected flag.
    pub fn hardware_status(&self) -> BTreeMap<String, bool> {
        let h = &self.hw;
        let mut out = BTreeMap::new();
        out.insert(h.robot.name().to_string(), h.robot.is_connected());
        out.insert(h.mcu.name().to_string(), h.mcu.is_connected());
        out.insert(h.loadcell.name().to_string(), h.loadcell.is_connected());
        out.insert(h.power.name().to_string(), h.power.is_connected());
        out.insert(h.digital_io.name().to_string(), h.digital_io.is_connected());
        if let Some(a) = &h.power_analyzer {
            out.insert(a.name().to_string(), a.is_connected());
        }
        out
    }

    /// Bring power rails and robot into a known state: output off with
    /// limits programmed, servo on, axis homed and parked at the initial
    /// position, load cell zeroed.
    pub async fn initialize_hardware(&self, cfg: &TestConfiguration) -> std::result::Result<(), EolError> {
        self.guard()?;
        let power_ms = cfg.stabilization.power_ms;

        if let Some(ch) = self.brake_release {
            hw("digital_io", "write_output", self.hw.digital_io.write_output(ch, true).await)?;
            tracing::debug!(channel = ch, "servo brake released");
        }

        let power = &self.hw.power;
        hw("power_supply", "disable_output", power.disable_output().await)?;
        settle(power_ms).await;
        hw("power_supply", "set_voltage", power.set_voltage(cfg.voltage).await)?;
        settle(power_ms).await;
        hw("power_supply", "set_current", power.set_current(cfg.current).await)?;
        settle(power_ms).await;
        hw(
            "power_supply",
            "set_current_limit",
            power.set_current_limit(cfg.current_limit).await,
        )?;
        settle(power_ms).await;
        tracing::info!(
            voltage = cfg.voltage,
            current = cfg.current,
            current_limit = cfg.current_limit,
            "power supply programmed"
        );

        hw("robot", "enable_servo", self.hw.robot.enable_servo(cfg.axis).await)?;
        self.ensure_homed(cfg.axis).await?;
        self.move_to(cfg, cfg.initial_position, RobotState::InitialPosition)
            .await?;

        hw("loadcell", "zero", self.hw.loadcell.zero().await)?;
        settle(cfg.stabilization.loadcell_zero_ms).await;
        tracing::info!("hardware initialized");
        Ok(())
    }

    async fn ensure_homed(&self, axis: u8) -> std::result::Result<(), EolError> {
        if self.homed.load(Ordering::Acquire) && self.robot_state() == RobotState::Home {
            tracing::debug!(axis, "already homed");
            return Ok(());
        }
        self.set_state(RobotState::Moving);
        let r = hw("robot", "home_axis", self.hw.robot.home_axis(axis).await);
        match r {
            Ok(()) => {
                self.homed.store(true, Ordering::Release);
                self.set_state(RobotState::Home);
                tracing::info!(axis, "axis homed");
                Ok(())
            }
            Err(e) => {
                self.set_state(RobotState::Unknown);
                Err(e)
            }
        }
    }

    async fn move_to(
        &self,
        cfg: &TestConfiguration,
        position: f64,
        arrived: RobotState,
    ) -> std::result::Result<(), EolError> {
        self.guard()?;
        self.set_state(RobotState::Moving);
        let r = hw(
            "robot",
            "move_absolute",
            self.hw
                .robot
                .move_absolute(cfg.axis, position, profile(cfg))
                .await,
        );
        if let Err(e) = r {
            self.set_state(RobotState::Unknown);
            return Err(e);
        }
        let actual = hw("robot", "position", self.hw.robot.position(cfg.axis).await)?;
        let tolerance = cfg.pass_criteria.position_tolerance;
        if (actual - position).abs() > tolerance {
            self.set_state(RobotState::Unknown);
            return Err(EolError::operation(
                "robot",
                "move_absolute",
                format!("arrived at {actual:.3}, target {position:.3} (tolerance {tolerance})"),
            ));
        }
        self.set_state(arrived);
        settle(cfg.stabilization.robot_move_ms).await;
        tracing::debug!(position, state = ?arrived, "robot arrived");
        Ok(())
    }

    /// Power the DUT, wait for MCU boot, program its thermal behaviour and
    /// run one full stroke with the temperature verified at both ends of the
    /// heat/cool cycle.
    pub async fn setup_test(&self, cfg: &TestConfiguration) -> std::result::Result<(), EolError> {
        self.guard()?;
        let t = &cfg.mcu;
        let mcu = &self.hw.mcu;

        hw("power_supply", "enable_output", self.hw.power.enable_output().await)?;
        settle(cfg.stabilization.power_ms).await;

        hw(
            "mcu",
            "wait_boot_complete",
            mcu.wait_boot_complete(Duration::from_millis(t.boot_timeout_ms)).await,
        )?;
        tracing::info!("mcu boot complete");

        hw("mcu", "set_test_mode", mcu.set_test_mode(TestMode::Mode1).await)?;
        settle(t.test_mode_settle_ms).await;
        hw(
            "mcu",
            "set_upper_temperature",
            mcu.set_upper_temperature(cfg.upper_temperature).await,
        )?;
        settle(t.upper_temperature_settle_ms).await;
        hw("mcu", "set_fan_speed", mcu.set_fan_speed(cfg.fan_speed).await)?;
        settle(t.fan_speed_settle_ms).await;

        let heating = StandbyHeating {
            operating_temperature: cfg.operating_temperature,
            standby_temperature: cfg.standby_temperature,
            hold_time_ms: t.hold_time_ms,
        };
        hw("mcu", "start_standby_heating", mcu.start_standby_heating(heating).await)?;
        settle(t.standby_heating_settle_ms).await;
        self.verify_temperature(cfg.operating_temperature, cfg).await?;

        self.guard()?;
        self.move_to(cfg, cfg.max_stroke, RobotState::MaxStroke).await?;
        self.move_to(cfg, cfg.initial_position, RobotState::InitialPosition)
            .await?;

        hw("mcu", "start_standby_cooling", mcu.start_standby_cooling().await)?;
        settle(t.standby_cooling_settle_ms).await;
        self.verify_temperature(cfg.standby_temperature, cfg).await?;

        tracing::info!("test setup complete");
        Ok(())
    }

    /// `initialize_hardware` followed by `setup_test`.
    pub async fn initialize(&self, cfg: &TestConfiguration) -> std::result::Result<(), EolError> {
        self.initialize_hardware(cfg).await?;
        self.setup_test(cfg).await
    }

    /// Poll the MCU until it reads within `temperature_tolerance` of
    /// `expected`. Returns the accepted reading.
    pub async fn verify_temperature(
        &self,
        expected: f64,
        cfg: &TestConfiguration,
    ) -> std::result::Result<f64, EolError> {
        let attempts = cfg.mcu.verify_attempts.max(1);
        let interval = Duration::from_millis(cfg.mcu.verify_interval_ms);
        let tolerance = cfg.temperature_tolerance;
        let mut last = f64::NAN;
        for attempt in 1..=attempts {
            self.guard()?;
            last = hw("mcu", "temperature", self.hw.mcu.temperature().await)?;
            if (last - expected).abs() <= tolerance {
                tracing::info!(expected, actual = last, attempt, "temperature verified");
                return Ok(last);
            }
            tracing::debug!(expected, actual = last, attempt, "temperature not yet in band");
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(EolError::operation(
            "mcu",
            "verify_temperature",
            format!(
                "expected {expected:.1}°C ±{tolerance}, last read {last:.1}°C after {attempts} reads"
            ),
        ))
    }

    /// Sweep repeats × temperatures × strokes, appending one peak-force
    /// measurement per point to `sink`. Points already appended survive an
    /// error.
    pub async fn perform_measurement_sequence(
        &self,
        cfg: &TestConfiguration,
        sink: &mut MeasurementSet,
    ) -> std::result::Result<(), EolError> {
        let (duration, interval) = cfg.peak_window();
        let mcu = &self.hw.mcu;
        for repeat in 0..cfg.repeat_count {
            tracing::info!(repeat, of = cfg.repeat_count, "measurement repeat");
            for &temperature in &cfg.temperature_list {
                self.guard()?;
                hw(
                    "mcu",
                    "set_operating_temperature",
                    mcu.set_operating_temperature(temperature).await,
                )?;
                settle(cfg.mcu.operating_temperature_settle_ms).await;
                self.verify_temperature(temperature, cfg).await?;
                settle(temperature_settle_ms(cfg)).await;

                for &stroke in &cfg.stroke_positions {
                    self.guard()?;
                    self.move_to(cfg, stroke, RobotState::MeasurementPosition)
                        .await?;
                    let force = self.read_peak(cfg, duration, interval).await?;
                    sink.push(Measurement {
                        temperature,
                        stroke,
                        force,
                        repeat,
                    });
                    tracing::info!(temperature, stroke, force, repeat, "measured");
                }

                self.move_to(cfg, cfg.initial_position, RobotState::InitialPosition)
                    .await?;
                hw("mcu", "start_standby_cooling", mcu.start_standby_cooling().await)?;
                settle(cfg.mcu.standby_cooling_settle_ms).await;
                self.verify_temperature(cfg.standby_temperature, cfg).await?;
            }
        }
        tracing::info!(points = sink.len(), "measurement sequence complete");
        Ok(())
    }

    /// Peak force over the window, retrying timeouts and framing errors up
    /// to `retry_attempts` reads in total.
    async fn read_peak(
        &self,
        cfg: &TestConfiguration,
        duration: Duration,
        interval: Duration,
    ) -> std::result::Result<f64, EolError> {
        let attempts = cfg.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            let r = hw(
                "loadcell",
                "read_peak_force",
                self.hw.loadcell.read_peak_force(duration, interval).await,
            );
            match r {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "peak force read failed; retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Reset and start energy integration, timed to `timer`.
    pub async fn start_power_integration(&self, timer: Duration) -> std::result::Result<(), EolError> {
        let Some(a) = &self.hw.power_analyzer else {
            return Err(EolError::Configuration(
                "power integration requested but no power analyzer is configured".into(),
            ));
        };
        hw("power_analyzer", "reset_integration", a.reset_integration().await)?;
        hw(
            "power_analyzer",
            "configure_integration",
            a.configure_integration(timer).await,
        )?;
        hw("power_analyzer", "start_integration", a.start_integration().await)?;
        tracing::info!(timer = ?timer, "power integration started");
        Ok(())
    }

    /// Stop integration and read the accumulated values. `None` without an
    /// analyzer.
    pub async fn stop_power_integration(
        &self,
    ) -> std::result::Result<Option<IntegrationValues>, EolError> {
        let Some(a) = &self.hw.power_analyzer else {
            return Ok(None);
        };
        hw("power_analyzer", "stop_integration", a.stop_integration().await)?;
        let values = hw(
            "power_analyzer",
            "integration_values",
            a.integration_values().await,
        )?;
        tracing::info!(
            watt_hours = values.watt_hours,
            amp_hours = values.amp_hours,
            seconds = values.seconds,
            "power integration stopped"
        );
        Ok(Some(values))
    }

    /// Park the robot and cut DUT power. Failures are logged only. The robot
    /// is left where it is while the emergency latch is active.
    pub async fn teardown_test(&self, cfg: &TestConfiguration) {
        if self.latch.is_active() {
            tracing::warn!("teardown: emergency stop latched; robot not parked");
        } else if self.hw.robot.is_connected() {
            if let Err(e) = self
                .move_to(cfg, cfg.initial_position, RobotState::InitialPosition)
                .await
            {
                tracing::warn!(error = %e, "teardown: robot park failed");
            }
        }
        if self.hw.power.is_connected() {
            if let Err(e) = hw(
                "power_supply",
                "disable_output",
                self.hw.power.disable_output().await,
            ) {
                tracing::warn!(error = %e, "teardown: power disable failed");
            }
        }
    }

    /// Home the robot, cut power, stop the MCU and disconnect everything.
    /// Every step is attempted; nothing is raised. While the emergency latch
    /// is active no motion is commanded: homing waits for a manual reset.
    pub async fn shutdown(&self, axis: u8) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let h = &self.hw;

        if self.latch.is_active() {
            tracing::warn!(axis, "emergency stop latched; skipping robot homing");
        } else if h.robot.is_connected() {
            let r = self.ensure_homed(axis).await;
            report.record("robot home", r);
        }
        if h.power.is_connected() {
            let r = hw("power_supply", "disable_output", h.power.disable_output().await);
            report.record("power disable", r);
        }
        if h.mcu.is_connected() {
            let r = hw("mcu", "stop", h.mcu.stop().await);
            report.record("mcu stop", r);
        }

        self.disconnect_into(&mut report).await;

        if report.is_clean() {
            tracing::info!("shutdown complete");
        } else {
            tracing::warn!(failed = report.failed.len(), "shutdown completed with failures");
        }
        report
    }

    /// Disconnect every device without commanding any motion or output.
    pub async fn disconnect_all(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        self.disconnect_into(&mut report).await;
        report
    }

    async fn disconnect_into(&self, report: &mut ShutdownReport) {
        let h = &self.hw;
        report.record("robot disconnect", disconnect_one(&*h.robot).await);
        report.record("mcu disconnect", disconnect_one(&*h.mcu).await);
        report.record("loadcell disconnect", disconnect_one(&*h.loadcell).await);
        report.record("power disconnect", disconnect_one(&*h.power).await);
        report.record("digital io disconnect", disconnect_one(&*h.digital_io).await);
        if let Some(a) = &h.power_analyzer {
            report.record("power analyzer disconnect", disconnect_one(&**a).await);
        }
        self.homed.store(false, Ordering::Release);
        self.set_state(RobotState::Unknown);
    }
}
