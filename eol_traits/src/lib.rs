//! Device capability traits shared by the rig drivers and the test core.
//!
//! Every hardware kind on the EOL rig is one trait. Drivers (mock or real)
//! implement it; the orchestrator only ever holds `Arc<dyn Trait>`.
//!
//! Methods take `&self` so the emergency-stop path can reach a device while a
//! normal exchange is in flight; drivers keep their own interior locking.
//! Errors cross this seam as `Box<dyn Error + Send + Sync>` and are mapped to
//! typed errors by the caller.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub type DeviceError = Box<dyn std::error::Error + Send + Sync>;
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Free-form status snapshot used by health reporting (key -> rendered value).
pub type DeviceStatus = BTreeMap<String, String>;

/// Connection lifecycle common to every device.
#[async_trait]
pub trait Device: Send + Sync {
    /// Short, stable name used in logs and error messages ("robot", "mcu", ...).
    fn name(&self) -> &'static str;
    async fn connect(&self) -> DeviceResult<()>;
    async fn disconnect(&self) -> DeviceResult<()>;
    fn is_connected(&self) -> bool;
    async fn status(&self) -> DeviceResult<DeviceStatus>;
}

/// Velocity profile for a single absolute move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionProfile {
    pub velocity: f64,
    pub acceleration: f64,
    pub deceleration: f64,
}

#[async_trait]
pub trait Robot: Device {
    async fn enable_servo(&self, axis: u8) -> DeviceResult<()>;
    async fn disable_servo(&self, axis: u8) -> DeviceResult<()>;
    async fn home_axis(&self, axis: u8) -> DeviceResult<()>;
    /// Move and wait until the axis reports motion complete.
    async fn move_absolute(&self, axis: u8, position: f64, profile: MotionProfile)
    -> DeviceResult<()>;
    async fn position(&self, axis: u8) -> DeviceResult<f64>;
    async fn stop_motion(&self, axis: u8, deceleration: f64) -> DeviceResult<()>;
    /// Halt motion immediately and drop the servo. Must not wait on any
    /// in-flight command.
    async fn emergency_stop(&self, axis: u8) -> DeviceResult<()>;
}

/// MCU test modes; the wire value is the mode number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestMode {
    #[default]
    Mode1,
    Mode2,
    Mode3,
}

impl TestMode {
    pub fn wire_value(self) -> u32 {
        match self {
            TestMode::Mode1 => 1,
            TestMode::Mode2 => 2,
            TestMode::Mode3 => 3,
        }
    }
}

/// Parameters for the LMA init (standby heating) command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandbyHeating {
    pub operating_temperature: f64,
    pub standby_temperature: f64,
    pub hold_time_ms: u32,
}

#[async_trait]
pub trait Mcu: Device {
    /// Wait for the unsolicited boot-complete status after power-on.
    async fn wait_boot_complete(&self, timeout: Duration) -> DeviceResult<()>;
    async fn set_test_mode(&self, mode: TestMode) -> DeviceResult<()>;
    async fn set_upper_temperature(&self, celsius: f64) -> DeviceResult<()>;
    /// Fan level 1..=10.
    async fn set_fan_speed(&self, level: u8) -> DeviceResult<()>;
    /// Ack, then wait for the operating temperature to be reached.
    async fn start_standby_heating(&self, params: StandbyHeating) -> DeviceResult<()>;
    async fn set_operating_temperature(&self, celsius: f64) -> DeviceResult<()>;
    async fn set_cooling_temperature(&self, celsius: f64) -> DeviceResult<()>;
    /// Ack, then wait for the standby temperature to be reached.
    async fn start_standby_cooling(&self) -> DeviceResult<()>;
    /// Highest temperature reported by the array sensor.
    async fn temperature(&self) -> DeviceResult<f64>;
    /// Put the heater into its idle/cooling state without waiting for it.
    async fn stop(&self) -> DeviceResult<()>;
}

#[async_trait]
pub trait LoadCell: Device {
    async fn read_force(&self) -> DeviceResult<f64>;
    async fn zero(&self) -> DeviceResult<()>;
    /// Largest absolute sample over `duration`, sampling every `interval`.
    async fn read_peak_force(&self, duration: Duration, interval: Duration) -> DeviceResult<f64>;
}

#[async_trait]
pub trait PowerSupply: Device {
    async fn set_voltage(&self, volts: f64) -> DeviceResult<()>;
    async fn set_current(&self, amps: f64) -> DeviceResult<()>;
    async fn set_current_limit(&self, amps: f64) -> DeviceResult<()>;
    async fn enable_output(&self) -> DeviceResult<()>;
    /// Write-only; usable while another exchange with the supply is pending.
    async fn disable_output(&self) -> DeviceResult<()>;
    async fn is_output_enabled(&self) -> DeviceResult<bool>;
    /// Measured (volts, amps).
    async fn measure(&self) -> DeviceResult<(f64, f64)>;
}

#[async_trait]
pub trait DigitalIo: Device {
    async fn read_input(&self, channel: u16) -> DeviceResult<bool>;
    async fn write_output(&self, channel: u16, level: bool) -> DeviceResult<()>;
    async fn reset_outputs(&self) -> DeviceResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PowerMeasurement {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

/// Accumulated energy over an integration window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IntegrationValues {
    pub watt_hours: f64,
    pub amp_hours: f64,
    pub seconds: f64,
}

#[async_trait]
pub trait PowerAnalyzer: Device {
    async fn measurements(&self) -> DeviceResult<PowerMeasurement>;
    async fn configure_integration(&self, timer: Duration) -> DeviceResult<()>;
    async fn start_integration(&self) -> DeviceResult<()>;
    async fn stop_integration(&self) -> DeviceResult<()>;
    async fn reset_integration(&self) -> DeviceResult<()>;
    async fn integration_values(&self) -> DeviceResult<IntegrationValues>;
}
