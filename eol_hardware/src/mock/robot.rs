use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, MotionProfile, Robot};
use parking_lot::Mutex;

use super::{FaultPlan, MockLink};
use crate::error::HwError;

const DEVICE: &str = "robot";

#[derive(Debug, Default)]
struct Axes {
    servo: HashMap<u8, bool>,
    positions: HashMap<u8, f64>,
    homed: HashMap<u8, bool>,
    emergency_stops: u32,
}

/// Single-controller robot that reaches every target instantly, or after
/// `motion_time` when configured.
#[derive(Debug, Default)]
pub struct MockRobot {
    link: MockLink,
    axes: Mutex<Axes>,
    motion_time: Duration,
}

impl MockRobot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_motion_time(mut self, motion_time: Duration) -> Self {
        self.motion_time = motion_time;
        self
    }

    pub fn faults(&self) -> FaultPlan {
        self.link.faults.clone()
    }

    pub fn position_of(&self, axis: u8) -> f64 {
        self.axes.lock().positions.get(&axis).copied().unwrap_or(0.0)
    }

    pub fn servo_enabled(&self, axis: u8) -> bool {
        self.axes.lock().servo.get(&axis).copied().unwrap_or(false)
    }

    pub fn emergency_stops(&self) -> u32 {
        self.axes.lock().emergency_stops
    }

    fn require_servo(&self, axis: u8, operation: &'static str) -> Result<(), HwError> {
        if self.servo_enabled(axis) {
            Ok(())
        } else {
            Err(HwError::operation(DEVICE, operation, format!("servo {axis} is off")))
        }
    }
}

#[async_trait]
impl Device for MockRobot {
    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn connect(&self) -> DeviceResult<()> {
        Ok(self.link.connect(DEVICE)?)
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        self.axes.lock().servo.clear();
        Ok(self.link.disconnect(DEVICE)?)
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let mut s = self.link.base_status();
        let axes = self.axes.lock();
        for (axis, pos) in &axes.positions {
            s.insert(format!("axis{axis}.position"), format!("{pos:.3}"));
        }
        s.insert("emergency_stops".into(), axes.emergency_stops.to_string());
        Ok(s)
    }
}

#[async_trait]
impl Robot for MockRobot {
    async fn enable_servo(&self, axis: u8) -> DeviceResult<()> {
        self.link.op(DEVICE, "enable_servo")?;
        self.axes.lock().servo.insert(axis, true);
        Ok(())
    }

    async fn disable_servo(&self, axis: u8) -> DeviceResult<()> {
        self.link.op(DEVICE, "disable_servo")?;
        self.axes.lock().servo.insert(axis, false);
        Ok(())
    }

    async fn home_axis(&self, axis: u8) -> DeviceResult<()> {
        self.link.op(DEVICE, "home_axis")?;
        self.require_servo(axis, "home_axis")?;
        let mut axes = self.axes.lock();
        axes.positions.insert(axis, 0.0);
        axes.homed.insert(axis, true);
        Ok(())
    }

    async fn move_absolute(&self, axis: u8, position: f64, profile: MotionProfile) -> DeviceResult<()> {
        self.link.op(DEVICE, "move_absolute")?;
        self.require_servo(axis, "move_absolute")?;
        if profile.velocity <= 0.0 {
            return Err(HwError::operation(DEVICE, "move_absolute", "velocity must be positive").into());
        }
        if !self.motion_time.is_zero() {
            tokio::time::sleep(self.motion_time).await;
        }
        self.axes.lock().positions.insert(axis, position);
        tracing::trace!(axis, position, "mock move complete");
        Ok(())
    }

    async fn position(&self, axis: u8) -> DeviceResult<f64> {
        self.link.op(DEVICE, "position")?;
        Ok(self.position_of(axis))
    }

    async fn stop_motion(&self, _axis: u8, _deceleration: f64) -> DeviceResult<()> {
        self.link.op(DEVICE, "stop_motion")?;
        Ok(())
    }

    async fn emergency_stop(&self, axis: u8) -> DeviceResult<()> {
        self.link.op(DEVICE, "emergency_stop")?;
        let mut axes = self.axes.lock();
        axes.servo.insert(axis, false);
        axes.emergency_stops += 1;
        Ok(())
    }
}
