use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, LoadCell, Mcu, Robot};
use parking_lot::Mutex;

use super::{FaultPlan, MockLink};
use crate::peak::sample_peak;

const DEVICE: &str = "loadcell";

/// Force as a function of (temperature °C, robot position).
pub type ForceModel = Arc<dyn Fn(f64, f64) -> f64 + Send + Sync>;

struct Coupling {
    robot: Arc<dyn Robot>,
    mcu: Arc<dyn Mcu>,
    axis: u8,
    model: ForceModel,
}

/// Loadcell answering from a script, a model of the rig, or a constant.
///
/// Script entries are consumed first; once empty, the coupled model (if any)
/// is evaluated against the robot and MCU, else `force` is returned.
pub struct MockLoadCell {
    link: MockLink,
    script: Mutex<VecDeque<f64>>,
    force: Mutex<f64>,
    coupling: Option<Coupling>,
    reads: Mutex<u64>,
}

impl Default for MockLoadCell {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLoadCell {
    pub fn new() -> Self {
        Self {
            link: MockLink::default(),
            script: Mutex::new(VecDeque::new()),
            force: Mutex::new(0.0),
            coupling: None,
            reads: Mutex::new(0),
        }
    }

    pub fn with_force(self, force: f64) -> Self {
        *self.force.lock() = force;
        self
    }

    pub fn coupled(mut self, robot: Arc<dyn Robot>, mcu: Arc<dyn Mcu>, axis: u8, model: ForceModel) -> Self {
        self.coupling = Some(Coupling {
            robot,
            mcu,
            axis,
            model,
        });
        self
    }

    pub fn faults(&self) -> FaultPlan {
        self.link.faults.clone()
    }

    pub fn set_force(&self, force: f64) {
        *self.force.lock() = force;
    }

    pub fn push_readings(&self, readings: impl IntoIterator<Item = f64>) {
        self.script.lock().extend(readings);
    }

    pub fn reads(&self) -> u64 {
        *self.reads.lock()
    }
}

#[async_trait]
impl Device for MockLoadCell {
    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn connect(&self) -> DeviceResult<()> {
        Ok(self.link.connect(DEVICE)?)
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        Ok(self.link.disconnect(DEVICE)?)
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let mut s = self.link.base_status();
        s.insert("reads".into(), self.reads().to_string());
        Ok(s)
    }
}

#[async_trait]
impl LoadCell for MockLoadCell {
    async fn read_force(&self) -> DeviceResult<f64> {
        self.link.op(DEVICE, "read_force")?;
        *self.reads.lock() += 1;
        let scripted = self.script.lock().pop_front();
        if let Some(v) = scripted {
            return Ok(v);
        }
        if let Some(c) = &self.coupling {
            let temperature = c.mcu.temperature().await?;
            let position = c.robot.position(c.axis).await?;
            return Ok((c.model)(temperature, position));
        }
        Ok(*self.force.lock())
    }

    async fn zero(&self) -> DeviceResult<()> {
        self.link.op(DEVICE, "zero")?;
        Ok(())
    }

    async fn read_peak_force(&self, duration: Duration, interval: Duration) -> DeviceResult<f64> {
        self.link.op(DEVICE, "read_peak_force")?;
        sample_peak(DEVICE, duration, interval, || self.read_force()).await
    }
}
