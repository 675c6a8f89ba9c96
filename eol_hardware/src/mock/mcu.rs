use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, Mcu, StandbyHeating, TestMode};
use parking_lot::Mutex;

use super::{FaultPlan, MockLink};
use crate::error::HwError;

const DEVICE: &str = "mcu";

#[derive(Debug, Default)]
struct Sim {
    test_mode: Option<TestMode>,
    upper_limit: Option<f64>,
    fan_level: Option<u8>,
    operating: Option<f64>,
    standby: Option<f64>,
    cooling: Option<f64>,
    temperature: f64,
    forced: Option<f64>,
    heating: bool,
}

/// MCU whose temperature snaps to the most recent setpoint.
#[derive(Debug)]
pub struct MockMcu {
    link: MockLink,
    sim: Mutex<Sim>,
    boot_delay: Duration,
}

impl Default for MockMcu {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMcu {
    pub fn new() -> Self {
        Self {
            link: MockLink::default(),
            sim: Mutex::new(Sim {
                temperature: 25.0,
                ..Sim::default()
            }),
            boot_delay: Duration::ZERO,
        }
    }

    pub fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    pub fn faults(&self) -> FaultPlan {
        self.link.faults.clone()
    }

    /// Report `celsius` regardless of setpoints; `None` restores tracking.
    pub fn force_temperature(&self, celsius: Option<f64>) {
        self.sim.lock().forced = celsius;
    }

    pub fn test_mode(&self) -> Option<TestMode> {
        self.sim.lock().test_mode
    }

    pub fn fan_level(&self) -> Option<u8> {
        self.sim.lock().fan_level
    }

    pub fn upper_limit(&self) -> Option<f64> {
        self.sim.lock().upper_limit
    }

    pub fn is_heating(&self) -> bool {
        self.sim.lock().heating
    }

    fn setpoint(&self, operation: &'static str, celsius: f64) -> Result<(), HwError> {
        if !celsius.is_finite() {
            return Err(HwError::operation(DEVICE, operation, "temperature is not finite"));
        }
        if let Some(limit) = self.sim.lock().upper_limit {
            if celsius > limit {
                return Err(HwError::operation(
                    DEVICE,
                    operation,
                    format!("{celsius}°C above upper limit {limit}°C"),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Device for MockMcu {
    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn connect(&self) -> DeviceResult<()> {
        Ok(self.link.connect(DEVICE)?)
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        self.sim.lock().heating = false;
        Ok(self.link.disconnect(DEVICE)?)
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let mut s = self.link.base_status();
        let sim = self.sim.lock();
        s.insert("temperature".into(), format!("{:.1}", sim.forced.unwrap_or(sim.temperature)));
        s.insert("heating".into(), sim.heating.to_string());
        if let Some(mode) = sim.test_mode {
            s.insert("test_mode".into(), format!("{mode:?}"));
        }
        Ok(s)
    }
}

#[async_trait]
impl Mcu for MockMcu {
    async fn wait_boot_complete(&self, timeout: Duration) -> DeviceResult<()> {
        self.link.op(DEVICE, "wait_boot_complete")?;
        if self.boot_delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(HwError::CommunicationTimeout {
                code: crate::protocol::lma::status::BOOT_COMPLETE,
                attempts: 1,
            }
            .into());
        }
        tokio::time::sleep(self.boot_delay).await;
        Ok(())
    }

    async fn set_test_mode(&self, mode: TestMode) -> DeviceResult<()> {
        self.link.op(DEVICE, "set_test_mode")?;
        self.sim.lock().test_mode = Some(mode);
        Ok(())
    }

    async fn set_upper_temperature(&self, celsius: f64) -> DeviceResult<()> {
        self.link.op(DEVICE, "set_upper_temperature")?;
        self.sim.lock().upper_limit = Some(celsius);
        Ok(())
    }

    async fn set_fan_speed(&self, level: u8) -> DeviceResult<()> {
        self.link.op(DEVICE, "set_fan_speed")?;
        if !(1..=10).contains(&level) {
            return Err(HwError::operation(DEVICE, "set_fan_speed", format!("level {level} outside 1..=10")).into());
        }
        self.sim.lock().fan_level = Some(level);
        Ok(())
    }

    async fn start_standby_heating(&self, params: StandbyHeating) -> DeviceResult<()> {
        self.link.op(DEVICE, "start_standby_heating")?;
        self.setpoint("start_standby_heating", params.operating_temperature)?;
        let mut sim = self.sim.lock();
        sim.operating = Some(params.operating_temperature);
        sim.standby = Some(params.standby_temperature);
        sim.temperature = params.operating_temperature;
        sim.heating = true;
        Ok(())
    }

    async fn set_operating_temperature(&self, celsius: f64) -> DeviceResult<()> {
        self.link.op(DEVICE, "set_operating_temperature")?;
        self.setpoint("set_operating_temperature", celsius)?;
        let mut sim = self.sim.lock();
        sim.operating = Some(celsius);
        sim.temperature = celsius;
        sim.heating = true;
        Ok(())
    }

    async fn set_cooling_temperature(&self, celsius: f64) -> DeviceResult<()> {
        self.link.op(DEVICE, "set_cooling_temperature")?;
        self.setpoint("set_cooling_temperature", celsius)?;
        self.sim.lock().cooling = Some(celsius);
        Ok(())
    }

    async fn start_standby_cooling(&self) -> DeviceResult<()> {
        self.link.op(DEVICE, "start_standby_cooling")?;
        let mut sim = self.sim.lock();
        if let Some(standby) = sim.standby.or(sim.cooling) {
            sim.temperature = standby;
        }
        Ok(())
    }

    async fn temperature(&self) -> DeviceResult<f64> {
        self.link.op(DEVICE, "temperature")?;
        let sim = self.sim.lock();
        Ok(sim.forced.unwrap_or(sim.temperature))
    }

    async fn stop(&self) -> DeviceResult<()> {
        self.link.op(DEVICE, "stop")?;
        self.sim.lock().heating = false;
        Ok(())
    }
}
