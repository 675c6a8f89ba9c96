use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, PowerSupply};
use parking_lot::Mutex;

use super::{FaultPlan, MockLink};

const DEVICE: &str = "power_supply";

#[derive(Debug, Default, Clone, Copy)]
struct Output {
    voltage: f64,
    current: f64,
    limit: Option<f64>,
    enabled: bool,
}

#[derive(Debug, Default)]
pub struct MockPowerSupply {
    link: MockLink,
    output: Mutex<Output>,
}

impl MockPowerSupply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> FaultPlan {
        self.link.faults.clone()
    }

    pub fn output_enabled(&self) -> bool {
        self.output.lock().enabled
    }

    pub fn voltage(&self) -> f64 {
        self.output.lock().voltage
    }

    pub fn current(&self) -> f64 {
        self.output.lock().current
    }
}

#[async_trait]
impl Device for MockPowerSupply {
    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn connect(&self) -> DeviceResult<()> {
        Ok(self.link.connect(DEVICE)?)
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        self.output.lock().enabled = false;
        Ok(self.link.disconnect(DEVICE)?)
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let mut s = self.link.base_status();
        let o = *self.output.lock();
        s.insert("output_enabled".into(), o.enabled.to_string());
        s.insert("voltage".into(), format!("{:.2}", o.voltage));
        s.insert("current".into(), format!("{:.2}", o.current));
        Ok(s)
    }
}

#[async_trait]
impl PowerSupply for MockPowerSupply {
    async fn set_voltage(&self, volts: f64) -> DeviceResult<()> {
        self.link.op(DEVICE, "set_voltage")?;
        self.output.lock().voltage = volts;
        Ok(())
    }

    async fn set_current(&self, amps: f64) -> DeviceResult<()> {
        self.link.op(DEVICE, "set_current")?;
        self.output.lock().current = amps;
        Ok(())
    }

    async fn set_current_limit(&self, amps: f64) -> DeviceResult<()> {
        self.link.op(DEVICE, "set_current_limit")?;
        self.output.lock().limit = Some(amps);
        Ok(())
    }

    async fn enable_output(&self) -> DeviceResult<()> {
        self.link.op(DEVICE, "enable_output")?;
        self.output.lock().enabled = true;
        Ok(())
    }

    async fn disable_output(&self) -> DeviceResult<()> {
        self.link.op(DEVICE, "disable_output")?;
        self.output.lock().enabled = false;
        Ok(())
    }

    async fn is_output_enabled(&self) -> DeviceResult<bool> {
        self.link.op(DEVICE, "is_output_enabled")?;
        Ok(self.output_enabled())
    }

    async fn measure(&self) -> DeviceResult<(f64, f64)> {
        self.link.op(DEVICE, "measure")?;
        let o = *self.output.lock();
        if !o.enabled {
            return Ok((0.0, 0.0));
        }
        let amps = o.limit.map_or(o.current, |l| o.current.min(l));
        Ok((o.voltage, amps))
    }
}
