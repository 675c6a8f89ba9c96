//! ODA programmable power supply (SCPI over TCP).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, PowerSupply};

use crate::error::HwError;
use crate::scpi::ScpiClient;

const DEVICE: &str = "power_supply";

#[derive(Debug, Clone, PartialEq)]
pub struct OdaSettings {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub channel: u8,
}

pub struct OdaPowerSupply {
    settings: OdaSettings,
    client: parking_lot::Mutex<Option<Arc<ScpiClient>>>,
    identity: parking_lot::Mutex<Option<String>>,
    output_enabled: AtomicBool,
}

impl OdaPowerSupply {
    pub fn new(settings: OdaSettings) -> Self {
        Self {
            settings,
            client: parking_lot::Mutex::new(None),
            identity: parking_lot::Mutex::new(None),
            output_enabled: AtomicBool::new(false),
        }
    }

    fn client(&self) -> Result<Arc<ScpiClient>, HwError> {
        self.client
            .lock()
            .clone()
            .ok_or(HwError::NotConnected { device: DEVICE })
    }

    async fn query_value(&self, command: &str) -> Result<f64, HwError> {
        let values = self.client()?.query_numbers(command).await?;
        values
            .first()
            .copied()
            .ok_or_else(|| HwError::operation(DEVICE, "query", format!("`{command}` returned nothing")))
    }
}

#[async_trait]
impl Device for OdaPowerSupply {
    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn connect(&self) -> DeviceResult<()> {
        if self.client.lock().is_some() {
            return Ok(());
        }
        let s = &self.settings;
        let client = ScpiClient::connect(DEVICE, &s.host, s.port, s.timeout).await?;
        let idn = client.query("*IDN?").await?;
        if idn.is_empty() {
            return Err(HwError::operation(DEVICE, "connect", "empty *IDN? answer").into());
        }
        client.send("*CLS").await?;
        tracing::info!(identity = %idn, channel = s.channel, "power supply connected");
        *self.identity.lock() = Some(idn);
        *self.client.lock() = Some(Arc::new(client));
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        self.client.lock().take();
        self.output_enabled.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.lock().is_some()
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let mut out = DeviceStatus::new();
        out.insert("connected".into(), self.is_connected().to_string());
        out.insert(
            "endpoint".into(),
            format!("{}:{}", self.settings.host, self.settings.port),
        );
        out.insert(
            "output_enabled".into(),
            self.output_enabled.load(Ordering::Acquire).to_string(),
        );
        if let Some(idn) = self.identity.lock().clone() {
            out.insert("identity".into(), idn);
        }
        Ok(out)
    }
}

#[async_trait]
impl PowerSupply for OdaPowerSupply {
    async fn set_voltage(&self, volts: f64) -> DeviceResult<()> {
        self.client()?.send(&format!("VOLT {volts:.2}")).await?;
        tracing::debug!(volts, "voltage set");
        Ok(())
    }

    async fn set_current(&self, amps: f64) -> DeviceResult<()> {
        self.client()?.send(&format!("CURR {amps:.2}")).await?;
        tracing::debug!(amps, "current set");
        Ok(())
    }

    async fn set_current_limit(&self, amps: f64) -> DeviceResult<()> {
        self.client()?.send(&format!("CURR:UCL {amps:.2}")).await?;
        tracing::debug!(amps, "current limit set");
        Ok(())
    }

    async fn enable_output(&self) -> DeviceResult<()> {
        self.client()?.send("OUTP ON").await?;
        self.output_enabled.store(true, Ordering::Release);
        tracing::info!("power output enabled");
        Ok(())
    }

    async fn disable_output(&self) -> DeviceResult<()> {
        self.client()?.send("OUTP OFF").await?;
        self.output_enabled.store(false, Ordering::Release);
        tracing::info!("power output disabled");
        Ok(())
    }

    async fn is_output_enabled(&self) -> DeviceResult<bool> {
        Ok(self.output_enabled.load(Ordering::Acquire))
    }

    async fn measure(&self) -> DeviceResult<(f64, f64)> {
        let volts = self.query_value("MEAS:VOLT?").await?;
        let amps = self.query_value("MEAS:CURR?").await?;
        Ok((volts, amps))
    }
}
