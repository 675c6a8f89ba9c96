//! LMA MCU driver over a byte transport.
//!
//! One exchange at a time: the engine sits behind an async mutex, so a second
//! caller waits for the first exchange to finish. Dropping a caller's future
//! mid-exchange leaves the engine marked interrupted, and the next exchange
//! starts with a resync.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, Mcu, StandbyHeating, TestMode};
use tokio::sync::Mutex;

use crate::engine::{CommandRequest, CommandResponseEngine, ResponseSet};
use crate::error::HwError;
use crate::protocol::lma::{self, cmd, status};
use crate::transport::{Transport, TransportOpener};

const DEVICE: &str = "mcu";

#[derive(Debug, Clone, PartialEq)]
pub struct LmaSettings {
    pub response_timeout: Duration,
    /// Budget for "temperature reached" style statuses.
    pub terminal_timeout: Duration,
    pub retry_count: u32,
}

impl Default for LmaSettings {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(5),
            terminal_timeout: Duration::from_secs(120),
            retry_count: 3,
        }
    }
}

type Link = CommandResponseEngine<Box<dyn Transport>>;

pub struct LmaMcu {
    opener: Box<dyn TransportOpener>,
    settings: LmaSettings,
    link: Mutex<Option<Link>>,
    connected: AtomicBool,
    last_temperature: parking_lot::Mutex<Option<f64>>,
}

impl LmaMcu {
    pub fn new(opener: Box<dyn TransportOpener>, settings: LmaSettings) -> Self {
        Self {
            opener,
            settings,
            link: Mutex::new(None),
            connected: AtomicBool::new(false),
            last_temperature: parking_lot::Mutex::new(None),
        }
    }

    fn request(&self, code: u8, payload: impl Into<Vec<u8>>) -> CommandRequest {
        CommandRequest::new(code, payload)
            .timeout(self.settings.response_timeout)
            .retries(self.settings.retry_count)
    }

    async fn exchange(&self, request: CommandRequest) -> Result<ResponseSet, HwError> {
        let mut guard = self.link.lock().await;
        let link = guard
            .as_mut()
            .ok_or(HwError::NotConnected { device: DEVICE })?;
        link.send(&request).await.inspect_err(|e| {
            tracing::error!(code = request.code, error = %e, "mcu exchange failed");
        })
    }

    async fn command(&self, request: CommandRequest, what: &'static str) -> DeviceResult<()> {
        let set = self.exchange(request).await?;
        if let Some(last) = set.terminal() {
            tracing::info!(status = lma::status_name(last.code), "{what}");
        }
        Ok(())
    }
}

#[async_trait]
impl Device for LmaMcu {
    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn connect(&self) -> DeviceResult<()> {
        let mut guard = self.link.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let transport = self.opener.open().await?;
        let mut link = CommandResponseEngine::new(transport);
        link.clear().await?;
        *guard = Some(link);
        self.connected.store(true, Ordering::Release);
        tracing::info!(endpoint = %self.opener.describe(), "mcu connected");
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        let mut guard = self.link.lock().await;
        if guard.take().is_some() {
            tracing::info!("mcu disconnected");
        }
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let mut out = DeviceStatus::new();
        out.insert("connected".into(), self.is_connected().to_string());
        out.insert("endpoint".into(), self.opener.describe());
        if let Some(t) = *self.last_temperature.lock() {
            out.insert("last_temperature".into(), format!("{t:.1}"));
        }
        Ok(out)
    }
}

#[async_trait]
impl Mcu for LmaMcu {
    async fn wait_boot_complete(&self, timeout: Duration) -> DeviceResult<()> {
        let mut guard = self.link.lock().await;
        let link = guard
            .as_mut()
            .ok_or(HwError::NotConnected { device: DEVICE })?;
        link.listen(status::BOOT_COMPLETE, timeout).await?;
        tracing::info!("mcu boot complete");
        Ok(())
    }

    async fn set_test_mode(&self, mode: TestMode) -> DeviceResult<()> {
        let req = self
            .request(cmd::ENTER_TEST_MODE, lma::encode_test_mode(mode))
            .expect(status::TEST_MODE_COMPLETE);
        self.command(req, "test mode set").await
    }

    async fn set_upper_temperature(&self, celsius: f64) -> DeviceResult<()> {
        let payload = lma::encode_temperature(cmd::SET_UPPER_TEMP, celsius).map_err(HwError::from)?;
        let req = self
            .request(cmd::SET_UPPER_TEMP, payload)
            .expect(status::UPPER_TEMP_OK);
        self.command(req, "upper temperature set").await
    }

    async fn set_fan_speed(&self, level: u8) -> DeviceResult<()> {
        let payload = lma::encode_fan_level(level).map_err(HwError::from)?;
        let req = self
            .request(cmd::SET_FAN_SPEED, payload)
            .expect(status::FAN_SPEED_OK);
        self.command(req, "fan speed set").await
    }

    async fn start_standby_heating(&self, params: StandbyHeating) -> DeviceResult<()> {
        let payload = lma::encode_lma_init(params).map_err(HwError::from)?;
        let req = self
            .request(cmd::LMA_INIT, payload)
            .expect(status::LMA_INIT_OK)
            .then(status::OPERATING_TEMP_REACHED, self.settings.terminal_timeout);
        self.command(req, "standby heating reached operating temperature")
            .await
    }

    async fn set_operating_temperature(&self, celsius: f64) -> DeviceResult<()> {
        let payload =
            lma::encode_temperature(cmd::SET_OPERATING_TEMP, celsius).map_err(HwError::from)?;
        let req = self
            .request(cmd::SET_OPERATING_TEMP, payload)
            .expect(status::OPERATING_TEMP_OK);
        self.command(req, "operating temperature set").await
    }

    async fn set_cooling_temperature(&self, celsius: f64) -> DeviceResult<()> {
        let payload =
            lma::encode_temperature(cmd::SET_COOLING_TEMP, celsius).map_err(HwError::from)?;
        let req = self
            .request(cmd::SET_COOLING_TEMP, payload)
            .expect(status::COOLING_TEMP_OK);
        self.command(req, "cooling temperature set").await
    }

    async fn start_standby_cooling(&self) -> DeviceResult<()> {
        let req = self
            .request(cmd::STROKE_INIT_COMPLETE, Vec::new())
            .expect(status::STROKE_INIT_OK)
            .then(status::STANDBY_TEMP_REACHED, self.settings.terminal_timeout);
        self.command(req, "standby cooling reached standby temperature")
            .await
    }

    async fn temperature(&self) -> DeviceResult<f64> {
        let req = self
            .request(cmd::REQUEST_TEMP, Vec::new())
            .expect(status::TEMP_RESPONSE);
        let set = self.exchange(req).await?;
        let frame = set.terminal().ok_or_else(|| {
            HwError::operation(DEVICE, "temperature", "empty response set")
        })?;
        let (max, min) = lma::decode_temperature(&frame.payload).map_err(HwError::from)?;
        tracing::debug!(max, min, "mcu temperature");
        *self.last_temperature.lock() = Some(max);
        Ok(max)
    }

    async fn stop(&self) -> DeviceResult<()> {
        // Cooling setpoint 0 with the stroke-init ack; no terminal wait.
        let req = self
            .request(cmd::SET_COOLING_TEMP, vec![0x00])
            .expect(status::STROKE_INIT_OK)
            .retries(1);
        self.command(req, "mcu stopped").await
    }
}
