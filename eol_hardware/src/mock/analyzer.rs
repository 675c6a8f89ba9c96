use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, IntegrationValues, PowerAnalyzer, PowerMeasurement};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{FaultPlan, MockLink};
use crate::error::HwError;
use crate::integration::{IntegrationAction, IntegrationState, IntegrationStateManager};

const DEVICE: &str = "power_analyzer";

#[derive(Debug, Default)]
struct Meter {
    reading: PowerMeasurement,
    manager: IntegrationStateManager,
    timer: Duration,
    started: Option<Instant>,
    accumulated: Duration,
}

impl Meter {
    fn elapsed(&self) -> Duration {
        let running = self.started.map_or(Duration::ZERO, |t| t.elapsed());
        let total = self.accumulated + running;
        if self.timer.is_zero() { total } else { total.min(self.timer) }
    }
}

/// Analyzer integrating a constant reading over tokio time.
#[derive(Debug, Default)]
pub struct MockPowerAnalyzer {
    link: MockLink,
    meter: Mutex<Meter>,
}

impl MockPowerAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reading(self, reading: PowerMeasurement) -> Self {
        self.meter.lock().reading = reading;
        self
    }

    pub fn faults(&self) -> FaultPlan {
        self.link.faults.clone()
    }

    pub fn integration_state(&self) -> IntegrationState {
        self.meter.lock().manager.state()
    }

    fn transition(&self, operation: &'static str, action: IntegrationAction) -> Result<(), HwError> {
        self.link.op(DEVICE, operation)?;
        let mut meter = self.meter.lock();
        meter
            .manager
            .apply(action)
            .map_err(|e| HwError::operation(DEVICE, operation, e.to_string()))?;
        match action {
            IntegrationAction::Start => meter.started = Some(Instant::now()),
            IntegrationAction::Stop => {
                if let Some(t) = meter.started.take() {
                    meter.accumulated += t.elapsed();
                }
            }
            IntegrationAction::Reset | IntegrationAction::Configure => {
                meter.started = None;
                meter.accumulated = Duration::ZERO;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Device for MockPowerAnalyzer {
    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn connect(&self) -> DeviceResult<()> {
        self.link.connect(DEVICE)?;
        self.meter.lock().manager.reset();
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        Ok(self.link.disconnect(DEVICE)?)
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let mut s = self.link.base_status();
        s.insert("integration".into(), self.integration_state().to_string());
        Ok(s)
    }
}

#[async_trait]
impl PowerAnalyzer for MockPowerAnalyzer {
    async fn measurements(&self) -> DeviceResult<PowerMeasurement> {
        self.link.op(DEVICE, "measurements")?;
        Ok(self.meter.lock().reading)
    }

    async fn configure_integration(&self, timer: Duration) -> DeviceResult<()> {
        self.transition("configure_integration", IntegrationAction::Configure)?;
        self.meter.lock().timer = timer;
        Ok(())
    }

    async fn start_integration(&self) -> DeviceResult<()> {
        Ok(self.transition("start_integration", IntegrationAction::Start)?)
    }

    async fn stop_integration(&self) -> DeviceResult<()> {
        Ok(self.transition("stop_integration", IntegrationAction::Stop)?)
    }

    async fn reset_integration(&self) -> DeviceResult<()> {
        Ok(self.transition("reset_integration", IntegrationAction::Reset)?)
    }

    async fn integration_values(&self) -> DeviceResult<IntegrationValues> {
        self.link.op(DEVICE, "integration_values")?;
        let meter = self.meter.lock();
        let seconds = meter.elapsed().as_secs_f64();
        let hours = seconds / 3600.0;
        Ok(IntegrationValues {
            watt_hours: meter.reading.power * hours,
            amp_hours: meter.reading.current * hours,
            seconds,
        })
    }
}
