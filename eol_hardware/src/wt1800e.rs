//! Yokogawa WT1800E power analyzer (SCPI over TCP).
//!
//! The numeric list is programmed on connect as
//! `URMS, IRMS, P, WH, AH, TIME` for the configured element, so one
//! `:NUMeric:NORMal:VALue?` answers both instantaneous and integrated values.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, IntegrationValues, PowerAnalyzer, PowerMeasurement};

use crate::error::HwError;
use crate::integration::{IntegrationAction, IntegrationStateManager};
use crate::scpi::ScpiClient;

const DEVICE: &str = "power_analyzer";
const NUMERIC_ITEMS: [&str; 6] = ["URMS", "IRMS", "P", "WH", "AH", "TIME"];

#[derive(Debug, Clone, PartialEq)]
pub struct Wt1800eSettings {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub element: u8,
}

pub struct Wt1800ePowerAnalyzer {
    settings: Wt1800eSettings,
    client: parking_lot::Mutex<Option<Arc<ScpiClient>>>,
    integration: tokio::sync::Mutex<IntegrationStateManager>,
}

impl Wt1800ePowerAnalyzer {
    pub fn new(settings: Wt1800eSettings) -> Self {
        Self {
            settings,
            client: parking_lot::Mutex::new(None),
            integration: tokio::sync::Mutex::new(IntegrationStateManager::new()),
        }
    }

    fn client(&self) -> Result<Arc<ScpiClient>, HwError> {
        self.client
            .lock()
            .clone()
            .ok_or(HwError::NotConnected { device: DEVICE })
    }

    async fn numeric(&self) -> Result<Vec<f64>, HwError> {
        self.client()?.query_numbers(":NUMeric:NORMal:VALue?").await
    }

    /// Check the transition, run the instrument commands, then commit.
    async fn transition(&self, action: IntegrationAction, commands: &[String]) -> DeviceResult<()> {
        let mut manager = self.integration.lock().await;
        manager
            .check(action)
            .map_err(|e| HwError::operation(DEVICE, "integration", e.to_string()))?;
        let client = self.client()?;
        for command in commands {
            client.send(command).await?;
        }
        let state = manager
            .apply(action)
            .map_err(|e| HwError::operation(DEVICE, "integration", e.to_string()))?;
        tracing::info!(%action, %state, "integration");
        Ok(())
    }
}

fn timer_hms(timer: Duration) -> (u64, u64, u64) {
    let secs = timer.as_secs();
    (secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[async_trait]
impl Device for Wt1800ePowerAnalyzer {
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
        // Leave no integration running from a previous session.
        client.send(":INTEGrate:STOP").await?;
        client.send(":INTEGrate:RESet").await?;
        client.send("*CLS").await?;
        client.send(":COMMunicate:REMote ON").await?;
        for (i, item) in NUMERIC_ITEMS.iter().enumerate() {
            client
                .send(&format!(":NUMeric:NORMal:ITEM{} {item},{}", i + 1, s.element))
                .await?;
        }
        client
            .send(&format!(":NUMeric:NORMal:NUMber {}", NUMERIC_ITEMS.len()))
            .await?;
        self.integration.lock().await.reset();
        *self.client.lock() = Some(Arc::new(client));
        tracing::info!(identity = %idn, element = s.element, "power analyzer connected");
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        let client = self.client.lock().take();
        if let Some(client) = client {
            if let Err(e) = client.send(":COMMunicate:REMote OFF").await {
                tracing::warn!(error = %e, "failed to release remote mode");
            }
        }
        self.integration.lock().await.reset();
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
        out.insert("element".into(), self.settings.element.to_string());
        out.insert(
            "integration".into(),
            self.integration.lock().await.state().to_string(),
        );
        Ok(out)
    }
}

#[async_trait]
impl PowerAnalyzer for Wt1800ePowerAnalyzer {
    async fn measurements(&self) -> DeviceResult<PowerMeasurement> {
        let v = self.numeric().await?;
        let [voltage, current, power, ..] = v[..] else {
            return Err(HwError::operation(
                DEVICE,
                "measurements",
                format!("expected at least 3 values, got {}", v.len()),
            )
            .into());
        };
        Ok(PowerMeasurement {
            voltage,
            current,
            power,
        })
    }

    async fn configure_integration(&self, timer: Duration) -> DeviceResult<()> {
        let (h, m, s) = timer_hms(timer);
        let commands = [
            ":INTEGrate:MODE NORMal".to_string(),
            format!(":INTEGrate:TIMer{} {h},{m},{s}", self.settings.element),
        ];
        self.transition(IntegrationAction::Configure, &commands).await
    }

    async fn start_integration(&self) -> DeviceResult<()> {
        self.transition(IntegrationAction::Start, &[":INTEGrate:STARt".into()])
            .await
    }

    async fn stop_integration(&self) -> DeviceResult<()> {
        self.transition(IntegrationAction::Stop, &[":INTEGrate:STOP".into()])
            .await
    }

    async fn reset_integration(&self) -> DeviceResult<()> {
        self.transition(IntegrationAction::Reset, &[":INTEGrate:RESet".into()])
            .await
    }

    async fn integration_values(&self) -> DeviceResult<IntegrationValues> {
        let v = self.numeric().await?;
        let [_, _, _, watt_hours, amp_hours, seconds, ..] = v[..] else {
            return Err(HwError::operation(
                DEVICE,
                "integration_values",
                format!("expected 6 values, got {}", v.len()),
            )
            .into());
        };
        Ok(IntegrationValues {
            watt_hours,
            amp_hours,
            seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_timer_into_hms() {
        assert_eq!(timer_hms(Duration::from_secs(3725)), (1, 2, 5));
        assert_eq!(timer_hms(Duration::from_secs(59)), (0, 0, 59));
    }
}
