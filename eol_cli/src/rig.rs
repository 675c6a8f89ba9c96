//! Assemble the device set described by `[hardware]`.

use std::sync::Arc;
use std::time::Duration;

use eol_config::{DeviceKind, HardwareConfig};
use eol_core::{BuildError, HardwareOrchestrator};
use eol_hardware::mock::{
    MockDigitalIo, MockLoadCell, MockMcu, MockPowerAnalyzer, MockPowerSupply, MockRobot,
};
use eol_hardware::{OdaPowerSupply, OdaSettings, Wt1800ePowerAnalyzer, Wt1800eSettings};
use eol_traits::{DigitalIo, LoadCell, Mcu, PowerAnalyzer, PowerSupply, Robot};

/// Constant force reported by the mock loadcell.
pub const MOCK_FORCE_ENV: &str = "EOL_MOCK_FORCE";

pub fn build(hw: &HardwareConfig) -> eyre::Result<HardwareOrchestrator> {
    HardwareOrchestrator::builder()
        .robot(robot(hw)?)
        .mcu(mcu(hw)?)
        .loadcell(loadcell(hw)?)
        .power(power(hw))
        .digital_io(digital_io(hw)?)
        .power_analyzer(analyzer(hw))
        .brake_release_channel(hw.digital_io.servo_brake_release)
        .build()
}

fn no_binding(device: &'static str) -> eyre::Report {
    tracing::error!(device, "no vendor motion library is linked into this build");
    eyre::Report::new(BuildError::InvalidConfig(
        "kind = \"real\" needs an AXL board binding; use kind = \"mock\"",
    ))
}

fn robot(hw: &HardwareConfig) -> eyre::Result<Arc<dyn Robot>> {
    match hw.robot.kind {
        DeviceKind::Mock => Ok(Arc::new(MockRobot::new())),
        DeviceKind::Real => Err(no_binding("robot")),
    }
}

fn digital_io(hw: &HardwareConfig) -> eyre::Result<Arc<dyn DigitalIo>> {
    match hw.digital_io.kind {
        DeviceKind::Mock => Ok(Arc::new(MockDigitalIo::new(hw.digital_io.channels))),
        DeviceKind::Real => Err(no_binding("digital_io")),
    }
}

fn mcu(hw: &HardwareConfig) -> eyre::Result<Arc<dyn Mcu>> {
    match hw.mcu.kind {
        DeviceKind::Mock => Ok(Arc::new(MockMcu::new())),
        DeviceKind::Real => serial::mcu(hw),
    }
}

fn loadcell(hw: &HardwareConfig) -> eyre::Result<Arc<dyn LoadCell>> {
    match hw.loadcell.kind {
        DeviceKind::Mock => {
            let force = match std::env::var(MOCK_FORCE_ENV) {
                Ok(v) => v
                    .parse::<f64>()
                    .map_err(|e| eyre::eyre!("{MOCK_FORCE_ENV}={v:?}: {e}"))?,
                Err(_) => 0.0,
            };
            Ok(Arc::new(MockLoadCell::new().with_force(force)))
        }
        DeviceKind::Real => serial::loadcell(hw),
    }
}

fn power(hw: &HardwareConfig) -> Arc<dyn PowerSupply> {
    let c = &hw.power_supply;
    match c.kind {
        DeviceKind::Mock => Arc::new(MockPowerSupply::new()),
        DeviceKind::Real => Arc::new(OdaPowerSupply::new(OdaSettings {
            host: c.host.clone(),
            port: c.port,
            timeout: Duration::from_millis(c.timeout_ms),
            channel: c.channel,
        })),
    }
}

fn analyzer(hw: &HardwareConfig) -> Arc<dyn PowerAnalyzer> {
    let c = &hw.power_analyzer;
    match c.kind {
        DeviceKind::Mock => Arc::new(MockPowerAnalyzer::new()),
        DeviceKind::Real => Arc::new(Wt1800ePowerAnalyzer::new(Wt1800eSettings {
            host: c.host.clone(),
            port: c.port,
            timeout: Duration::from_millis(c.timeout_ms),
            element: c.channel,
        })),
    }
}

#[cfg(feature = "serial")]
mod serial {
    use super::{Arc, Duration, HardwareConfig, LoadCell, Mcu};
    use eol_hardware::{Bs205LoadCell, Bs205Settings, LmaMcu, LmaSettings, SerialOpener};

    pub fn mcu(hw: &HardwareConfig) -> eyre::Result<Arc<dyn Mcu>> {
        let c = &hw.mcu;
        let opener = SerialOpener {
            port: c.port.clone(),
            baud_rate: c.baud_rate,
        };
        Ok(Arc::new(LmaMcu::new(
            Box::new(opener),
            LmaSettings {
                response_timeout: Duration::from_millis(c.response_timeout_ms),
                terminal_timeout: Duration::from_millis(c.terminal_timeout_ms),
                retry_count: c.retry_count,
            },
        )))
    }

    pub fn loadcell(hw: &HardwareConfig) -> eyre::Result<Arc<dyn LoadCell>> {
        let c = &hw.loadcell;
        let opener = SerialOpener {
            port: c.port.clone(),
            baud_rate: c.baud_rate,
        };
        Ok(Arc::new(Bs205LoadCell::new(
            Box::new(opener),
            Bs205Settings {
                indicator_id: c.indicator_id,
                response_timeout: Duration::from_millis(c.response_timeout_ms),
                ..Bs205Settings::default()
            },
        )))
    }
}

#[cfg(not(feature = "serial"))]
mod serial {
    use super::{Arc, HardwareConfig, LoadCell, Mcu};
    use eol_core::BuildError;

    fn disabled() -> eyre::Report {
        eyre::Report::new(BuildError::InvalidConfig(
            "serial devices need the `serial` feature (cargo build --features serial)",
        ))
    }

    pub fn mcu(_hw: &HardwareConfig) -> eyre::Result<Arc<dyn Mcu>> {
        Err(disabled())
    }

    pub fn loadcell(_hw: &HardwareConfig) -> eyre::Result<Arc<dyn LoadCell>> {
        Err(disabled())
    }
}
