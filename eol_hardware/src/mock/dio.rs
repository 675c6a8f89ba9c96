use std::collections::BTreeMap;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, DigitalIo};
use parking_lot::Mutex;

use super::{FaultPlan, MockLink};
use crate::error::HwError;

const DEVICE: &str = "digital_io";
pub const DEFAULT_CHANNELS: u16 = 32;

#[derive(Debug, Default)]
struct Lines {
    inputs: BTreeMap<u16, bool>,
    outputs: BTreeMap<u16, bool>,
}

#[derive(Debug)]
pub struct MockDigitalIo {
    link: MockLink,
    lines: Mutex<Lines>,
    channels: u16,
}

impl Default for MockDigitalIo {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNELS)
    }
}

impl MockDigitalIo {
    pub fn new(channels: u16) -> Self {
        Self {
            link: MockLink::default(),
            lines: Mutex::new(Lines::default()),
            channels,
        }
    }

    pub fn faults(&self) -> FaultPlan {
        self.link.faults.clone()
    }

    pub fn set_input(&self, channel: u16, level: bool) {
        self.lines.lock().inputs.insert(channel, level);
    }

    pub fn output(&self, channel: u16) -> bool {
        self.lines.lock().outputs.get(&channel).copied().unwrap_or(false)
    }

    fn in_range(&self, operation: &'static str, channel: u16) -> Result<(), HwError> {
        if channel < self.channels {
            Ok(())
        } else {
            Err(HwError::operation(
                DEVICE,
                operation,
                format!("channel {channel} out of range (0..{})", self.channels),
            ))
        }
    }
}

#[async_trait]
impl Device for MockDigitalIo {
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
        let high: Vec<String> = self
            .lines
            .lock()
            .outputs
            .iter()
            .filter(|(_, on)| **on)
            .map(|(ch, _)| ch.to_string())
            .collect();
        s.insert("outputs_high".into(), high.join(","));
        Ok(s)
    }
}

#[async_trait]
impl DigitalIo for MockDigitalIo {
    async fn read_input(&self, channel: u16) -> DeviceResult<bool> {
        self.link.op(DEVICE, "read_input")?;
        self.in_range("read_input", channel)?;
        Ok(self.lines.lock().inputs.get(&channel).copied().unwrap_or(false))
    }

    async fn write_output(&self, channel: u16, level: bool) -> DeviceResult<()> {
        self.link.op(DEVICE, "write_output")?;
        self.in_range("write_output", channel)?;
        self.lines.lock().outputs.insert(channel, level);
        Ok(())
    }

    async fn reset_outputs(&self) -> DeviceResult<()> {
        self.link.op(DEVICE, "reset_outputs")?;
        self.lines.lock().outputs.clear();
        Ok(())
    }
}
