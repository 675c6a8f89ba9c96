//! BS205 weight indicator (loadcell) over RS-232.
//!
//! Request: `[0x30 + id, cmd]`. Only `R` (read) answers, with a fixed
//! 10-byte frame: `STX id sign value(7 ASCII) ETX`; spaces pad the value.
//! `Z` (zero), `H` (hold) and `L` (hold release) are fire-and-forget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, LoadCell};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::HwError;
use crate::peak::sample_peak;
use crate::transport::{Transport, TransportOpener};

const DEVICE: &str = "loadcell";
const STX: u8 = 0x02;
const ETX: u8 = 0x03;
pub const RESPONSE_LEN: usize = 10;

pub const CMD_READ: u8 = b'R';
pub const CMD_ZERO: u8 = b'Z';
pub const CMD_HOLD: u8 = b'H';
pub const CMD_HOLD_RELEASE: u8 = b'L';

#[derive(Debug, Clone, PartialEq)]
pub struct Bs205Settings {
    pub indicator_id: u8,
    pub response_timeout: Duration,
    /// Quiet time the indicator needs between commands.
    pub min_command_interval: Duration,
    /// Delay between a read request and the first response byte.
    pub response_delay: Duration,
    pub zero_settle: Duration,
}

impl Default for Bs205Settings {
    fn default() -> Self {
        Self {
            indicator_id: 1,
            response_timeout: Duration::from_secs(3),
            min_command_interval: Duration::from_millis(200),
            response_delay: Duration::from_millis(150),
            zero_settle: Duration::from_secs(1),
        }
    }
}

struct Port {
    transport: Box<dyn Transport>,
    last_command: Option<Instant>,
}

pub struct Bs205LoadCell {
    opener: Box<dyn TransportOpener>,
    settings: Bs205Settings,
    port: Mutex<Option<Port>>,
    connected: AtomicBool,
}

/// Parse a read response into kilogram-force.
pub fn parse_response(bytes: &[u8]) -> Result<f64, HwError> {
    let bad = |reason: String| HwError::operation(DEVICE, "read_force", reason);

    let start = bytes
        .iter()
        .position(|&b| b == STX)
        .ok_or_else(|| bad(format!("no STX in {bytes:02X?}")))?;
    let end = bytes[start..]
        .iter()
        .position(|&b| b == ETX)
        .map(|p| p + start)
        .ok_or_else(|| bad(format!("no ETX in {bytes:02X?}")))?;
    let data = &bytes[start + 1..end];
    if data.len() < 3 {
        return Err(bad(format!("response body too short: {data:02X?}")));
    }

    let sign = match data[1] {
        b'+' => 1.0,
        b'-' => -1.0,
        other => return Err(bad(format!("expected sign, got 0x{other:02X}"))),
    };
    let digits: String = data[2..]
        .iter()
        .filter(|&&b| b != b' ' && b != b'_')
        .map(|&b| char::from(b))
        .collect();
    if digits.is_empty() {
        return Err(bad("empty value field".into()));
    }
    let digits = if digits.starts_with('.') {
        format!("0{digits}")
    } else {
        digits
    };
    let value: f64 = digits
        .parse()
        .map_err(|_| bad(format!("value field {digits:?} is not a number")))?;
    Ok(sign * value)
}

impl Bs205LoadCell {
    pub fn new(opener: Box<dyn TransportOpener>, settings: Bs205Settings) -> Self {
        Self {
            opener,
            settings,
            port: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn command_bytes(&self, command: u8) -> [u8; 2] {
        [0x30 + self.settings.indicator_id, command]
    }

    /// Send `command`; for `R`, collect and return the fixed-length reply.
    async fn transact(&self, command: u8) -> Result<Option<Vec<u8>>, HwError> {
        let mut guard = self.port.lock().await;
        let port = guard
            .as_mut()
            .ok_or(HwError::NotConnected { device: DEVICE })?;

        if let Some(last) = port.last_command {
            let ready_at = last + self.settings.min_command_interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        port.transport.clear_input().await?;
        port.transport.write_all(&self.command_bytes(command)).await?;
        port.last_command = Some(Instant::now());
        tracing::trace!(command = %char::from(command), "-> bs205");
        if command != CMD_READ {
            return Ok(None);
        }

        tokio::time::sleep(self.settings.response_delay).await;
        let mut reply = Vec::with_capacity(RESPONSE_LEN);
        let mut chunk = [0u8; RESPONSE_LEN];
        let read_all = async {
            while reply.len() < RESPONSE_LEN || !reply.contains(&ETX) {
                let n = port.transport.read(&mut chunk).await?;
                if n == 0 {
                    return Err(HwError::Closed);
                }
                reply.extend_from_slice(&chunk[..n]);
            }
            Ok(())
        };
        match tokio::time::timeout(self.settings.response_timeout, read_all).await {
            Ok(r) => r?,
            Err(_) => {
                return Err(HwError::ResponseTimeout {
                    device: DEVICE,
                    command: char::from(command).to_string(),
                });
            }
        }
        Ok(Some(reply))
    }

    pub async fn hold(&self) -> DeviceResult<()> {
        self.transact(CMD_HOLD).await?;
        Ok(())
    }

    pub async fn release_hold(&self) -> DeviceResult<()> {
        self.transact(CMD_HOLD_RELEASE).await?;
        Ok(())
    }
}

#[async_trait]
impl Device for Bs205LoadCell {
    fn name(&self) -> &'static str {
        DEVICE
    }

    async fn connect(&self) -> DeviceResult<()> {
        let mut guard = self.port.lock().await;
        if guard.is_none() {
            let transport = self.opener.open().await?;
            *guard = Some(Port {
                transport,
                last_command: None,
            });
            tracing::info!(
                endpoint = %self.opener.describe(),
                id = self.settings.indicator_id,
                "bs205 connected"
            );
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        self.port.lock().await.take();
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
        out.insert("indicator_id".into(), self.settings.indicator_id.to_string());
        out.insert("hardware_type".into(), "BS205".into());
        Ok(out)
    }
}

#[async_trait]
impl LoadCell for Bs205LoadCell {
    async fn read_force(&self) -> DeviceResult<f64> {
        let reply = self
            .transact(CMD_READ)
            .await?
            .ok_or_else(|| HwError::operation(DEVICE, "read_force", "no response"))?;
        let kgf = parse_response(&reply)?;
        tracing::debug!(kgf, "bs205 reading");
        Ok(kgf)
    }

    async fn zero(&self) -> DeviceResult<()> {
        self.transact(CMD_ZERO).await?;
        tokio::time::sleep(self.settings.zero_settle).await;
        tracing::info!("bs205 zeroed");
        Ok(())
    }

    async fn read_peak_force(&self, duration: Duration, interval: Duration) -> DeviceResult<f64> {
        let interval = interval.max(self.settings.min_command_interval);
        sample_peak(DEVICE, duration, interval, || self.read_force()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_positive_reading() {
        assert_eq!(parse_response(b"\x021+  7.487\x03").unwrap(), 7.487);
    }

    #[test]
    fn parses_negative_and_leading_dot() {
        assert_eq!(parse_response(b"\x021-  12.34\x03").unwrap(), -12.34);
        assert_eq!(parse_response(b"\x025+   .487\x03").unwrap(), 0.487);
    }

    #[test]
    fn tolerates_noise_before_stx() {
        assert_eq!(parse_response(b"\x00\x00\x021+0001.50\x03").unwrap(), 1.5);
    }

    #[test]
    fn rejects_missing_sign_or_frame() {
        assert!(parse_response(b"\x021?  7.487\x03").is_err());
        assert!(parse_response(b"1+  7.487").is_err());
        assert!(parse_response(b"\x021+  7.487").is_err());
        assert!(parse_response(b"\x021+    \x03").is_err());
    }
}
