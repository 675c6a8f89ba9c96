//! LMA MCU command set: codes and payload layouts (big-endian).

use eol_traits::{StandbyHeating, TestMode};

use super::codec::ProtocolError;

/// Temperatures travel as tenths of a degree.
pub const TEMP_SCALE: f64 = 10.0;
pub const DEFAULT_HOLD_TIME_MS: u32 = 10_000;

pub mod cmd {
    pub const BOOT_COMPLETE: u8 = 0x00;
    pub const ENTER_TEST_MODE: u8 = 0x01;
    pub const SET_UPPER_TEMP: u8 = 0x02;
    pub const SET_FAN_SPEED: u8 = 0x03;
    pub const LMA_INIT: u8 = 0x04;
    pub const SET_OPERATING_TEMP: u8 = 0x05;
    pub const SET_COOLING_TEMP: u8 = 0x06;
    pub const REQUEST_TEMP: u8 = 0x07;
    pub const STROKE_INIT_COMPLETE: u8 = 0x08;
}

pub mod status {
    pub const BOOT_COMPLETE: u8 = 0x00;
    pub const TEST_MODE_COMPLETE: u8 = 0x01;
    pub const UPPER_TEMP_OK: u8 = 0x02;
    pub const FAN_SPEED_OK: u8 = 0x03;
    pub const LMA_INIT_OK: u8 = 0x04;
    pub const OPERATING_TEMP_OK: u8 = 0x05;
    pub const COOLING_TEMP_OK: u8 = 0x06;
    pub const TEMP_RESPONSE: u8 = 0x07;
    pub const STROKE_INIT_OK: u8 = 0x08;
    pub const TEMP_RISE_START: u8 = 0x09;
    pub const TEMP_FALL_START: u8 = 0x0A;
    pub const OPERATING_TEMP_REACHED: u8 = 0x0B;
    pub const STANDBY_TEMP_REACHED: u8 = 0x0C;
    pub const COOLING_TEMP_REACHED: u8 = 0x0D;
    pub const LMA_INIT_COMPLETE: u8 = 0x0E;
}

pub fn status_name(code: u8) -> &'static str {
    match code {
        status::BOOT_COMPLETE => "boot complete",
        status::TEST_MODE_COMPLETE => "test mode complete",
        status::UPPER_TEMP_OK => "upper temperature ok",
        status::FAN_SPEED_OK => "fan speed ok",
        status::LMA_INIT_OK => "lma init ok",
        status::OPERATING_TEMP_OK => "operating temperature ok",
        status::COOLING_TEMP_OK => "cooling temperature ok",
        status::TEMP_RESPONSE => "temperature response",
        status::STROKE_INIT_OK => "stroke init ok",
        status::TEMP_RISE_START => "temperature rise start",
        status::TEMP_FALL_START => "temperature fall start",
        status::OPERATING_TEMP_REACHED => "operating temperature reached",
        status::STANDBY_TEMP_REACHED => "standby temperature reached",
        status::COOLING_TEMP_REACHED => "cooling temperature reached",
        status::LMA_INIT_COMPLETE => "lma init complete",
        _ => "unknown",
    }
}

fn scaled(code: u8, celsius: f64) -> Result<f64, ProtocolError> {
    if !celsius.is_finite() {
        return Err(ProtocolError::BadPayload {
            code,
            reason: format!("temperature {celsius} is not finite"),
        });
    }
    Ok((celsius * TEMP_SCALE).round())
}

/// Setpoint as i16 tenths of a degree.
pub fn encode_temperature(code: u8, celsius: f64) -> Result<[u8; 2], ProtocolError> {
    let tenths = scaled(code, celsius)?;
    if tenths < f64::from(i16::MIN) || tenths > f64::from(i16::MAX) {
        return Err(ProtocolError::BadPayload {
            code,
            reason: format!("temperature {celsius} out of range"),
        });
    }
    #[allow(clippy::cast_possible_truncation)]
    let v = tenths as i16;
    Ok(v.to_be_bytes())
}

pub fn encode_test_mode(mode: TestMode) -> [u8; 4] {
    mode.wire_value().to_be_bytes()
}

fn encode_unsigned_tenths(code: u8, celsius: f64) -> Result<u32, ProtocolError> {
    let tenths = scaled(code, celsius)?;
    if tenths < 0.0 || tenths > f64::from(u32::MAX) {
        return Err(ProtocolError::BadPayload {
            code,
            reason: format!("temperature {celsius} cannot be sent unsigned"),
        });
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(tenths as u32)
}

/// Operating temp, standby temp (tenths) and hold time (ms), 3x u32.
pub fn encode_lma_init(params: StandbyHeating) -> Result<[u8; 12], ProtocolError> {
    let op = encode_unsigned_tenths(cmd::LMA_INIT, params.operating_temperature)?;
    let standby = encode_unsigned_tenths(cmd::LMA_INIT, params.standby_temperature)?;
    let mut out = [0u8; 12];
    out[..4].copy_from_slice(&op.to_be_bytes());
    out[4..8].copy_from_slice(&standby.to_be_bytes());
    out[8..].copy_from_slice(&params.hold_time_ms.to_be_bytes());
    Ok(out)
}

pub fn encode_fan_level(level: u8) -> Result<[u8; 1], ProtocolError> {
    if !(1..=10).contains(&level) {
        return Err(ProtocolError::BadPayload {
            code: cmd::SET_FAN_SPEED,
            reason: format!("fan level {level} outside 1..=10"),
        });
    }
    Ok([level])
}

/// Map a 0..=100 % fan request onto the MCU's 10 levels.
pub fn fan_level_from_percent(percent: f64) -> u8 {
    if !percent.is_finite() || percent <= 0.0 {
        return 1;
    }
    let level = (percent / 100.0 * 9.0).floor() + 1.0;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let level = level.clamp(1.0, 10.0) as u8;
    level
}

/// Temperature response: `(max, min)` in °C.
///
/// Accepts the 8-byte form (two u32 tenths) and the older 2-byte i16 form.
pub fn decode_temperature(payload: &[u8]) -> Result<(f64, f64), ProtocolError> {
    match payload.len() {
        8 => {
            let max = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            let min = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
            Ok((f64::from(max) / TEMP_SCALE, f64::from(min) / TEMP_SCALE))
        }
        2 => {
            let t = f64::from(i16::from_be_bytes([payload[0], payload[1]])) / TEMP_SCALE;
            Ok((t, t))
        }
        n => Err(ProtocolError::BadPayload {
            code: status::TEMP_RESPONSE,
            reason: format!("expected 8 or 2 bytes, got {n}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lma_init_matches_documented_payload() {
        let bytes = encode_lma_init(StandbyHeating {
            operating_temperature: 52.0,
            standby_temperature: 35.0,
            hold_time_ms: DEFAULT_HOLD_TIME_MS,
        })
        .unwrap();
        assert_eq!(
            bytes,
            [0x00, 0x00, 0x02, 0x08, 0x00, 0x00, 0x01, 0x5E, 0x00, 0x00, 0x27, 0x10]
        );
    }

    #[test]
    fn lma_init_rejects_negative_temperature() {
        let err = encode_lma_init(StandbyHeating {
            operating_temperature: -1.0,
            standby_temperature: 35.0,
            hold_time_ms: 0,
        })
        .unwrap_err();
        assert!(matches!(err, ProtocolError::BadPayload { code: 0x04, .. }));
    }

    #[test]
    fn temperature_setpoints_round_to_tenths() {
        assert_eq!(encode_temperature(0x02, 80.0).unwrap(), [0x03, 0x20]);
        assert_eq!(encode_temperature(0x05, 52.3).unwrap(), 523i16.to_be_bytes());
        assert_eq!(encode_temperature(0x06, -5.5).unwrap(), (-55i16).to_be_bytes());
        assert!(encode_temperature(0x02, f64::NAN).is_err());
        assert!(encode_temperature(0x02, 5000.0).is_err());
    }

    #[test]
    fn fan_percent_maps_onto_levels() {
        assert_eq!(fan_level_from_percent(0.0), 1);
        assert_eq!(fan_level_from_percent(10.0), 1);
        assert_eq!(fan_level_from_percent(50.0), 5);
        assert_eq!(fan_level_from_percent(100.0), 10);
        assert_eq!(fan_level_from_percent(250.0), 10);
        assert!(encode_fan_level(0).is_err());
        assert_eq!(encode_fan_level(10).unwrap(), [10]);
    }

    #[test]
    fn decodes_both_temperature_layouts() {
        let mut long = Vec::new();
        long.extend(523u32.to_be_bytes());
        long.extend(401u32.to_be_bytes());
        assert_eq!(decode_temperature(&long).unwrap(), (52.3, 40.1));
        assert_eq!(decode_temperature(&380i16.to_be_bytes()).unwrap(), (38.0, 38.0));
        assert!(decode_temperature(&[1, 2, 3]).is_err());
    }
}
