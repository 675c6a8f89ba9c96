//! Ajinextek AXL motion and digital-I/O boards.
//!
//! The vendor library is reached through [`MotionBoard`] / [`DioBoard`]: plain
//! blocking calls returning AXL status codes. The async drivers run every call
//! on the blocking pool. Binding the vendor library itself is left to the
//! board implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eol_traits::{Device, DeviceResult, DeviceStatus, DigitalIo, MotionProfile, Robot};

use crate::error::HwError;

pub const AXT_RT_SUCCESS: u32 = 0;

pub mod home {
    pub const SUCCESS: u32 = 0x01;
    pub const SEARCHING: u32 = 0x02;
    pub const ERR_GNT_RANGE: u32 = 0x10;
    pub const ERR_USER_BREAK: u32 = 0x11;
    pub const ERR_VELOCITY: u32 = 0x12;
    pub const ERR_AMP_FAULT: u32 = 0x13;
    pub const ERR_NEG_LIMIT: u32 = 0x14;
    pub const ERR_POS_LIMIT: u32 = 0x15;
    pub const ERR_NOT_DETECT: u32 = 0x16;
    pub const ERR_UNKNOWN: u32 = 0xFF;
}

pub fn home_error_message(code: u32) -> &'static str {
    match code {
        home::ERR_UNKNOWN => "unknown axis number",
        home::ERR_GNT_RANGE => "gantry offset out of range",
        home::ERR_USER_BREAK => "homing stopped by user",
        home::ERR_VELOCITY => "invalid velocity setting",
        home::ERR_AMP_FAULT => "servo amplifier alarm",
        home::ERR_NEG_LIMIT => "negative limit sensor detected",
        home::ERR_POS_LIMIT => "positive limit sensor detected",
        home::ERR_NOT_DETECT => "home sensor not detected",
        _ => "unexpected homing result",
    }
}

/// Blocking motion-board calls. Return values are AXL status codes unless noted.
pub trait MotionBoard: Send + Sync + 'static {
    fn open(&self, irq: u8) -> u32;
    fn close(&self) -> u32;
    fn axis_count(&self) -> u32;
    fn servo_on(&self, axis: u8, on: bool) -> u32;
    fn home_start(&self, axis: u8) -> u32;
    /// Home result code (see [`home`]), not a status code.
    fn home_result(&self, axis: u8) -> u32;
    fn move_start(&self, axis: u8, position: f64, velocity: f64, accel: f64, decel: f64) -> u32;
    fn in_motion(&self, axis: u8) -> bool;
    fn actual_position(&self, axis: u8) -> f64;
    fn move_stop(&self, axis: u8, decel: f64) -> u32;
    fn emergency_stop(&self, axis: u8) -> u32;
    fn servo_alarm(&self, axis: u8) -> bool;
}

/// Blocking DIO-board calls.
pub trait DioBoard: Send + Sync + 'static {
    fn open(&self, irq: u8) -> u32;
    fn close(&self) -> u32;
    fn input_count(&self) -> u16;
    fn output_count(&self) -> u16;
    fn read_input(&self, channel: u16) -> Result<bool, u32>;
    fn write_output(&self, channel: u16, level: bool) -> u32;
    fn read_output(&self, channel: u16) -> Result<bool, u32>;
}

async fn blocking<B, R, F>(board: &Arc<B>, f: F) -> Result<R, HwError>
where
    B: Send + Sync + 'static + ?Sized,
    R: Send + 'static,
    F: FnOnce(&B) -> R + Send + 'static,
{
    let board = Arc::clone(board);
    tokio::task::spawn_blocking(move || f(board.as_ref()))
        .await
        .map_err(|e| HwError::Io(std::io::Error::other(e)))
}

fn check(device: &'static str, operation: &'static str, code: u32) -> Result<(), HwError> {
    if code == AXT_RT_SUCCESS {
        Ok(())
    } else {
        Err(HwError::operation(device, operation, format!("AXL status {code}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AxlSettings {
    pub irq: u8,
    pub poll_interval: Duration,
    pub motion_timeout: Duration,
    pub home_timeout: Duration,
}

impl Default for AxlSettings {
    fn default() -> Self {
        Self {
            irq: 7,
            poll_interval: Duration::from_millis(100),
            motion_timeout: Duration::from_secs(30),
            home_timeout: Duration::from_secs(60),
        }
    }
}

const ROBOT: &str = "robot";

pub struct AxlRobot<B: ?Sized> {
    board: Arc<B>,
    settings: AxlSettings,
    connected: AtomicBool,
    servo: AtomicBool,
}

impl<B: MotionBoard + ?Sized> AxlRobot<B> {
    pub fn new(board: Arc<B>, settings: AxlSettings) -> Self {
        Self {
            board,
            settings,
            connected: AtomicBool::new(false),
            servo: AtomicBool::new(false),
        }
    }

    fn ensure_connected(&self) -> Result<(), HwError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(HwError::NotConnected { device: ROBOT })
        }
    }

    fn ensure_servo(&self, operation: &'static str) -> Result<(), HwError> {
        self.ensure_connected()?;
        if self.servo.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(HwError::operation(ROBOT, operation, "servo is not enabled"))
        }
    }

    async fn wait_motion_done(&self, axis: u8) -> Result<(), HwError> {
        let board = &self.board;
        let poll = self.settings.poll_interval;
        let wait = async {
            loop {
                if !blocking(board, move |b| b.in_motion(axis)).await? {
                    return Ok::<_, HwError>(());
                }
                tokio::time::sleep(poll).await;
            }
        };
        tokio::time::timeout(self.settings.motion_timeout, wait)
            .await
            .map_err(|_| {
                HwError::operation(
                    ROBOT,
                    "move_absolute",
                    format!("axis {axis} still moving after {:?}", self.settings.motion_timeout),
                )
            })?
    }
}

#[async_trait]
impl<B: MotionBoard + ?Sized> Device for AxlRobot<B> {
    fn name(&self) -> &'static str {
        ROBOT
    }

    async fn connect(&self) -> DeviceResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let irq = self.settings.irq;
        check(ROBOT, "connect", blocking(&self.board, move |b| b.open(irq)).await?)?;
        let axes = blocking(&self.board, |b| b.axis_count()).await?;
        if axes == 0 {
            let _ = blocking(&self.board, |b| b.close()).await;
            return Err(HwError::operation(ROBOT, "connect", "no motion axes detected").into());
        }
        self.servo.store(false, Ordering::Release);
        self.connected.store(true, Ordering::Release);
        tracing::info!(irq, axes, "axl motion board opened");
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.servo.store(false, Ordering::Release);
        check(ROBOT, "disconnect", blocking(&self.board, |b| b.close()).await?)?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let mut out = DeviceStatus::new();
        out.insert("connected".into(), self.is_connected().to_string());
        out.insert("servo_enabled".into(), self.servo.load(Ordering::Acquire).to_string());
        out.insert("hardware_type".into(), "AJINEXTEK".into());
        if self.is_connected() {
            let (pos, alarm) = blocking(&self.board, |b| (b.actual_position(0), b.servo_alarm(0))).await?;
            out.insert("position".into(), format!("{pos:.3}"));
            out.insert("servo_alarm".into(), alarm.to_string());
        }
        Ok(out)
    }
}

#[async_trait]
impl<B: MotionBoard + ?Sized> Robot for AxlRobot<B> {
    async fn enable_servo(&self, axis: u8) -> DeviceResult<()> {
        self.ensure_connected()?;
        check(ROBOT, "enable_servo", blocking(&self.board, move |b| b.servo_on(axis, true)).await?)?;
        self.servo.store(true, Ordering::Release);
        tracing::info!(axis, "servo enabled");
        Ok(())
    }

    async fn disable_servo(&self, axis: u8) -> DeviceResult<()> {
        self.ensure_connected()?;
        check(ROBOT, "disable_servo", blocking(&self.board, move |b| b.servo_on(axis, false)).await?)?;
        self.servo.store(false, Ordering::Release);
        tracing::info!(axis, "servo disabled");
        Ok(())
    }

    async fn home_axis(&self, axis: u8) -> DeviceResult<()> {
        self.ensure_servo("home_axis")?;
        check(ROBOT, "home_axis", blocking(&self.board, move |b| b.home_start(axis)).await?)?;
        tracing::info!(axis, "homing started");

        let board = &self.board;
        let poll = self.settings.poll_interval;
        let watch = async {
            loop {
                match blocking(board, move |b| b.home_result(axis)).await? {
                    home::SUCCESS => return Ok::<_, HwError>(()),
                    home::SEARCHING => tokio::time::sleep(poll).await,
                    code => {
                        return Err(HwError::operation(
                            ROBOT,
                            "home_axis",
                            format!("axis {axis}: {} (0x{code:02X})", home_error_message(code)),
                        ));
                    }
                }
            }
        };
        tokio::time::timeout(self.settings.home_timeout, watch)
            .await
            .map_err(|_| HwError::operation(ROBOT, "home_axis", format!("axis {axis} homing timed out")))??;
        tracing::info!(axis, "homing complete");
        Ok(())
    }

    async fn move_absolute(&self, axis: u8, position: f64, profile: MotionProfile) -> DeviceResult<()> {
        self.ensure_servo("move_absolute")?;
        let MotionProfile {
            velocity,
            acceleration,
            deceleration,
        } = profile;
        if velocity <= 0.0 || acceleration <= 0.0 || deceleration <= 0.0 {
            return Err(HwError::operation(ROBOT, "move_absolute", "motion profile must be positive").into());
        }
        check(
            ROBOT,
            "move_absolute",
            blocking(&self.board, move |b| {
                b.move_start(axis, position, velocity, acceleration, deceleration)
            })
            .await?,
        )?;
        self.wait_motion_done(axis).await?;
        tracing::debug!(axis, position, "move complete");
        Ok(())
    }

    async fn position(&self, axis: u8) -> DeviceResult<f64> {
        self.ensure_connected()?;
        Ok(blocking(&self.board, move |b| b.actual_position(axis)).await?)
    }

    async fn stop_motion(&self, axis: u8, deceleration: f64) -> DeviceResult<()> {
        self.ensure_connected()?;
        check(ROBOT, "stop_motion", blocking(&self.board, move |b| b.move_stop(axis, deceleration)).await?)?;
        Ok(())
    }

    async fn emergency_stop(&self, axis: u8) -> DeviceResult<()> {
        self.ensure_connected()?;
        tracing::warn!(axis, "robot emergency stop");
        let (stop, servo_off) = blocking(&self.board, move |b| (b.emergency_stop(axis), b.servo_on(axis, false))).await?;
        if servo_off == AXT_RT_SUCCESS {
            self.servo.store(false, Ordering::Release);
        } else {
            tracing::warn!(axis, code = servo_off, "servo off failed during emergency stop");
        }
        check(ROBOT, "emergency_stop", stop)?;
        Ok(())
    }
}

const DIO: &str = "digital_io";

pub struct AxlDigitalIo<B: ?Sized> {
    board: Arc<B>,
    irq: u8,
    connected: AtomicBool,
    channels: parking_lot::Mutex<(u16, u16)>,
}

impl<B: DioBoard + ?Sized> AxlDigitalIo<B> {
    pub fn new(board: Arc<B>, irq: u8) -> Self {
        Self {
            board,
            irq,
            connected: AtomicBool::new(false),
            channels: parking_lot::Mutex::new((0, 0)),
        }
    }

    fn ensure_channel(&self, operation: &'static str, channel: u16, output: bool) -> Result<(), HwError> {
        if !self.is_connected() {
            return Err(HwError::NotConnected { device: DIO });
        }
        let (inputs, outputs) = *self.channels.lock();
        let limit = if output { outputs } else { inputs };
        if channel >= limit {
            return Err(HwError::operation(
                DIO,
                operation,
                format!("channel {channel} out of range (0..{limit})"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<B: DioBoard + ?Sized> Device for AxlDigitalIo<B> {
    fn name(&self) -> &'static str {
        DIO
    }

    async fn connect(&self) -> DeviceResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        let irq = self.irq;
        check(DIO, "connect", blocking(&self.board, move |b| b.open(irq)).await?)?;
        let counts = blocking(&self.board, |b| (b.input_count(), b.output_count())).await?;
        *self.channels.lock() = counts;
        self.connected.store(true, Ordering::Release);
        tracing::info!(inputs = counts.0, outputs = counts.1, "axl dio board opened");
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        if self.connected.swap(false, Ordering::AcqRel) {
            check(DIO, "disconnect", blocking(&self.board, |b| b.close()).await?)?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn status(&self) -> DeviceResult<DeviceStatus> {
        let (inputs, outputs) = *self.channels.lock();
        let mut out = DeviceStatus::new();
        out.insert("connected".into(), self.is_connected().to_string());
        out.insert("inputs".into(), inputs.to_string());
        out.insert("outputs".into(), outputs.to_string());
        Ok(out)
    }
}

#[async_trait]
impl<B: DioBoard + ?Sized> DigitalIo for AxlDigitalIo<B> {
    async fn read_input(&self, channel: u16) -> DeviceResult<bool> {
        self.ensure_channel("read_input", channel, false)?;
        blocking(&self.board, move |b| b.read_input(channel))
            .await?
            .map_err(|code| HwError::operation(DIO, "read_input", format!("AXL status {code}")).into())
    }

    async fn write_output(&self, channel: u16, level: bool) -> DeviceResult<()> {
        self.ensure_channel("write_output", channel, true)?;
        let readback = blocking(&self.board, move |b| {
            match b.write_output(channel, level) {
                AXT_RT_SUCCESS => b.read_output(channel),
                code => Err(code),
            }
        })
        .await?
        .map_err(|code| HwError::operation(DIO, "write_output", format!("AXL status {code}")))?;
        if readback != level {
            return Err(HwError::operation(
                DIO,
                "write_output",
                format!("channel {channel} reads back {readback} after writing {level}"),
            )
            .into());
        }
        Ok(())
    }

    async fn reset_outputs(&self) -> DeviceResult<()> {
        if !self.is_connected() {
            return Err(HwError::NotConnected { device: DIO }.into());
        }
        let outputs = self.channels.lock().1;
        let failed: Vec<u16> = blocking(&self.board, move |b| {
            (0..outputs)
                .filter(|&ch| b.write_output(ch, false) != AXT_RT_SUCCESS)
                .collect()
        })
        .await?;
        if failed.is_empty() {
            Ok(())
        } else {
            Err(HwError::operation(DIO, "reset_outputs", format!("channels {failed:?} did not reset")).into())
        }
    }
}
