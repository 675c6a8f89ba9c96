use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use eol_hardware::axl::{AXT_RT_SUCCESS, AxlDigitalIo, AxlRobot, AxlSettings, DioBoard, MotionBoard, home};
use eol_traits::{Device, DigitalIo, MotionProfile, Robot};
use parking_lot::Mutex;

#[derive(Default)]
struct BoardState {
    servo: bool,
    home_results: VecDeque<u32>,
    motion_polls: u32,
    target: f64,
    position: f64,
    estops: u32,
    stalled: bool,
}

#[derive(Default)]
struct FakeMotion(Mutex<BoardState>);

impl MotionBoard for FakeMotion {
    fn open(&self, _irq: u8) -> u32 {
        AXT_RT_SUCCESS
    }
    fn close(&self) -> u32 {
        AXT_RT_SUCCESS
    }
    fn axis_count(&self) -> u32 {
        1
    }
    fn servo_on(&self, _axis: u8, on: bool) -> u32 {
        self.0.lock().servo = on;
        AXT_RT_SUCCESS
    }
    fn home_start(&self, _axis: u8) -> u32 {
        AXT_RT_SUCCESS
    }
    fn home_result(&self, _axis: u8) -> u32 {
        self.0.lock().home_results.pop_front().unwrap_or(home::SUCCESS)
    }
    fn move_start(&self, _axis: u8, position: f64, _v: f64, _a: f64, _d: f64) -> u32 {
        let mut s = self.0.lock();
        s.target = position;
        s.motion_polls = 3;
        AXT_RT_SUCCESS
    }
    fn in_motion(&self, _axis: u8) -> bool {
        let mut s = self.0.lock();
        if s.stalled {
            return true;
        }
        if s.motion_polls == 0 {
            s.position = s.target;
            false
        } else {
            s.motion_polls -= 1;
            true
        }
    }
    fn actual_position(&self, _axis: u8) -> f64 {
        self.0.lock().position
    }
    fn move_stop(&self, _axis: u8, _decel: f64) -> u32 {
        AXT_RT_SUCCESS
    }
    fn emergency_stop(&self, _axis: u8) -> u32 {
        self.0.lock().estops += 1;
        AXT_RT_SUCCESS
    }
    fn servo_alarm(&self, _axis: u8) -> bool {
        false
    }
}

fn settings() -> AxlSettings {
    AxlSettings {
        irq: 7,
        poll_interval: Duration::from_millis(1),
        motion_timeout: Duration::from_secs(2),
        home_timeout: Duration::from_secs(2),
    }
}

const PROFILE: MotionProfile = MotionProfile {
    velocity: 100.0,
    acceleration: 100.0,
    deceleration: 100.0,
};

#[tokio::test]
async fn homes_and_moves_by_polling_board() {
    let board = Arc::new(FakeMotion::default());
    board.0.lock().home_results = VecDeque::from(vec![home::SEARCHING, home::SEARCHING]);
    let robot = AxlRobot::new(board.clone(), settings());

    robot.connect().await.unwrap();
    assert!(robot.home_axis(0).await.is_err(), "servo still off");
    robot.enable_servo(0).await.unwrap();
    robot.home_axis(0).await.unwrap();
    robot.move_absolute(0, 42.5, PROFILE).await.unwrap();
    assert_eq!(robot.position(0).await.unwrap(), 42.5);

    robot.emergency_stop(0).await.unwrap();
    let s = board.0.lock();
    assert_eq!(s.estops, 1);
    assert!(!s.servo);
}

#[tokio::test]
async fn homing_error_code_is_reported() {
    let board = Arc::new(FakeMotion::default());
    board.0.lock().home_results = VecDeque::from(vec![home::SEARCHING, home::ERR_NOT_DETECT]);
    let robot = AxlRobot::new(board, settings());
    robot.connect().await.unwrap();
    robot.enable_servo(0).await.unwrap();
    let msg = robot.home_axis(0).await.unwrap_err().to_string();
    assert!(msg.contains("home sensor not detected"), "{msg}");
}

#[tokio::test]
async fn motion_that_never_settles_times_out() {
    let board = Arc::new(FakeMotion::default());
    let robot = AxlRobot::new(
        board.clone(),
        AxlSettings {
            motion_timeout: Duration::from_millis(30),
            ..settings()
        },
    );
    robot.connect().await.unwrap();
    robot.enable_servo(0).await.unwrap();
    board.0.lock().stalled = true;
    let err = robot.move_absolute(0, 10.0, PROFILE).await.unwrap_err();
    assert!(err.to_string().contains("still moving"), "{err}");
}

#[derive(Default)]
struct FakeDio {
    outputs: Mutex<HashMap<u16, bool>>,
    stuck: Option<u16>,
}

impl DioBoard for FakeDio {
    fn open(&self, _irq: u8) -> u32 {
        AXT_RT_SUCCESS
    }
    fn close(&self) -> u32 {
        AXT_RT_SUCCESS
    }
    fn input_count(&self) -> u16 {
        16
    }
    fn output_count(&self) -> u16 {
        16
    }
    fn read_input(&self, channel: u16) -> Result<bool, u32> {
        Ok(channel % 2 == 0)
    }
    fn write_output(&self, channel: u16, level: bool) -> u32 {
        if self.stuck != Some(channel) {
            self.outputs.lock().insert(channel, level);
        }
        AXT_RT_SUCCESS
    }
    fn read_output(&self, channel: u16) -> Result<bool, u32> {
        Ok(self.outputs.lock().get(&channel).copied().unwrap_or(false))
    }
}

#[tokio::test]
async fn dio_verifies_output_readback() {
    let dio = AxlDigitalIo::new(
        Arc::new(FakeDio {
            stuck: Some(5),
            ..FakeDio::default()
        }),
        7,
    );
    dio.connect().await.unwrap();
    assert!(dio.read_input(4).await.unwrap());
    dio.write_output(1, true).await.unwrap();
    let err = dio.write_output(5, true).await.unwrap_err();
    assert!(err.to_string().contains("reads back"), "{err}");
    assert!(dio.write_output(16, true).await.is_err(), "out of range");
    dio.reset_outputs().await.unwrap();
}
