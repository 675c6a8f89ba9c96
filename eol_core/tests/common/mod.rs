#![allow(dead_code)]

use std::sync::Arc;

use eol_config::{SpecPoint, Stabilization, TestConfiguration};
use eol_core::HardwareOrchestrator;
use eol_hardware::mock::{
    MockDigitalIo, MockLoadCell, MockMcu, MockPowerAnalyzer, MockPowerSupply, MockRobot,
};
use eol_traits::{Mcu, PowerMeasurement, Robot};

pub const BRAKE: u16 = 3;

/// Mocks plus an orchestrator wired to them.
pub struct Rig {
    pub robot: Arc<MockRobot>,
    pub mcu: Arc<MockMcu>,
    pub loadcell: Arc<MockLoadCell>,
    pub power: Arc<MockPowerSupply>,
    pub dio: Arc<MockDigitalIo>,
    pub analyzer: Arc<MockPowerAnalyzer>,
    pub orchestrator: Arc<HardwareOrchestrator>,
}

impl Rig {
    /// Load cell reading a constant 5.0.
    pub fn new() -> Self {
        Self::with_model(|_, _| 5.0)
    }

    /// Load cell force computed from (temperature, robot position).
    pub fn with_model(model: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) -> Self {
        let robot = Arc::new(MockRobot::new());
        let mcu = Arc::new(MockMcu::new());
        let robot_dyn: Arc<dyn Robot> = robot.clone();
        let mcu_dyn: Arc<dyn Mcu> = mcu.clone();
        let loadcell = Arc::new(MockLoadCell::new().coupled(robot_dyn, mcu_dyn, 0, Arc::new(model)));
        let power = Arc::new(MockPowerSupply::new());
        let dio = Arc::new(MockDigitalIo::new(16));
        let analyzer = Arc::new(MockPowerAnalyzer::new().with_reading(PowerMeasurement {
            voltage: 18.0,
            current: 2.0,
            power: 36.0,
        }));
        let orchestrator = HardwareOrchestrator::builder()
            .robot(robot.clone())
            .mcu(mcu.clone())
            .loadcell(loadcell.clone())
            .power(power.clone())
            .digital_io(dio.clone())
            .power_analyzer(analyzer.clone())
            .brake_release_channel(Some(BRAKE))
            .build()
            .unwrap();
        Self {
            robot,
            mcu,
            loadcell,
            power,
            dio,
            analyzer,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Two temperatures by three strokes with every delay cut to the minimum.
pub fn fast_config() -> TestConfiguration {
    let mut c = TestConfiguration::default();
    c.temperature_list = vec![40.0, 50.0];
    c.stroke_positions = vec![10.0, 100.0, 200.0];
    c.stabilization = Stabilization {
        robot_move_ms: 0,
        temperature_ms: 0,
        power_ms: 0,
        loadcell_zero_ms: 0,
    };
    c.mcu.verify_interval_ms = 10;
    c.peak_force_duration_ms = 20;
    c.peak_force_interval_ms = 10;
    c.pass_criteria.min_stabilization_time_s = 0.0;
    c.pass_criteria.spec_points = vec![SpecPoint {
        temperature: 45.0,
        stroke: 100.0,
        upper: 10.0,
        lower: 0.0,
    }];
    c
}
