#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Test-rig core (hardware-agnostic).
//!
//! Everything here talks to devices through the `eol_traits` capability
//! traits, so the same engine drives mocks in tests and the real rig in
//! production.
//!
//! ## Architecture
//!
//! - **Orchestration**: device sequencing for one test (`orchestrator`)
//! - **Execution**: the per-test state machine and result (`engine`)
//! - **Evaluation**: interpolated force bounds and pass/fail (`evaluator`)
//! - **Safety**: emergency stop latch and controller (`estop`)
//! - **Records**: test entity, measurements, persistence seam
//!
//! Errors are typed as [`EolError`] inside the crate; builders and outer
//! surfaces use [`eyre::Report`].

pub mod engine;
pub mod entity;
pub mod error;
pub mod estop;
pub mod evaluator;
pub mod hw_error;
pub mod measurement;
pub mod orchestrator;
pub mod repository;
pub mod status;

pub use engine::{
    CancelHandle, ConfigurationLoader, EngineStatus, TestCommand, TestExecutionEngine, TestResult,
};
pub use entity::TestEntity;
pub use error::{BuildError, EolError, Report, Result};
pub use estop::{EmergencyLatch, EmergencyStopController, EmergencyStopReport, ExecutionProbe};
pub use evaluator::{Bounds, Evaluation, ExceededBound, PassCriteriaEvaluator, Violation};
pub use hw_error::{ClassifiedError, ErrorCategory, classify, map_hw_error};
pub use measurement::{MeasuredPoint, Measurement, MeasurementSet};
pub use orchestrator::{DeviceHandles, HardwareOrchestrator, RobotState, ShutdownReport};
pub use repository::{InMemoryRepository, TestRepository};
pub use status::TestStatus;
