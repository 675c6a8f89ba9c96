use std::time::Duration;

use eol_config::ValidationErrors;
use thiserror::Error;

use crate::status::TestStatus;

#[derive(Debug, Error, Clone)]
pub enum EolError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("evaluation failed: {failed_points} of {total_points} points out of bounds ({summary})")]
    Evaluation {
        failed_points: usize,
        total_points: usize,
        summary: String,
    },
    #[error("{device} connection failed: {reason}")]
    HardwareConnection { device: String, reason: String },
    #[error("{device} {operation} failed: {reason}")]
    HardwareOperation {
        device: String,
        operation: String,
        reason: String,
    },
    #[error("communication timeout: {0}")]
    CommunicationTimeout(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("invalid status transition {from} -> {to}")]
    InvalidState { from: TestStatus, to: TestStatus },
    #[error("a test is already running")]
    AlreadyRunning,
    #[error("test cancelled")]
    Cancelled,
    #[error("measurement phase exceeded {0:?}")]
    MaxDurationExceeded(Duration),
    #[error("repository error: {0}")]
    Repository(String),
    #[error("emergency stop active")]
    EmergencyStop,
}

impl EolError {
    pub fn operation(
        device: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::HardwareOperation {
            device: device.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing {0}")]
    MissingDevice(&'static str),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
