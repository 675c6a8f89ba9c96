//! The persisted record of one test.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::EolError;
use crate::measurement::MeasurementSet;
use crate::status::TestStatus;

/// Owned and mutated only by the execution engine while the test runs;
/// frozen once it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestEntity {
    pub test_id: Uuid,
    pub dut: String,
    pub operator_id: String,
    pub profile: String,
    status: TestStatus,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    measurements: MeasurementSet,
    error_message: Option<String>,
}

impl TestEntity {
    pub fn new(
        dut: impl Into<String>,
        operator_id: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            test_id: Uuid::new_v4(),
            dut: dut.into(),
            operator_id: operator_id.into(),
            profile: profile.into(),
            status: TestStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            measurements: MeasurementSet::new(),
            error_message: None,
        }
    }

    pub const fn status(&self) -> TestStatus {
        self.status
    }

    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub const fn measurements(&self) -> &MeasurementSet {
        &self.measurements
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Wall time between start and completion, when both are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    pub fn record_measurements(&mut self, measurements: MeasurementSet) -> Result<(), EolError> {
        self.ensure_mutable()?;
        self.measurements = measurements;
        Ok(())
    }

    /// CREATED -> RUNNING
    pub fn start(&mut self) -> Result<(), EolError> {
        self.transition(TestStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// RUNNING -> COMPLETED (evaluation passed)
    pub fn complete(&mut self) -> Result<(), EolError> {
        self.finish(TestStatus::Completed, None)
    }

    /// RUNNING -> FAILED (evaluation rejected the measurements)
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), EolError> {
        self.finish(TestStatus::Failed, Some(reason.into()))
    }

    /// RUNNING -> ERROR (execution fault)
    pub fn error(&mut self, reason: impl Into<String>) -> Result<(), EolError> {
        self.finish(TestStatus::Error, Some(reason.into()))
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), EolError> {
        self.finish(TestStatus::Cancelled, Some(reason.into()))
    }

    fn finish(&mut self, to: TestStatus, reason: Option<String>) -> Result<(), EolError> {
        self.transition(to)?;
        self.completed_at = Some(Utc::now());
        self.error_message = reason;
        Ok(())
    }

    fn transition(&mut self, to: TestStatus) -> Result<(), EolError> {
        if !self.status.can_transition_to(to) {
            return Err(EolError::InvalidState {
                from: self.status,
                to,
            });
        }
        tracing::debug!(test_id = %self.test_id, from = %self.status, to = %to, "test status");
        self.status = to;
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), EolError> {
        if self.status.is_terminal() {
            Err(EolError::InvalidState {
                from: self.status,
                to: self.status,
            })
        } else {
            Ok(())
        }
    }
}
