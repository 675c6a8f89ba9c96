//! Test execution: one test from profile to persisted result.
//!
//! ```text
//! load + validate ─► save entity ─► start
//!   connect ─► initialize ─► setup ─► [integration] ─► measure ─► teardown ─► evaluate
//! finally: shutdown ─► record measurements ─► update entity
//! ```
//!
//! Only one test runs at a time. Every test that got as far as a saved entity
//! ends in a terminal status and a shutdown, whatever happened in between.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eol_config::{ProfileDir, ProfileError, TestConfiguration};
use eol_traits::IntegrationValues;
use eol_traits::clock::{Clock, MonotonicClock};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::entity::TestEntity;
use crate::error::EolError;
use crate::estop::{EmergencyStopController, ExecutionProbe};
use crate::evaluator::{Evaluation, PassCriteriaEvaluator, Violation};
use crate::hw_error::{ErrorCategory, classify};
use crate::measurement::{Measurement, MeasurementSet};
use crate::orchestrator::HardwareOrchestrator;
use crate::repository::TestRepository;
use crate::status::TestStatus;

/// Request to run one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCommand {
    pub profile: String,
    pub dut: String,
    pub operator_id: String,
}

impl TestCommand {
    pub fn new(
        profile: impl Into<String>,
        dut: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> Self {
        Self {
            profile: profile.into(),
            dut: dut.into(),
            operator_id: operator_id.into(),
        }
    }
}

/// Resolves a profile name to a test configuration.
pub trait ConfigurationLoader: Send + Sync {
    fn load_configuration(&self, profile: &str) -> Result<TestConfiguration, EolError>;
}

impl ConfigurationLoader for ProfileDir {
    fn load_configuration(&self, profile: &str) -> Result<TestConfiguration, EolError> {
        self.load(profile).map_err(|e: ProfileError| EolError::Configuration(e.to_string()))
    }
}

/// A fixed configuration, whatever profile is asked for.
impl ConfigurationLoader for TestConfiguration {
    fn load_configuration(&self, _profile: &str) -> Result<TestConfiguration, EolError> {
        Ok(self.clone())
    }
}

#[derive(Debug, Default)]
struct ExecutionContext {
    running: AtomicBool,
    current: Mutex<Option<Uuid>>,
}

impl ExecutionProbe for ExecutionContext {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn current_test_id(&self) -> Option<Uuid> {
        *self.current.lock()
    }
}

/// Clears the running flag when an execution ends, however it ends.
struct RunGuard<'a>(&'a ExecutionContext);

impl RunGuard<'_> {
    fn acquire(ctx: &ExecutionContext) -> Option<RunGuard<'_>> {
        ctx.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(ctx))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.0.current.lock() = None;
        self.0.running.store(false, Ordering::Release);
    }
}

/// Requests cancellation of the running test. Cloneable and usable from any
/// task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        tracing::warn!("test cancellation requested");
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub test_id: Option<Uuid>,
    pub status: TestStatus,
    pub is_passed: bool,
    pub duration_ms: u64,
    pub measurements: Vec<Measurement>,
    pub violations: Vec<Violation>,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub energy: Option<IntegrationValues>,
}

impl TestResult {
    /// Result for a request refused before any entity existed.
    fn rejected(err: &EolError) -> Self {
        Self {
            test_id: None,
            status: TestStatus::Error,
            is_passed: false,
            duration_ms: 0,
            measurements: Vec::new(),
            violations: Vec::new(),
            error_message: Some(err.to_string()),
            error_category: Some(err.category()),
            energy: None,
        }
    }
}

/// Health snapshot for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub current_test_id: Option<Uuid>,
    pub emergency_stop: bool,
    pub hardware: std::collections::BTreeMap<String, bool>,
}

struct RunOutcome {
    evaluation: Evaluation,
    energy: Option<IntegrationValues>,
}

type Phased<T> = Result<T, (&'static str, EolError)>;

fn at<T>(phase: &'static str, r: Result<T, EolError>) -> Phased<T> {
    r.map_err(|e| (phase, e))
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct TestExecutionEngine {
    orchestrator: Arc<HardwareOrchestrator>,
    loader: Arc<dyn ConfigurationLoader>,
    repository: Arc<dyn TestRepository>,
    context: Arc<ExecutionContext>,
    cancel: Arc<watch::Sender<bool>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TestExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestExecutionEngine")
            .field("orchestrator", &self.orchestrator)
            .field("running", &self.context.is_running())
            .finish_non_exhaustive()
    }
}

impl TestExecutionEngine {
    pub fn new(
        orchestrator: Arc<HardwareOrchestrator>,
        loader: Arc<dyn ConfigurationLoader>,
        repository: Arc<dyn TestRepository>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            orchestrator,
            loader,
            repository,
            context: Arc::new(ExecutionContext::default()),
            cancel: Arc::new(cancel),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    /// Give `controller` a read-only view of this engine's execution state.
    #[must_use]
    pub fn with_emergency_stop(self, controller: &EmergencyStopController) -> Self {
        controller.attach_probe(self.context.clone());
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.context.is_running(),
            current_test_id: self.context.current_test_id(),
            emergency_stop: self.orchestrator.latch().is_active(),
            hardware: self.orchestrator.hardware_status(),
        }
    }

    /// Run one test to a terminal result. Never panics on device faults and
    /// never leaves the rig powered.
    pub async fn execute(&self, cmd: TestCommand) -> TestResult {
        if self.orchestrator.latch().is_active() {
            tracing::error!(profile = %cmd.profile, "refusing to start: emergency stop active");
            return TestResult::rejected(&EolError::EmergencyStop);
        }
        let Some(_guard) = RunGuard::acquire(&self.context) else {
            tracing::warn!(profile = %cmd.profile, "refusing to start: a test is already running");
            return TestResult::rejected(&EolError::AlreadyRunning);
        };
        self.cancel.send_replace(false);
        let cancel_rx = self.cancel.subscribe();
        let epoch = self.clock.now();

        let config = match self.load(&cmd.profile) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(profile = %cmd.profile, error = %e, "configuration rejected");
                return TestResult::rejected(&e);
            }
        };

        let dut = if cmd.dut.is_empty() {
            config.dut.clone().unwrap_or_default()
        } else {
            cmd.dut.clone()
        };
        let operator = if cmd.operator_id.is_empty() {
            config.operator_id.clone().unwrap_or_default()
        } else {
            cmd.operator_id.clone()
        };
        let entity = TestEntity::new(dut, operator, cmd.profile.clone());
        if let Err(e) = self.repository.save(&entity).await {
            tracing::error!(error = %e, "could not persist new test");
            return TestResult::rejected(&e);
        }
        *self.context.current.lock() = Some(entity.test_id);

        let span = tracing::info_span!("test", test_id = %entity.test_id, dut = %entity.dut);
        self.run_saved(entity, &config, cancel_rx, epoch)
            .instrument(span)
            .await
    }

    async fn run_saved(
        &self,
        mut entity: TestEntity,
        config: &TestConfiguration,
        mut cancel_rx: watch::Receiver<bool>,
        epoch: std::time::Instant,
    ) -> TestResult {
        tracing::info!(profile = %entity.profile, operator = %entity.operator_id, "test started");

        let mut measurements = MeasurementSet::new();
        let outcome = match entity.start() {
            Ok(()) => self.run(config, &mut measurements, &mut cancel_rx).await,
            Err(e) => Err(("start", e)),
        };

        if let Err(e) = entity.record_measurements(measurements.clone()) {
            tracing::error!(error = %e, "could not record measurements");
        }

        let mut result = TestResult {
            test_id: Some(entity.test_id),
            status: TestStatus::Error,
            is_passed: false,
            duration_ms: 0,
            measurements: measurements.into_vec(),
            violations: Vec::new(),
            error_message: None,
            error_category: None,
            energy: None,
        };

        let transition = match outcome {
            Ok(run) if run.evaluation.passed => {
                tracing::info!(points = run.evaluation.checked, "test passed");
                result.is_passed = true;
                result.energy = run.energy;
                entity.complete()
            }
            Ok(run) => {
                let summary = run.evaluation.summary();
                let err = run.evaluation.clone().into_result().err();
                tracing::warn!(
                    violations = run.evaluation.violations.len(),
                    summary = %summary,
                    "test failed evaluation"
                );
                result.error_message = err.as_ref().map(ToString::to_string);
                result.error_category = Some(ErrorCategory::Evaluation);
                result.violations = run.evaluation.violations;
                result.energy = run.energy;
                entity.fail(summary)
            }
            Err((phase, e)) => {
                let classified = classify(&eyre::Report::new(e.clone()), phase);
                tracing::error!(
                    phase,
                    category = ?classified.category,
                    device = ?classified.device,
                    operation = ?classified.operation,
                    retryable = classified.retryable,
                    error = %classified.message,
                    "test aborted"
                );
                result.error_message = Some(classified.message.clone());
                result.error_category = Some(classified.category);
                if matches!(e, EolError::Cancelled) {
                    entity.cancel(classified.message)
                } else {
                    entity.error(classified.message)
                }
            }
        };
        if let Err(e) = transition {
            tracing::error!(error = %e, "status transition rejected");
        }
        result.status = entity.status();

        let report = self.orchestrator.shutdown(config.axis).await;
        if !report.is_clean() {
            tracing::warn!(failed = ?report.failed, "shutdown incomplete");
        }
        if let Err(e) = self.repository.update(&entity).await {
            tracing::error!(error = %e, "could not persist final test state");
        }

        result.duration_ms = self.clock.elapsed_ms(epoch);
        tracing::info!(status = %result.status, duration_ms = result.duration_ms, "test finished");
        result
    }

    fn load(&self, profile: &str) -> Result<TestConfiguration, EolError> {
        let config = self.loader.load_configuration(profile)?;
        config.validate()?;
        Ok(config)
    }

    fn checkpoint(&self, rx: &watch::Receiver<bool>) -> Result<(), EolError> {
        if *rx.borrow() {
            return Err(EolError::Cancelled);
        }
        if self.orchestrator.latch().is_active() {
            return Err(EolError::EmergencyStop);
        }
        Ok(())
    }

    async fn run(
        &self,
        cfg: &TestConfiguration,
        sink: &mut MeasurementSet,
        cancel: &mut watch::Receiver<bool>,
    ) -> Phased<RunOutcome> {
        let o = &*self.orchestrator;

        at("connect", self.checkpoint(cancel))?;
        let connect_limit = Duration::from_secs(cfg.timeout_seconds);
        let connected = tokio::time::timeout(connect_limit, o.connect_all())
            .await
            .unwrap_or_else(|_| {
                Err(EolError::CommunicationTimeout(format!(
                    "device connection exceeded {connect_limit:?}"
                )))
            });
        at("connect", connected)?;

        at("initialize", self.checkpoint(cancel))?;
        at("initialize", o.initialize_hardware(cfg).await)?;
        at("setup", self.checkpoint(cancel))?;
        at("setup", o.setup_test(cfg).await)?;
        at("measure", self.checkpoint(cancel))?;

        let limit = cfg.pass_criteria.max_test_duration();
        if cfg.power_integration {
            at("measure", o.start_power_integration(limit).await)?;
        }

        let measured = tokio::select! {
            biased;
            () = cancelled(cancel) => Err(EolError::Cancelled),
            r = tokio::time::timeout(limit, o.perform_measurement_sequence(cfg, sink)) => {
                r.unwrap_or(Err(EolError::MaxDurationExceeded(limit)))
            }
        };

        let energy = if cfg.power_integration {
            match o.stop_power_integration().await {
                Ok(v) => v,
                Err(e) if measured.is_err() => {
                    tracing::warn!(error = %e, "power integration stop failed");
                    None
                }
                Err(e) => return Err(("measure", e)),
            }
        } else {
            None
        };
        at("measure", measured)?;

        at("teardown", self.checkpoint(cancel))?;
        o.teardown_test(cfg).await;

        let evaluator = PassCriteriaEvaluator::new(&cfg.pass_criteria);
        let evaluation = evaluator.evaluate(&sink.averaged());
        Ok(RunOutcome { evaluation, energy })
    }
}
