//! Emergency stop: a one-way latch, independent of normal teardown.
//!
//! `execute_emergency_stop` goes straight to the robot and power supply,
//! bypassing whatever exchange the test is in the middle of. The running
//! test is never cancelled directly; the hardware faults it then sees make
//! it fail through its own error path. Only an explicit `reset` clears the
//! latch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use eol_traits::{Device, DeviceResult, DeviceStatus};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::orchestrator::{DeviceHandles, HardwareOrchestrator};

const STATUS_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct LatchState {
    active: AtomicBool,
    activated_at: Mutex<Option<DateTime<Utc>>>,
}

/// Shared read-only view of the emergency state.
#[derive(Debug, Clone, Default)]
pub struct EmergencyLatch {
    inner: Arc<LatchState>,
}

impl EmergencyLatch {
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.activated_at.lock()
    }

    fn set(&self) {
        *self.inner.activated_at.lock() = Some(Utc::now());
        self.inner.active.store(true, Ordering::Release);
    }

    fn clear(&self) {
        self.inner.active.store(false, Ordering::Release);
        *self.inner.activated_at.lock() = None;
    }
}

async fn query_status<D: Device + ?Sized>(device: &D) -> Option<(String, DeviceStatus)> {
    let r: Result<DeviceResult<DeviceStatus>, _> =
        tokio::time::timeout(STATUS_QUERY_TIMEOUT, device.status()).await;
    match r {
        Ok(Ok(status)) => {
            tracing::info!(device = device.name(), status = ?status, "post-stop status");
            Some((device.name().to_string(), status))
        }
        Ok(Err(e)) => {
            tracing::warn!(device = device.name(), error = %e, "post-stop status failed");
            None
        }
        Err(_) => {
            tracing::warn!(device = device.name(), "post-stop status timed out");
            None
        }
    }
}

/// What the controller may ask of the execution side.
pub trait ExecutionProbe: Send + Sync {
    fn is_running(&self) -> bool;
    fn current_test_id(&self) -> Option<Uuid>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmergencyEvent {
    pub activated_at: DateTime<Utc>,
    pub test_id: Option<Uuid>,
    pub robot_stopped: bool,
    pub power_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmergencyStopReport {
    pub robot_stopped: bool,
    pub power_disabled: bool,
    pub test_was_running: bool,
    pub test_id: Option<Uuid>,
    /// Device name to status, for the devices that answered.
    pub device_status: Vec<(String, DeviceStatus)>,
}

pub struct EmergencyStopController {
    hw: DeviceHandles,
    axis: u8,
    latch: EmergencyLatch,
    probe: Mutex<Option<Arc<dyn ExecutionProbe>>>,
    events: broadcast::Sender<EmergencyEvent>,
}

impl std::fmt::Debug for EmergencyStopController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyStopController")
            .field("axis", &self.axis)
            .field("active", &self.latch.is_active())
            .finish_non_exhaustive()
    }
}

impl EmergencyStopController {
    /// Controller acting on the orchestrator's robot and power supply and
    /// sharing its latch.
    pub fn new(orchestrator: &HardwareOrchestrator) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            hw: orchestrator.handles(),
            axis: 0,
            latch: orchestrator.latch(),
            probe: Mutex::new(None),
            events,
        }
    }

    #[must_use]
    pub fn with_axis(mut self, axis: u8) -> Self {
        self.axis = axis;
        self
    }

    pub fn attach_probe(&self, probe: Arc<dyn ExecutionProbe>) {
        *self.probe.lock() = Some(probe);
    }

    pub fn is_active(&self) -> bool {
        self.latch.is_active()
    }

    pub fn activated_at(&self) -> Option<DateTime<Utc>> {
        self.latch.activated_at()
    }

    pub fn latch(&self) -> EmergencyLatch {
        self.latch.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EmergencyEvent> {
        self.events.subscribe()
    }

    /// Stop motion and cut power, then report. Never fails; every step is
    /// attempted regardless of the others.
    pub async fn execute_emergency_stop(&self) -> EmergencyStopReport {
        self.latch.set();
        tracing::error!(axis = self.axis, "EMERGENCY STOP");

        // Phase 1: hardware, both calls issued together.
        let (robot, power) = tokio::join!(
            self.hw.robot.emergency_stop(self.axis),
            self.hw.power.disable_output()
        );
        let robot_stopped = match robot {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(device = "robot", error = %e, "emergency stop: robot stop failed");
                false
            }
        };
        let power_disabled = match power {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(device = "power", error = %e, "emergency stop: power disable failed");
                false
            }
        };

        // Phase 2: the running test fails on its own once it touches hardware.
        let probe = self.probe.lock().clone();
        let (test_was_running, test_id) =
            probe.map_or((false, None), |p| (p.is_running(), p.current_test_id()));
        if test_was_running {
            tracing::warn!(test_id = ?test_id, "emergency stop during test; execution will fail on next hardware access");
        }

        // Phase 3: best-effort status and notification.
        let h = &self.hw;
        let (robot_s, mcu_s, loadcell_s, power_s, dio_s) = tokio::join!(
            query_status(&*h.robot),
            query_status(&*h.mcu),
            query_status(&*h.loadcell),
            query_status(&*h.power),
            query_status(&*h.digital_io),
        );
        let device_status: Vec<(String, DeviceStatus)> =
            [robot_s, mcu_s, loadcell_s, power_s, dio_s]
                .into_iter()
                .flatten()
                .collect();

        let event = EmergencyEvent {
            activated_at: self.latch.activated_at().unwrap_or_else(Utc::now),
            test_id,
            robot_stopped,
            power_disabled,
        };
        // No subscribers is fine.
        let _ = self.events.send(event);

        EmergencyStopReport {
            robot_stopped,
            power_disabled,
            test_was_running,
            test_id,
            device_status,
        }
    }

    /// Clear the latch after a manual safety check. Touches no hardware.
    pub fn reset(&self) {
        if self.latch.is_active() {
            tracing::warn!("emergency stop reset");
        }
        self.latch.clear();
    }
}
