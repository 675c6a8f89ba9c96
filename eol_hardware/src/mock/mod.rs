//! In-memory drivers for every device kind.
//!
//! Each mock carries a [`FaultPlan`]: a shared handle recording the
//! operations called and letting tests make chosen operations fail.

mod analyzer;
mod dio;
mod loadcell;
mod mcu;
mod power;
mod robot;

pub use analyzer::MockPowerAnalyzer;
pub use dio::MockDigitalIo;
pub use loadcell::MockLoadCell;
pub use mcu::MockMcu;
pub use power::MockPowerSupply;
pub use robot::MockRobot;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eol_traits::DeviceStatus;
use parking_lot::Mutex;

use crate::error::HwError;

#[derive(Debug, Default)]
struct Plan {
    failing: HashSet<&'static str>,
    calls: Vec<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    inner: Arc<Mutex<Plan>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` fail until healed.
    pub fn fail(&self, operation: &'static str) {
        self.inner.lock().failing.insert(operation);
    }

    pub fn heal(&self, operation: &'static str) {
        self.inner.lock().failing.remove(operation);
    }

    /// Operations invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.inner.lock().calls.iter().filter(|c| **c == operation).count()
    }

    pub(crate) fn check(&self, device: &'static str, operation: &'static str) -> Result<(), HwError> {
        let mut plan = self.inner.lock();
        plan.calls.push(operation);
        if plan.failing.contains(operation) {
            tracing::debug!(device, operation, "injected fault");
            return Err(HwError::operation(device, operation, "injected fault"));
        }
        Ok(())
    }
}

/// Connection flag plus fault plan; the part every mock shares.
#[derive(Debug, Default)]
pub(crate) struct MockLink {
    connected: AtomicBool,
    pub(crate) faults: FaultPlan,
}

impl MockLink {
    pub(crate) fn connect(&self, device: &'static str) -> Result<(), HwError> {
        self.faults.check(device, "connect")?;
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    pub(crate) fn disconnect(&self, device: &'static str) -> Result<(), HwError> {
        self.connected.store(false, Ordering::Release);
        self.faults.check(device, "disconnect")
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Record `operation`, then fail if disconnected or faulted.
    pub(crate) fn op(&self, device: &'static str, operation: &'static str) -> Result<(), HwError> {
        self.faults.check(device, operation)?;
        if self.is_connected() {
            Ok(())
        } else {
            Err(HwError::NotConnected { device })
        }
    }

    pub(crate) fn base_status(&self) -> DeviceStatus {
        let mut s = DeviceStatus::new();
        s.insert("connected".into(), self.is_connected().to_string());
        s.insert("hardware_type".into(), "mock".into());
        s
    }
}
