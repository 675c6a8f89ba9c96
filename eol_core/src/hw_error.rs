//! Maps errors from the device trait seam to typed `EolError`, and classifies
//! whatever reaches the engine boundary.
//!
//! The traits in `eol_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `eol_hardware::HwError` downcasting.

use serde::Serialize;

use crate::error::EolError;

/// Coarse error kind reported with every failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Configuration,
    Evaluation,
    Connection,
    Hardware,
    CommunicationTimeout,
    Protocol,
    State,
    Cancelled,
    MaxDuration,
    Repository,
    EmergencyStop,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub device: Option<String>,
    pub operation: Option<String>,
    /// Phase the error surfaced in, e.g. "setup".
    pub context: String,
    pub retryable: bool,
    pub message: String,
}

impl EolError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Evaluation { .. } => ErrorCategory::Evaluation,
            Self::HardwareConnection { .. } => ErrorCategory::Connection,
            Self::HardwareOperation { .. } => ErrorCategory::Hardware,
            Self::CommunicationTimeout(_) => ErrorCategory::CommunicationTimeout,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::InvalidState { .. } | Self::AlreadyRunning => ErrorCategory::State,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::MaxDurationExceeded(_) => ErrorCategory::MaxDuration,
            Self::Repository(_) => ErrorCategory::Repository,
            Self::EmergencyStop => ErrorCategory::EmergencyStop,
        }
    }

    /// Timeouts and framing errors may succeed on another attempt.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CommunicationTimeout(_) | Self::Protocol(_))
    }
}

/// Map a trait-boundary error raised by `device` during `operation`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(
    device: &str,
    operation: &str,
    e: &(dyn std::error::Error + 'static),
) -> EolError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        use eol_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::NotConnected { device } => EolError::HardwareConnection {
                    device: (*device).to_string(),
                    reason: hw.to_string(),
                },
                HwError::Closed | HwError::Io(_) => EolError::HardwareConnection {
                    device: device.to_string(),
                    reason: hw.to_string(),
                },
                HwError::CommunicationTimeout { .. } | HwError::ResponseTimeout { .. } => {
                    EolError::CommunicationTimeout(format!("{device} {operation}: {hw}"))
                }
                HwError::Protocol(p) => EolError::Protocol(format!("{device} {operation}: {p}")),
                HwError::Operation {
                    device,
                    operation,
                    reason,
                } => EolError::operation(*device, *operation, reason.clone()),
            };
        }
    }

    if let Some(eol) = e.downcast_ref::<EolError>() {
        return eol.clone();
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        EolError::CommunicationTimeout(format!("{device} {operation}: {s}"))
    } else if lower.contains("not connected") {
        EolError::HardwareConnection {
            device: device.to_string(),
            reason: s,
        }
    } else {
        EolError::operation(device, operation, s)
    }
}

/// Classify an error that reached the engine boundary.
pub fn classify(report: &eyre::Report, context: &str) -> ClassifiedError {
    let typed = report
        .chain()
        .find_map(|e| e.downcast_ref::<EolError>())
        .cloned()
        .or_else(|| hardware_cause(report));

    let Some(err) = typed else {
        let message = format!("{report:#}");
        let category = if message.to_lowercase().contains("timeout") {
            ErrorCategory::CommunicationTimeout
        } else {
            ErrorCategory::Unknown
        };
        return ClassifiedError {
            category,
            device: None,
            operation: None,
            context: context.to_string(),
            retryable: category == ErrorCategory::CommunicationTimeout,
            message,
        };
    };

    let (device, operation) = match &err {
        EolError::HardwareOperation {
            device, operation, ..
        } => (Some(device.clone()), Some(operation.clone())),
        EolError::HardwareConnection { device, .. } => (Some(device.clone()), None),
        _ => (None, None),
    };
    ClassifiedError {
        category: err.category(),
        device,
        operation,
        context: context.to_string(),
        retryable: err.is_retryable(),
        message: err.to_string(),
    }
}

#[cfg(feature = "hardware-errors")]
fn hardware_cause(report: &eyre::Report) -> Option<EolError> {
    report
        .chain()
        .find(|e| e.is::<eol_hardware::error::HwError>())
        .map(|e| map_hw_error("device", "operation", e))
}

#[cfg(not(feature = "hardware-errors"))]
fn hardware_cause(_report: &eyre::Report) -> Option<EolError> {
    None
}
