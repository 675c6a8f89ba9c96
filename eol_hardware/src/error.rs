use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("{device} is not connected")]
    NotConnected { device: &'static str },
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("communication timeout waiting for response to 0x{code:02X} after {attempts} attempt(s)")]
    CommunicationTimeout { code: u8, attempts: u32 },
    #[error("{device} did not answer `{command}` in time")]
    ResponseTimeout {
        device: &'static str,
        command: String,
    },
    #[error("{device} {operation} failed: {reason}")]
    Operation {
        device: &'static str,
        operation: &'static str,
        reason: String,
    },
    #[error("connection closed by peer")]
    Closed,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl HwError {
    pub fn operation(device: &'static str, operation: &'static str, reason: impl Into<String>) -> Self {
        HwError::Operation {
            device,
            operation,
            reason: reason.into(),
        }
    }

    /// Timeouts and framing errors are worth another attempt; the rest are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HwError::CommunicationTimeout { .. }
                | HwError::ResponseTimeout { .. }
                | HwError::Protocol(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
