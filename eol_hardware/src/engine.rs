//! Request/response exchange with the MCU over a [`Transport`].
//!
//! Every attempt starts from a clean channel: the frame buffer and the
//! transport's pending input are cleared before the request is written.
//! Expected responses are awaited in order (typically an acknowledgement and,
//! for long-running commands, a terminal status). Frames with any other code
//! are logged and dropped.

use std::time::Duration;

use crate::error::{HwError, Result};
use crate::protocol::codec::hex;
use crate::protocol::{Frame, FrameBuffer, Pull, encode};
use crate::transport::Transport;

pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RETRY_COUNT: u32 = 3;

const READ_CHUNK: usize = 256;

/// One command and the responses that complete it.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub code: u8,
    pub payload: Vec<u8>,
    /// Codes awaited in order. Empty means write-only.
    pub expected: Vec<u8>,
    /// Budget for the first expected response.
    pub timeout: Duration,
    /// Budget for each later response (temperature reached etc.).
    pub terminal_timeout: Duration,
    /// Total attempts, including the first. Zero is treated as one.
    pub retry_count: u32,
}

impl CommandRequest {
    pub fn new(code: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            payload: payload.into(),
            expected: Vec::new(),
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            terminal_timeout: DEFAULT_RESPONSE_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }

    pub fn expect(mut self, code: u8) -> Self {
        self.expected.push(code);
        self
    }

    /// Await `code` after the acknowledgement, with its own budget.
    pub fn then(mut self, code: u8, timeout: Duration) -> Self {
        self.expected.push(code);
        self.terminal_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, attempts: u32) -> Self {
        self.retry_count = attempts;
        self
    }

    fn attempts(&self) -> u32 {
        self.retry_count.max(1)
    }
}

/// Frames that satisfied a request, in the order they were expected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSet {
    pub frames: Vec<Frame>,
}

impl ResponseSet {
    pub fn ack(&self) -> Option<&Frame> {
        self.frames.first()
    }

    /// Last frame of the exchange; equals `ack` for single-response commands.
    pub fn terminal(&self) -> Option<&Frame> {
        self.frames.last()
    }
}

enum Attempt {
    Done(ResponseSet),
    TimedOut { waiting_for: u8 },
}

pub struct CommandResponseEngine<T> {
    transport: T,
    buffer: FrameBuffer,
    interrupted: bool,
}

impl<T: Transport> CommandResponseEngine<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: FrameBuffer::new(),
            interrupted: false,
        }
    }

    /// True when the last exchange was dropped mid-flight.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Noise bytes skipped by the frame reader since creation.
    pub fn discarded(&self) -> usize {
        self.buffer.discarded()
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub async fn clear(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            tracing::debug!(bytes = self.buffer.len(), "dropping buffered bytes");
        }
        self.buffer.clear();
        self.transport.clear_input().await?;
        Ok(())
    }

    pub async fn send(&mut self, request: &CommandRequest) -> Result<ResponseSet> {
        let frame = encode(request.code, &request.payload)?;
        let attempts = request.attempts();
        if self.interrupted {
            tracing::warn!(code = request.code, "previous exchange was interrupted; resynchronising");
        }
        self.interrupted = true;

        for attempt in 1..=attempts {
            self.clear().await?;
            tracing::debug!(
                code = request.code,
                attempt,
                attempts,
                frame = %hex(&frame),
                "-> mcu"
            );
            self.transport.write_all(&frame).await?;

            if request.expected.is_empty() {
                self.interrupted = false;
                return Ok(ResponseSet::default());
            }

            match self.collect(request).await? {
                Attempt::Done(set) => {
                    self.interrupted = false;
                    return Ok(set);
                }
                Attempt::TimedOut { waiting_for } => {
                    tracing::warn!(
                        code = request.code,
                        waiting_for,
                        attempt,
                        attempts,
                        "response timeout"
                    );
                }
            }
        }

        self.clear().await?;
        self.interrupted = false;
        tracing::error!(code = request.code, attempts, "no response after all attempts");
        Err(HwError::CommunicationTimeout {
            code: request.code,
            attempts,
        })
    }

    /// Wait for an unsolicited frame without sending anything.
    pub async fn listen(&mut self, code: u8, timeout: Duration) -> Result<Frame> {
        match tokio::time::timeout(timeout, self.next_with_code(code)).await {
            Ok(frame) => frame,
            Err(_) => Err(HwError::CommunicationTimeout { code, attempts: 1 }),
        }
    }

    async fn collect(&mut self, request: &CommandRequest) -> Result<Attempt> {
        let mut frames = Vec::with_capacity(request.expected.len());
        for (i, &want) in request.expected.iter().enumerate() {
            let budget = if i == 0 {
                request.timeout
            } else {
                request.terminal_timeout
            };
            match tokio::time::timeout(budget, self.next_with_code(want)).await {
                Ok(frame) => {
                    let frame = frame?;
                    tracing::debug!(code = frame.code, len = frame.payload.len(), "<- mcu");
                    frames.push(frame);
                }
                Err(_) => return Ok(Attempt::TimedOut { waiting_for: want }),
            }
        }
        Ok(Attempt::Done(ResponseSet { frames }))
    }

    async fn next_with_code(&mut self, want: u8) -> Result<Frame> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.buffer.pull() {
                Pull::Frame(frame) if frame.code == want => return Ok(frame),
                Pull::Frame(frame) => {
                    tracing::debug!(
                        code = frame.code,
                        waiting_for = want,
                        "discarding unexpected frame"
                    );
                }
                Pull::Corrupt(e) => tracing::warn!(error = %e, "corrupt frame; resyncing"),
                Pull::NeedMore => {
                    let n = self.transport.read(&mut chunk).await?;
                    if n == 0 {
                        return Err(HwError::Closed);
                    }
                    self.buffer.extend(&chunk[..n]);
                }
            }
        }
    }
}
