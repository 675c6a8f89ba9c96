//! MCU frame codec.
//!
//! ```text
//! [0xFF 0xFF] [code:1B] [len:1B] [payload:len B] [0xFE 0xFE]
//! ```
//!
//! Frames carry no request id, so a reader can only line up on the STX marker
//! and trust the declared length. `FrameBuffer` does that over a byte stream
//! that may contain noise, partial reads, or several frames at once.

use bytes::{Buf, BytesMut};
use thiserror::Error;

pub const STX: [u8; 2] = [0xFF, 0xFF];
pub const ETX: [u8; 2] = [0xFE, 0xFE];
/// STX + code + len + ETX.
pub const FRAME_OVERHEAD: usize = 6;
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("frame does not start with STX")]
    BadHeader,
    #[error("declared payload length {declared} but frame carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("frame footer (ETX) missing")]
    MissingFooter,
    #[error("payload of {0} bytes exceeds 255")]
    PayloadTooLong(usize),
    #[error("malformed payload for 0x{code:02X}: {reason}")]
    BadPayload { code: u8, reason: String },
}

/// A decoded frame: command/status code plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(code: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }
}

/// Build one wire frame.
pub fn encode(code: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u8::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLong(payload.len()))?;
    let mut out = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    out.extend_from_slice(&STX);
    out.push(code);
    out.push(len);
    out.extend_from_slice(payload);
    out.extend_from_slice(&ETX);
    Ok(out)
}

/// Decode exactly one frame occupying all of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(ProtocolError::TooShort(bytes.len()));
    }
    if bytes[..2] != STX {
        return Err(ProtocolError::BadHeader);
    }
    let declared = usize::from(bytes[3]);
    let actual = bytes.len() - FRAME_OVERHEAD;
    if declared > actual {
        return Err(ProtocolError::LengthMismatch { declared, actual });
    }
    let footer = 4 + declared;
    if bytes[footer..footer + 2] != ETX {
        return Err(ProtocolError::MissingFooter);
    }
    if declared != actual {
        return Err(ProtocolError::LengthMismatch { declared, actual });
    }
    Ok(Frame {
        code: bytes[2],
        payload: bytes[4..footer].to_vec(),
    })
}

/// Offset of the next STX marker in `stream`, if any.
pub fn resync(stream: &[u8]) -> Option<usize> {
    stream.windows(2).position(|w| w == STX)
}

/// Outcome of pulling from a [`FrameBuffer`].
#[derive(Debug, PartialEq, Eq)]
pub enum Pull {
    Frame(Frame),
    /// A candidate frame at an STX failed to decode and was skipped.
    Corrupt(ProtocolError),
    /// Not enough bytes buffered yet.
    NeedMore,
}

/// Accumulates raw reads and yields frames, discarding noise between them.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
    discarded: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Total noise bytes dropped while searching for STX.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn pull(&mut self) -> Pull {
        match resync(&self.buf) {
            Some(0) => {}
            Some(offset) => {
                tracing::debug!(bytes = offset, "discarding noise before STX");
                self.discarded += offset;
                self.buf.advance(offset);
            }
            None => {
                // Keep a trailing 0xFF: it may be the first half of a split STX.
                let keep = usize::from(self.buf.last() == Some(&STX[0]));
                let drop = self.buf.len() - keep;
                if drop > 0 {
                    tracing::debug!(bytes = drop, "no STX in buffer; discarding");
                    self.discarded += drop;
                    self.buf.advance(drop);
                }
                return Pull::NeedMore;
            }
        }

        if self.buf.len() < 4 {
            return Pull::NeedMore;
        }
        let total = usize::from(self.buf[3]) + FRAME_OVERHEAD;
        if self.buf.len() < total {
            return Pull::NeedMore;
        }
        match decode(&self.buf[..total]) {
            Ok(frame) => {
                self.buf.advance(total);
                Pull::Frame(frame)
            }
            Err(e) => {
                // Skip one byte so the scan restarts past this false STX.
                self.discarded += 1;
                self.buf.advance(1);
                Pull::Corrupt(e)
            }
        }
    }
}

/// Render a frame as spaced hex for logs: `FF FF 04 0C ... FE FE`.
pub fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{b:02X}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_documented_lma_init_frame() {
        let payload = [
            0x00, 0x00, 0x02, 0x08, 0x00, 0x00, 0x01, 0x5E, 0x00, 0x00, 0x27, 0x10,
        ];
        let bytes = encode(0x04, &payload).unwrap();
        assert_eq!(
            hex(&bytes),
            "FF FF 04 0C 00 00 02 08 00 00 01 5E 00 00 27 10 FE FE"
        );
    }

    #[test]
    fn decode_rejects_missing_footer() {
        let mut bytes = encode(0x01, &[1, 2]).unwrap();
        let n = bytes.len();
        bytes[n - 1] = 0x00;
        assert_eq!(decode(&bytes), Err(ProtocolError::MissingFooter));
    }

    #[test]
    fn decode_rejects_length_disagreement() {
        // declared 1, carries 2
        let bytes = [0xFF, 0xFF, 0x01, 0x01, 0xAA, 0xBB, 0xFE, 0xFE];
        assert!(matches!(
            decode(&bytes),
            Err(ProtocolError::LengthMismatch {
                declared: 1,
                actual: 2
            }) | Err(ProtocolError::MissingFooter)
        ));
        // declared 4, carries 2
        let bytes = [0xFF, 0xFF, 0x01, 0x04, 0xAA, 0xBB, 0xFE, 0xFE];
        assert_eq!(
            decode(&bytes),
            Err(ProtocolError::LengthMismatch {
                declared: 4,
                actual: 2
            })
        );
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let payload = vec![0u8; 256];
        assert_eq!(
            encode(0x01, &payload),
            Err(ProtocolError::PayloadTooLong(256))
        );
    }

    #[test]
    fn buffer_keeps_split_stx_across_reads() {
        let frame = encode(0x07, &[]).unwrap();
        let mut fb = FrameBuffer::new();
        fb.extend(&[0x11, 0x22, frame[0]]);
        assert_eq!(fb.pull(), Pull::NeedMore);
        assert_eq!(fb.len(), 1);
        fb.extend(&frame[1..]);
        assert_eq!(fb.pull(), Pull::Frame(Frame::new(0x07, [])));
        assert_eq!(fb.discarded(), 2);
    }

    #[test]
    fn buffer_yields_back_to_back_frames() {
        let mut bytes = encode(0x04, &[]).unwrap();
        bytes.extend(encode(0x0B, &[]).unwrap());
        let mut fb = FrameBuffer::new();
        fb.extend(&bytes);
        assert_eq!(fb.pull(), Pull::Frame(Frame::new(0x04, [])));
        assert_eq!(fb.pull(), Pull::Frame(Frame::new(0x0B, [])));
        assert_eq!(fb.pull(), Pull::NeedMore);
        assert!(fb.is_empty());
    }

    #[test]
    fn buffer_skips_false_stx_and_recovers() {
        // A stray STX whose "frame" has no footer, followed by a real frame.
        let mut bytes = vec![0xFF, 0xFF, 0x03, 0x00, 0x12, 0x34];
        bytes.extend(encode(0x02, &[0x01]).unwrap());
        let mut fb = FrameBuffer::new();
        fb.extend(&bytes);
        let mut corrupt = 0;
        loop {
            match fb.pull() {
                Pull::Frame(f) => {
                    assert_eq!(f, Frame::new(0x02, [0x01]));
                    break;
                }
                Pull::Corrupt(_) => corrupt += 1,
                Pull::NeedMore => panic!("real frame should be decodable"),
            }
        }
        assert!(corrupt >= 1);
    }
}
