pub mod codec;
pub mod lma;

pub use codec::{Frame, FrameBuffer, ProtocolError, Pull, decode, encode, resync};
