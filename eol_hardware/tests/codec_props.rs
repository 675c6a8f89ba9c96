use eol_hardware::protocol::codec::{FRAME_OVERHEAD, STX};
use eol_hardware::protocol::{Frame, FrameBuffer, Pull, decode, encode, resync};
use proptest::prelude::*;

fn drain(fb: &mut FrameBuffer) -> Vec<Frame> {
    let mut out = Vec::new();
    loop {
        match fb.pull() {
            Pull::Frame(f) => out.push(f),
            Pull::Corrupt(_) => {}
            Pull::NeedMore => return out,
        }
    }
}

proptest! {
    #[test]
    fn decode_inverts_encode(code in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..=255)) {
        let bytes = encode(code, &payload).unwrap();
        prop_assert_eq!(bytes.len(), payload.len() + FRAME_OVERHEAD);
        prop_assert_eq!(decode(&bytes).unwrap(), Frame::new(code, payload));
    }

    #[test]
    fn resync_finds_frame_after_noise(
        noise in proptest::collection::vec(0u8..0xFF, 0..64),
        code in any::<u8>(),
        payload in proptest::collection::vec(any::<u8>(), 0..32),
    ) {
        let mut stream = noise.clone();
        stream.extend(encode(code, &payload).unwrap());
        prop_assert_eq!(resync(&stream), Some(noise.len()));
    }

    #[test]
    fn buffer_recovers_frame_from_noise_in_any_chunking(
        noise in proptest::collection::vec(0u8..0xFF, 0..64),
        code in any::<u8>(),
        payload in proptest::collection::vec(0u8..0xFF, 0..32),
        chunk in 1usize..16,
    ) {
        let mut stream = noise;
        stream.extend(encode(code, &payload).unwrap());

        let mut fb = FrameBuffer::new();
        let mut frames = Vec::new();
        for piece in stream.chunks(chunk) {
            fb.extend(piece);
            frames.extend(drain(&mut fb));
        }
        prop_assert_eq!(frames, vec![Frame::new(code, payload)]);
    }

    #[test]
    fn short_or_headless_input_never_decodes(bytes in proptest::collection::vec(any::<u8>(), 0..FRAME_OVERHEAD)) {
        prop_assert!(decode(&bytes).is_err());
    }
}

#[test]
fn stx_constant_matches_wire_format() {
    assert_eq!(STX, [0xFF, 0xFF]);
}
