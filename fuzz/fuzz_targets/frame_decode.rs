//! Fuzz target for frame and payload decoding
//!
//! Everything the relay reads off the network passes through here first.
//!
//! # Invariants
//!
//! - NEVER panic on arbitrary bytes
//! - A decoded frame re-encodes to exactly the bytes it was read from
//! - A decoded payload survives re-framing unchanged
//! - Declared payload size never exceeds `MAX_PAYLOAD_SIZE`

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use sealroom_proto::{Frame, FrameHeader, Payload};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    assert!(frame.header.payload_size() <= FrameHeader::MAX_PAYLOAD_SIZE);

    let mut wire = BytesMut::new();
    frame.encode(&mut wire).expect("decoded frame must re-encode");
    assert_eq!(&wire[..], &data[..frame.encoded_len()]);

    let Ok(payload) = Payload::from_frame(&frame) else {
        return;
    };

    let reframed = payload.clone().into_frame().expect("decoded payload must re-encode");
    let again = Payload::from_frame(&reframed).expect("re-encoded payload must decode");
    assert_eq!(payload, again);
});
