//! Raw wire frames.

use wirepool::{codec::HEADER_SIZE, context::Context};

/// Frame `payload` with a correct length and checksum.
///
/// # Panics
///
/// Panics if the payload does not fit the 32-bit length field.
#[must_use]
pub fn encode_payload(payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).expect("payload fits u32 length");
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Frame an encoded `ctx`.
///
/// # Panics
///
/// Panics if the context cannot be encoded.
#[must_use]
pub fn encode_context(ctx: &Context) -> Vec<u8> {
    encode_payload(&ctx.to_bytes().expect("context encodes"))
}

/// Flip the low bit of the checksum field of a framed buffer.
///
/// # Panics
///
/// Panics if `frame` is shorter than a header.
pub fn corrupt_checksum(frame: &mut [u8]) {
    assert!(frame.len() >= HEADER_SIZE, "frame shorter than header");
    frame[4] ^= 1;
}
