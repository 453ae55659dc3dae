//! Unit tests for the checksummed packet codec.
//!
//! Covers header layout, coalesced and split frames, the bounded-read
//! guarantee for oversized lengths, EOF classification and the two-phase
//! `read_frame` helper.

use bytes::{BufMut, BytesMut};
use proptest::prelude::*;
use rstest::rstest;
use tokio_util::codec::{Decoder, Encoder};

use super::*;
use crate::context::Context;

fn encode(codec: &mut PacketCodec, ctx: &Context, dst: &mut BytesMut) {
    let msg = Message::from_context(ctx).expect("context encodes");
    codec.encode(msg, dst).expect("frame encodes");
}

#[test]
fn header_is_length_then_checksum_little_endian() {
    let codec = PacketCodec::default();
    let msg = Message::from_payload(&b"abc"[..]).expect("payload fits");
    let mut buf = BytesMut::new();
    codec.encode_into(&msg, &mut buf).expect("encode");

    assert_eq!(codec.header_size(), 8);
    assert_eq!(buf.len(), HEADER_SIZE + 3);
    assert_eq!(&buf[..4], &[3, 0, 0, 0]);
    assert_eq!(&buf[4..8], &crc32fast::hash(b"abc").to_le_bytes());
    assert_eq!(&buf[8..], b"abc");
}

#[test]
fn coalesced_frames_decode_in_order_without_bleed() {
    let mut codec = PacketCodec::default();
    let first = Context::new(1, 2).with_data(b"hello".to_vec());
    let second = Context::new(2, 12).with_data(b"world".to_vec());
    let mut buf = BytesMut::new();
    encode(&mut codec, &first, &mut buf);
    encode(&mut codec, &second, &mut buf);

    let a = codec.decode(&mut buf).expect("decode").expect("first frame");
    let b = codec.decode(&mut buf).expect("decode").expect("second frame");
    assert!(codec.decode(&mut buf).expect("decode").is_none());

    assert!(a.verify_checksum().is_ok());
    assert!(b.verify_checksum().is_ok());
    assert_eq!(a.context().expect("context"), &first);
    assert_eq!(b.context().expect("context"), &second);
}

#[test]
fn split_frame_is_reassembled_byte_by_byte() {
    let mut codec = PacketCodec::default();
    let ctx = Context::new(5, 6).with_data(b"fragmented".to_vec());
    let mut wire = BytesMut::new();
    encode(&mut codec, &ctx, &mut wire);

    let mut buf = BytesMut::new();
    let mut decoded = None;
    for byte in wire.iter() {
        assert!(decoded.is_none(), "frame decoded before all bytes arrived");
        buf.put_u8(*byte);
        decoded = codec.decode(&mut buf).expect("decode");
    }
    let msg = decoded.expect("frame after final byte");
    assert_eq!(msg.context().expect("context"), &ctx);
}

#[test]
fn oversized_length_is_refused_before_payload_is_buffered() {
    let mut codec = PacketCodec::new(16);
    let mut buf = BytesMut::with_capacity(HEADER_SIZE);
    buf.put_slice(&1_000_000_u32.to_le_bytes());
    buf.put_slice(&0_u32.to_le_bytes());

    let err = codec.decode(&mut buf).expect_err("oversized frame");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::OversizedFrame {
            size: 1_000_000,
            max: 16
        })
    ));
    assert!(err.should_disconnect());
    assert!(buf.capacity() < 1_000_000);
}

#[test]
fn encoder_refuses_oversized_payloads() {
    let codec = PacketCodec::new(4);
    let msg = Message::from_payload(vec![0_u8; 5]).expect("payload fits");
    let mut buf = BytesMut::new();
    let err = codec.encode_into(&msg, &mut buf).expect_err("oversized");
    assert_eq!(err, FramingError::OversizedFrame { size: 5, max: 4 });
    assert!(buf.is_empty());
}

#[test]
fn configured_limit_is_clamped() {
    let codec = PacketCodec::new(usize::MAX);
    assert_eq!(codec.max_package_size(), MAX_PACKAGE_SIZE_LIMIT);
}

#[test]
fn empty_payload_frame_decodes() {
    let mut codec = PacketCodec::default();
    let mut buf = BytesMut::new();
    codec
        .encode(Message::from_payload(Vec::new()).expect("empty"), &mut buf)
        .expect("encode");
    let msg = codec.decode(&mut buf).expect("decode").expect("frame");
    assert!(msg.is_empty());
    assert!(msg.verify_checksum().is_ok());
}

#[test]
fn decode_eof_on_boundary_is_clean() {
    let mut codec = PacketCodec::default();
    let mut buf = BytesMut::new();
    assert!(codec.decode_eof(&mut buf).expect("clean close").is_none());
}

#[rstest]
#[case::partial_header(&[3, 0, 0], "header")]
#[case::partial_payload(&[16, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4], "4 bytes of 16")]
fn decode_eof_reports_truncation(#[case] bytes: &[u8], #[case] expected: &str) {
    let mut codec = PacketCodec::default();
    let mut buf = BytesMut::from(bytes);
    let err = codec.decode_eof(&mut buf).expect_err("truncated frame");
    assert!(matches!(err, CodecError::Eof(_)));
    assert!(
        err.to_string().contains(expected),
        "error should mention '{expected}', got: {err}"
    );
}

#[tokio::test]
async fn read_frame_reads_header_then_payload() {
    let codec = PacketCodec::default();
    let mut wire = BytesMut::new();
    let msg = Message::from_payload(&b"two-phase"[..]).expect("payload fits");
    codec.encode_into(&msg, &mut wire).expect("encode");
    codec.encode_into(&msg, &mut wire).expect("encode");

    let mut reader = &wire[..];
    for _ in 0..2 {
        let frame = read_frame(&mut reader, &codec)
            .await
            .expect("read")
            .expect("frame");
        assert_eq!(frame.data().as_ref(), b"two-phase");
        assert!(frame.verify_checksum().is_ok());
    }
    assert!(read_frame(&mut reader, &codec).await.expect("eof").is_none());
}

#[tokio::test]
async fn read_frame_refuses_oversized_length() {
    let codec = PacketCodec::new(8);
    let mut wire = Vec::new();
    wire.extend_from_slice(&9_u32.to_le_bytes());
    wire.extend_from_slice(&0_u32.to_le_bytes());
    let mut reader = &wire[..];
    let err = read_frame(&mut reader, &codec)
        .await
        .expect_err("oversized");
    assert!(matches!(
        err,
        CodecError::Framing(FramingError::OversizedFrame { size: 9, max: 8 })
    ));
}

#[rstest]
#[case::mid_header(&[1, 0][..])]
#[case::mid_payload(&[4, 0, 0, 0, 0, 0, 0, 0, 1][..])]
#[tokio::test]
async fn read_frame_reports_truncation(#[case] wire: &[u8]) {
    let codec = PacketCodec::default();
    let mut reader = wire;
    let err = read_frame(&mut reader, &codec)
        .await
        .expect_err("truncated");
    assert!(matches!(err, CodecError::Eof(_)));
}

proptest! {
    #[test]
    fn decoded_payload_and_length_match_encoded(payload in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut codec = PacketCodec::new(512);
        let mut buf = BytesMut::new();
        codec.encode(Message::from_payload(payload.clone()).expect("fits"), &mut buf).expect("encode");
        let msg = codec.decode(&mut buf).expect("decode").expect("frame");
        prop_assert_eq!(msg.data().as_ref(), payload.as_slice());
        prop_assert_eq!(msg.data_len() as usize, payload.len());
        prop_assert_eq!(msg.checksum(), crc32fast::hash(&payload));
        prop_assert!(msg.verify_checksum().is_ok());
    }

    #[test]
    fn flipping_any_payload_byte_breaks_the_checksum(
        payload in proptest::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>(),
        mask in 1_u8..=255,
    ) {
        let mut codec = PacketCodec::new(512);
        let mut buf = BytesMut::new();
        codec.encode(Message::from_payload(payload.clone()).expect("fits"), &mut buf).expect("encode");
        let at = HEADER_SIZE + index.index(payload.len());
        buf[at] ^= mask;
        let msg = codec.decode(&mut buf).expect("decode").expect("frame");
        let mismatch = matches!(msg.verify_checksum(), Err(FramingError::ChecksumMismatch { .. }));
        prop_assert!(mismatch);
    }
}
