//! Wire framing for the length-prefixed, checksummed protocol.
//!
//! Every frame is an 8-byte header followed by the payload:
//!
//! ```text
//! +----------------+----------------+-----------------------+
//! | data_len u32LE | checksum u32LE | payload (data_len B)  |
//! +----------------+----------------+-----------------------+
//! ```
//!
//! `checksum` is the CRC-32/IEEE of the payload. Decoding is two-phase: the
//! header is parsed first, the declared length is checked against the
//! configured maximum package size, and only then is the payload read. A
//! length over the limit is refused before any payload buffer is reserved.
//!
//! [`PacketCodec`] implements `tokio_util`'s [`Decoder`] and [`Encoder`] so a
//! `FramedRead` can split a byte stream into frames regardless of how TCP
//! coalesces or fragments the writes. [`read_frame`] performs the same
//! decode directly with two sequential reads.
//!
//! The earlier 12-byte routed header lives in [`legacy`]; the two layouts are
//! not wire-compatible and are never auto-detected.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    byte_order::{header_word, write_wire_u32},
    message::Message,
};

pub mod error;
pub mod legacy;

pub use error::{CodecError, EofError, FramingError, RecoveryPolicy};

/// Size of the canonical frame header in bytes.
pub const HEADER_SIZE: usize = 8;

/// Upper bound applied to any configured maximum package size (16 MiB).
pub const MAX_PACKAGE_SIZE_LIMIT: usize = 16 * 1024 * 1024;

/// Maximum package size used by [`PacketCodec::default`].
pub const DEFAULT_MAX_PACKAGE_SIZE: usize = 4096;

/// Header fields parsed ahead of the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes.
    pub data_len: u32,
    /// CRC-32/IEEE of the payload.
    pub checksum: u32,
}

/// Codec for the canonical checksummed frame layout.
#[derive(Clone, Copy, Debug)]
pub struct PacketCodec {
    max_package_size: usize,
}

impl PacketCodec {
    /// Construct a codec accepting payloads up to `max_package_size` bytes.
    ///
    /// Values above [`MAX_PACKAGE_SIZE_LIMIT`] are clamped.
    #[must_use]
    pub fn new(max_package_size: usize) -> Self {
        Self {
            max_package_size: max_package_size.min(MAX_PACKAGE_SIZE_LIMIT),
        }
    }

    /// Fixed header size of this layout.
    #[must_use]
    pub const fn header_size(&self) -> usize { HEADER_SIZE }

    /// Largest payload this codec accepts in either direction.
    #[must_use]
    pub const fn max_package_size(&self) -> usize { self.max_package_size }

    /// Parse a frame header.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::IncompleteHeader`] for a short slice and
    /// [`FramingError::OversizedFrame`] if the declared length exceeds the
    /// maximum package size.
    pub fn decode_header(&self, header: &[u8]) -> Result<FrameHeader, FramingError> {
        let (Some(data_len), Some(checksum)) = (header_word(header, 0), header_word(header, 1))
        else {
            return Err(FramingError::IncompleteHeader {
                have: header.len(),
                need: HEADER_SIZE,
            });
        };
        self.check_len(data_len as usize)?;
        Ok(FrameHeader { data_len, checksum })
    }

    /// Append the wire form of `msg` to `dst`.
    ///
    /// Header fields are written as carried by the message, so a message
    /// built with [`Message::from_payload`] always encodes a valid checksum.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedFrame`] if the payload exceeds the
    /// maximum package size.
    pub fn encode_into(&self, msg: &Message, dst: &mut BytesMut) -> Result<(), FramingError> {
        self.check_len(msg.data().len())?;
        dst.reserve(HEADER_SIZE + msg.data().len());
        dst.put_slice(&write_wire_u32(msg.data_len()));
        dst.put_slice(&write_wire_u32(msg.checksum()));
        dst.put_slice(msg.data());
        Ok(())
    }

    fn check_len(&self, size: usize) -> Result<(), FramingError> {
        if size > self.max_package_size {
            return Err(FramingError::OversizedFrame {
                size,
                max: self.max_package_size,
            });
        }
        Ok(())
    }
}

impl Default for PacketCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_PACKAGE_SIZE) }
}

impl Decoder for PacketCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = src.get(..HEADER_SIZE) else {
            src.reserve(HEADER_SIZE - src.len());
            return Ok(None);
        };
        let header = self.decode_header(header)?;
        let frame_len = HEADER_SIZE + header.data_len as usize;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(HEADER_SIZE);
        Ok(Some(Message::from_parts(
            header.data_len,
            header.checksum,
            frame.freeze(),
        )))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(msg) => Ok(Some(msg)),
            None if src.is_empty() => Ok(None),
            None => Err(build_eof_error(src).into()),
        }
    }
}

impl Encoder<Message> for PacketCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_into(&item, dst).map_err(CodecError::from)
    }
}

/// Classify leftover bytes at end of stream.
fn build_eof_error(src: &BytesMut) -> EofError {
    match header_word(src, 0) {
        Some(expected) if src.len() >= HEADER_SIZE => EofError::MidFrame {
            bytes_received: src.len() - HEADER_SIZE,
            expected: expected as usize,
        },
        _ => EofError::MidHeader {
            bytes_received: src.len(),
            header_size: HEADER_SIZE,
        },
    }
}

/// Read one frame with two sequential reads: header, then payload.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
///
/// # Errors
///
/// Returns [`CodecError::Eof`] if the stream ends inside a frame,
/// [`CodecError::Framing`] if the header declares an oversized payload, and
/// [`CodecError::Io`] for transport failures. The checksum is not verified
/// here; call [`Message::verify_checksum`].
pub async fn read_frame<R>(reader: &mut R, codec: &PacketCodec) -> Result<Option<Message>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0_u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(EofError::MidHeader {
                bytes_received: filled,
                header_size: HEADER_SIZE,
            }
            .into());
        }
        filled += n;
    }

    let FrameHeader { data_len, checksum } = codec.decode_header(&header)?;
    let expected = data_len as usize;
    let mut data = Vec::with_capacity(expected);
    reader
        .take(u64::from(data_len))
        .read_to_end(&mut data)
        .await?;
    if data.len() < expected {
        return Err(EofError::MidFrame {
            bytes_received: data.len(),
            expected,
        }
        .into());
    }
    Ok(Some(Message::from_parts(data_len, checksum, data.into())))
}

#[cfg(test)]
mod tests;
