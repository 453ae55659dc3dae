//! Legacy routed frame layout.
//!
//! The first protocol revision framed each request with a 12-byte header
//! carrying the routing ids directly:
//!
//! ```text
//! +----------------+------------------+-----------------+---------+
//! | data_len u32LE | service_id u32LE | method_id u32LE | payload |
//! +----------------+------------------+-----------------+---------+
//! ```
//!
//! It has no checksum. The server speaks the canonical layout; this codec
//! exists for tools that still talk to peers on the old revision.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{CodecError, DEFAULT_MAX_PACKAGE_SIZE, EofError, FramingError, MAX_PACKAGE_SIZE_LIMIT};
use crate::byte_order::{header_word, write_wire_u32};

/// Header size of the legacy layout.
pub const ROUTED_HEADER_SIZE: usize = 12;

/// A frame of the legacy layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedFrame {
    /// Service id.
    pub service_id: u32,
    /// Method id.
    pub method_id: u32,
    /// Payload bytes.
    pub payload: Bytes,
}

/// Codec for [`RoutedFrame`]s.
#[derive(Clone, Copy, Debug)]
pub struct RoutedCodec {
    max_package_size: usize,
}

impl RoutedCodec {
    /// Construct a codec accepting payloads up to `max_package_size` bytes.
    #[must_use]
    pub fn new(max_package_size: usize) -> Self {
        Self {
            max_package_size: max_package_size.min(MAX_PACKAGE_SIZE_LIMIT),
        }
    }

    /// Fixed header size of this layout.
    #[must_use]
    pub const fn header_size(&self) -> usize { ROUTED_HEADER_SIZE }
}

impl Default for RoutedCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_PACKAGE_SIZE) }
}

impl Decoder for RoutedCodec {
    type Item = RoutedFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let (Some(data_len), Some(service_id), Some(method_id)) =
            (header_word(src, 0), header_word(src, 1), header_word(src, 2))
        else {
            src.reserve(ROUTED_HEADER_SIZE.saturating_sub(src.len()));
            return Ok(None);
        };
        let size = data_len as usize;
        if size > self.max_package_size {
            return Err(FramingError::OversizedFrame {
                size,
                max: self.max_package_size,
            }
            .into());
        }
        let frame_len = ROUTED_HEADER_SIZE + size;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(ROUTED_HEADER_SIZE);
        Ok(Some(RoutedFrame {
            service_id,
            method_id,
            payload: frame.freeze(),
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None if src.len() < ROUTED_HEADER_SIZE => Err(EofError::MidHeader {
                bytes_received: src.len(),
                header_size: ROUTED_HEADER_SIZE,
            }
            .into()),
            None => Err(EofError::MidFrame {
                bytes_received: src.len() - ROUTED_HEADER_SIZE,
                expected: header_word(src, 0).map_or(0, |len| len as usize),
            }
            .into()),
        }
    }
}

impl Encoder<RoutedFrame> for RoutedCodec {
    type Error = CodecError;

    fn encode(&mut self, item: RoutedFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let size = item.payload.len();
        if size > self.max_package_size {
            return Err(FramingError::OversizedFrame {
                size,
                max: self.max_package_size,
            }
            .into());
        }
        let data_len = u32::try_from(size).map_err(|_| FramingError::OversizedFrame {
            size,
            max: self.max_package_size,
        })?;
        dst.reserve(ROUTED_HEADER_SIZE + size);
        dst.put_slice(&write_wire_u32(data_len));
        dst.put_slice(&write_wire_u32(item.service_id));
        dst.put_slice(&write_wire_u32(item.method_id));
        dst.put_slice(&item.payload);
        Ok(())
    }
}
