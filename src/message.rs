//! In-memory representation of a decoded frame.
//!
//! A [`Message`] carries the header fields exactly as they appeared on the
//! wire together with the payload. The structured [`Context`] inside the
//! payload is parsed lazily on first access and cached for the lifetime of
//! the message.

use std::sync::OnceLock;

use bytes::Bytes;

use crate::{
    codec::FramingError,
    context::{Context, ContextError},
};

/// One frame of the canonical protocol.
///
/// # Examples
///
/// ```
/// use wirepool::{context::Context, message::Message};
///
/// let msg = Message::from_context(&Context::new(1, 2)).expect("encode");
/// assert!(msg.verify_checksum().is_ok());
/// assert_eq!(msg.service_id().expect("context"), 1);
/// ```
#[derive(Debug)]
pub struct Message {
    data_len: u32,
    checksum: u32,
    data: Bytes,
    context: OnceLock<Result<Context, ContextError>>,
}

impl Message {
    /// Wrap `data`, computing its length and CRC-32.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedFrame`] if the payload length does not
    /// fit the 32-bit length field.
    pub fn from_payload(data: impl Into<Bytes>) -> Result<Self, FramingError> {
        let data = data.into();
        let data_len = u32::try_from(data.len()).map_err(|_| FramingError::OversizedFrame {
            size: data.len(),
            max: u32::MAX as usize,
        })?;
        let checksum = crc32fast::hash(&data);
        Ok(Self::from_parts(data_len, checksum, data))
    }

    /// Encode `ctx` and wrap it as a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Encode`] if the context cannot be encoded, or
    /// if the encoding does not fit the length field.
    pub fn from_context(ctx: &Context) -> Result<Self, ContextError> {
        let bytes = ctx.to_bytes()?;
        Self::from_payload(bytes).map_err(|e| ContextError::Encode(e.to_string()))
    }

    /// Assemble a message from raw header fields, without validation.
    pub(crate) fn from_parts(data_len: u32, checksum: u32, data: Bytes) -> Self {
        Self {
            data_len,
            checksum,
            data,
            context: OnceLock::new(),
        }
    }

    /// Payload length announced by the header.
    #[must_use]
    pub const fn data_len(&self) -> u32 { self.data_len }

    /// Checksum announced by the header.
    #[must_use]
    pub const fn checksum(&self) -> u32 { self.checksum }

    /// Payload bytes.
    #[must_use]
    pub fn data(&self) -> &Bytes { &self.data }

    /// Consume the message and return its payload.
    #[must_use]
    pub fn into_data(self) -> Bytes { self.data }

    /// Return true when the frame carried no payload.
    #[must_use]
    pub const fn is_empty(&self) -> bool { self.data_len == 0 }

    /// Check the header checksum against the CRC-32 of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::ChecksumMismatch`] when they differ.
    pub fn verify_checksum(&self) -> Result<(), FramingError> {
        let actual = crc32fast::hash(&self.data);
        if actual == self.checksum {
            Ok(())
        } else {
            Err(FramingError::ChecksumMismatch {
                expected: self.checksum,
                actual,
            })
        }
    }

    /// Parse the payload as a [`Context`], at most once.
    ///
    /// # Errors
    ///
    /// Returns the cached [`ContextError`] if the payload is not a context.
    pub fn context(&self) -> Result<&Context, ContextError> {
        self.context
            .get_or_init(|| Context::from_bytes(&self.data))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Service id from the parsed context.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if the payload is not a context.
    pub fn service_id(&self) -> Result<u32, ContextError> {
        self.context().map(|ctx| ctx.service_id)
    }

    /// Method id from the parsed context.
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] if the payload is not a context.
    pub fn method_id(&self) -> Result<u32, ContextError> { self.context().map(|ctx| ctx.method_id) }
}
