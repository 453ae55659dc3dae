//! Structured request context carried inside each frame payload.
//!
//! The codec treats the payload as opaque bytes. The dispatcher and the
//! application see it as a [`Context`]: routing ids, a session id, a result
//! code and the application data, encoded with bincode's standard
//! configuration.

use bincode::{Decode, Encode, config};
use thiserror::Error;

use crate::{codec::MAX_PACKAGE_SIZE_LIMIT, pool::Recycle};

/// Outcome reported back to the peer in a reply context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub enum ResultCode {
    /// The request was handled.
    #[default]
    Ok,
    /// The server could not read a frame header.
    ErrGetHead,
    /// The server could not parse a frame header.
    ErrUnpackHead,
    /// The server could not read the frame payload.
    ErrGetData,
    /// The payload checksum did not match the header.
    ErrChecksum,
    /// The payload could not be decoded as a [`Context`].
    ErrUnpackContext,
}

/// Errors raised while converting a [`Context`] to or from bytes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// The payload is not a valid encoded context.
    #[error("failed to decode context: {0}")]
    Decode(String),
    /// Trailing bytes followed a valid context.
    #[error("context payload has {trailing} trailing bytes")]
    TrailingBytes {
        /// Number of unread bytes.
        trailing: usize,
    },
    /// The context could not be encoded.
    #[error("failed to encode context: {0}")]
    Encode(String),
}

/// Self-describing payload of the canonical protocol.
///
/// # Examples
///
/// ```
/// use wirepool::context::Context;
///
/// let ctx = Context::new(1, 2).with_data(b"hello".to_vec());
/// let bytes = ctx.to_bytes().expect("encode");
/// assert_eq!(Context::from_bytes(&bytes).expect("decode"), ctx);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct Context {
    /// Service identifier; selects the registered router.
    pub service_id: u32,
    /// Method identifier within the service.
    pub method_id: u32,
    /// Application session identifier, echoed in replies.
    pub session: u32,
    /// Result code, meaningful in replies.
    pub result: ResultCode,
    /// Application data.
    pub data: Vec<u8>,
}

impl Context {
    /// Create a context addressed to `service_id` / `method_id`.
    #[must_use]
    pub fn new(service_id: u32, method_id: u32) -> Self {
        Self {
            service_id,
            method_id,
            ..Self::default()
        }
    }

    /// Replace the application data.
    #[must_use]
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set the session identifier.
    #[must_use]
    pub fn with_session(mut self, session: u32) -> Self {
        self.session = session;
        self
    }

    /// Build a successful reply carrying `data`, keeping this context's ids.
    #[must_use]
    pub fn reply(&self, data: Vec<u8>) -> Self {
        Self {
            service_id: self.service_id,
            method_id: self.method_id,
            session: self.session,
            result: ResultCode::Ok,
            data,
        }
    }

    /// Encode the context.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Encode`] if bincode rejects the value.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ContextError> {
        bincode::encode_to_vec(self, config::standard())
            .map_err(|e| ContextError::Encode(e.to_string()))
    }

    /// Decode a context that spans the whole of `bytes`.
    ///
    /// Declared lengths are capped at [`MAX_PACKAGE_SIZE_LIMIT`] before any
    /// buffer is allocated.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Decode`] for malformed input or an oversized
    /// length claim, and [`ContextError::TrailingBytes`] when bytes remain
    /// after the context.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContextError> {
        let limited = config::standard().with_limit::<MAX_PACKAGE_SIZE_LIMIT>();
        let (ctx, consumed) = bincode::decode_from_slice::<Self, _>(bytes, limited)
            .map_err(|e| ContextError::Decode(e.to_string()))?;
        match bytes.len().saturating_sub(consumed) {
            0 => Ok(ctx),
            trailing => Err(ContextError::TrailingBytes { trailing }),
        }
    }
}

impl Recycle for Context {
    fn recycle(&mut self) {
        self.service_id = 0;
        self.method_id = 0;
        self.session = 0;
        self.result = ResultCode::Ok;
        self.data.clear();
    }
}
