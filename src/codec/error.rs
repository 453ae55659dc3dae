//! Error types for the codec layer.
//!
//! The taxonomy separates framing errors (the header or payload is not what
//! the protocol promises), EOF conditions (the peer went away mid-frame) and
//! plain I/O failures. Each error maps to a [`RecoveryPolicy`] that the
//! connection reader applies:
//!
//! - [`RecoveryPolicy::Drop`]: discard the frame, answer with an error code and keep reading.
//! - [`RecoveryPolicy::Disconnect`]: tear the connection down.

use std::io;

use thiserror::Error;

/// How the connection reader reacts to a codec error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Discard the offending frame; the stream is still aligned.
    Drop,
    /// Close the connection; the stream can no longer be trusted.
    Disconnect,
}

/// Framing-level errors occurring while splitting the byte stream.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Declared payload length exceeds the configured maximum package size.
    #[error("frame exceeds max package size: {size} > {max}")]
    OversizedFrame {
        /// Payload size announced by the header.
        size: usize,
        /// Configured maximum package size.
        max: usize,
    },

    /// Header slice shorter than the codec's header size.
    #[error("incomplete frame header: have {have}, need {need}")]
    IncompleteHeader {
        /// Bytes available.
        have: usize,
        /// Bytes required.
        need: usize,
    },

    /// Payload checksum does not match the header.
    #[error("frame checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Checksum carried in the header.
        expected: u32,
        /// CRC-32 computed over the received payload.
        actual: u32,
    },
}

/// Premature end-of-stream conditions.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EofError {
    /// The peer closed while the header was being read.
    #[error("premature EOF during header: {bytes_received} of {header_size} header bytes")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Expected header size.
        header_size: usize,
    },

    /// The peer closed after the header but before the full payload arrived.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte payload received")]
    MidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload size announced by the header.
        expected: usize,
    },
}

/// Top-level codec error.
///
/// # Examples
///
/// ```
/// use wirepool::codec::{CodecError, FramingError, RecoveryPolicy};
///
/// let err = CodecError::Framing(FramingError::ChecksumMismatch {
///     expected: 1,
///     actual: 2,
/// });
/// assert_eq!(err.recovery_policy(), RecoveryPolicy::Drop);
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing layer error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Premature end of stream.
    #[error("EOF: {0}")]
    Eof(#[from] EofError),
}

impl CodecError {
    /// Return the recovery policy the connection reader applies.
    ///
    /// | Error | Policy |
    /// |-------|--------|
    /// | `Framing::ChecksumMismatch` | `Drop` |
    /// | `Framing::OversizedFrame` | `Disconnect` |
    /// | `Framing::IncompleteHeader` | `Disconnect` |
    /// | `Io`, `Eof` | `Disconnect` |
    #[must_use]
    pub fn recovery_policy(&self) -> RecoveryPolicy {
        match self {
            Self::Framing(FramingError::ChecksumMismatch { .. }) => RecoveryPolicy::Drop,
            Self::Framing(_) | Self::Io(_) | Self::Eof(_) => RecoveryPolicy::Disconnect,
        }
    }

    /// Return true if the connection must be closed.
    #[must_use]
    pub fn should_disconnect(&self) -> bool {
        self.recovery_policy() == RecoveryPolicy::Disconnect
    }

    /// Return the error category for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Io(_) => "io",
            Self::Eof(_) => "eof",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Eof(e) => io::Error::new(io::ErrorKind::UnexpectedEof, e),
        }
    }
}
