//! Error types for pgwire-capture.
//!
//! All errors in this crate are represented by [`CaptureError`], which covers:
//! - I/O errors from the underlying byte source
//! - Invalid `ip:port` address tokens
//! - Streams that end in the middle of a replay-log record
//! - Chunks too short or malformed for their claimed shape
//! - Well-formed chunks on an unsupported protocol version
//! - Recognized-but-unsupported message tags

use thiserror::Error;

/// Error type for all pgwire-capture operations.
#[derive(Debug, Error, Clone)]
pub enum CaptureError {
    /// I/O error from the underlying byte source.
    ///
    /// Note: `std::io::Error` is not `Clone`, so we store the message.
    #[error("io error: {0}")]
    Io(String),

    /// An `ip:port` token with a non-IP host or a bad port.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The byte source ended in the middle of a record or field.
    ///
    /// Distinguished from a clean end of stream only by whether any bytes
    /// were already consumed for the current record.
    #[error("unexpected end of stream: {0}")]
    UnexpectedEnd(String),

    /// A chunk too short or structurally invalid for its claimed shape.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A well-formed chunk that is not a supported client message
    /// (protocol-version mismatch on the startup path).
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// A recognized message tag whose decoding is deliberately unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl CaptureError {
    /// Returns `true` if this is an I/O error.
    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(self, CaptureError::Io(_))
    }

    /// Returns `true` if the stream ended mid-record.
    #[inline]
    pub fn is_unexpected_end(&self) -> bool {
        matches!(self, CaptureError::UnexpectedEnd(_))
    }

    /// Returns `true` if this is a malformed-message error.
    #[inline]
    pub fn is_malformed(&self) -> bool {
        matches!(self, CaptureError::MalformedMessage(_))
    }

    /// Returns `true` if this is the known-but-unsupported outcome.
    ///
    /// Callers can special-case this: the tag was recognized, the message was
    /// not garbage, and decoding it is simply out of scope.
    #[inline]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, CaptureError::NotImplemented(_))
    }
}

// Manual From impl since io::Error isn't Clone. A short read surfaces as
// UnexpectedEnd so stream callers see one truncation variant.
impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            CaptureError::UnexpectedEnd(err.to_string())
        } else {
            CaptureError::Io(err.to_string())
        }
    }
}

/// Result type alias for pgwire-capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
