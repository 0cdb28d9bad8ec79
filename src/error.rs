//! Error types for the wire layer.

use thiserror::Error;

/// A well-formed byte stream that violates the message format.
///
/// Surfaced by message parsing; the caller decides whether the peer that
/// produced the payload should be disconnected.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload ended before the field being read.
    #[error("unexpected end of payload while reading {0}")]
    Truncated(&'static str),

    /// A length-prefixed list exceeds its protocol limit.
    #[error("{context}: {count} entries exceeds limit of {max}")]
    TooManyEntries {
        context: &'static str,
        count: u64,
        max: u64,
    },

    /// A string field does not decode as UTF-8.
    #[error("{0}: invalid UTF-8")]
    InvalidUtf8(&'static str),

    /// The peer negotiated a protocol version we refuse to speak.
    #[error("peer protocol version {got} below required minimum {minimum}")]
    UnsupportedVersion { got: u32, minimum: u32 },
}

/// A framing failure in the message envelope.
///
/// The offending command name is preserved so connection handlers can log
/// which message kind misbehaved before skipping or disconnecting.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// Payload bytes do not hash to the checksum in the header.
    #[error("checksum mismatch in '{command}' frame")]
    ChecksumMismatch { command: String },

    /// The header declares a payload larger than the configured cap.
    #[error("'{command}' frame declares {length} payload bytes, max {max}")]
    PayloadTooLarge {
        command: String,
        length: u32,
        max: u32,
    },

    /// The 12-byte command field names no known message kind.
    #[error("unknown command '{command}'")]
    UnknownCommand { command: String },
}

/// Top-level error for session-facing operations.
#[derive(Error, Debug)]
pub enum WireError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;
