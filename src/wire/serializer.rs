//! Envelope framing for the byte stream between peers.
//!
//! Every message travels inside a 24-byte envelope:
//!
//! ```text
//! +------------+--------------+---------------+-------------+
//! | magic (4)  | command (12) | length (4 LE) | checksum (4)|
//! +------------+--------------+---------------+-------------+
//! | payload (variable)                                 ...  |
//! +---------------------------------------------------------+
//! ```
//!
//! The checksum is the first 4 bytes of `SHA256(SHA256(payload))`.
//! Keeping the framer separate from the messages lets it run in a
//! streaming receive loop: feed it whatever bytes have arrived and it
//! either yields a message, asks for more, or flags a bad frame that can
//! be skipped without tearing the connection down.

use crate::error::{EnvelopeError, WireError};
use crate::wire::message::{Command, Message};
use crate::wire::params::{NetworkParams, ProtocolVersion};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Envelope size preceding every payload.
pub const HEADER_SIZE: usize = 24;

/// Largest payload a frame may declare (32 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 0x0200_0000;

/// One step of framing a received byte buffer.
#[derive(Debug)]
pub enum Framed {
    /// A complete, valid message. `consumed` counts from the front of the
    /// buffer and includes any garbage skipped before the magic.
    Message { message: Message, consumed: usize },
    /// A structurally complete frame that failed validation. Drop
    /// `consumed` bytes and continue; the command names the offender.
    Invalid {
        command: String,
        reason: EnvelopeError,
        consumed: usize,
    },
    /// The buffer does not yet hold a whole frame.
    NeedMore,
}

/// Frames outgoing messages and locates/validates incoming ones.
pub struct MessageSerializer {
    params: &'static NetworkParams,
    protocol_version: u32,
}

impl MessageSerializer {
    /// Serializer speaking the network's current protocol version.
    pub fn new(params: &'static NetworkParams) -> Self {
        Self::with_protocol_version(params, params.protocol_version(ProtocolVersion::Current))
    }

    /// Serializer for an explicitly negotiated protocol version.
    pub fn with_protocol_version(params: &'static NetworkParams, protocol_version: u32) -> Self {
        Self {
            params,
            protocol_version,
        }
    }

    pub fn params(&self) -> &'static NetworkParams {
        self.params
    }

    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Wraps a payload in a complete envelope.
    pub fn frame(&self, command: Command, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&self.params.magic().to_le_bytes());
        frame.extend_from_slice(&command.as_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&checksum(payload));
        frame.extend_from_slice(payload);
        frame
    }

    /// Serializes a message body and wraps it in an envelope.
    pub fn frame_message(&self, message: &Message) -> std::io::Result<Vec<u8>> {
        Ok(self.frame(message.command(), &message.serialize()?))
    }

    /// Extracts the next frame from the front of `buf`.
    ///
    /// Scans forward for the network magic (bytes before it are counted
    /// into `consumed` once a frame completes), bounds the declared
    /// length, verifies the checksum, and dispatches to the parser for
    /// the command. Checksum mismatches and unknown commands come back as
    /// [`Framed::Invalid`] so the stream can continue past them; an
    /// oversized length declaration is unrecoverable and returns an
    /// error, as does a payload that violates its message format.
    pub fn next(&self, buf: &[u8]) -> Result<Framed, WireError> {
        let magic = self.params.magic().to_le_bytes();
        let Some(start) = buf.windows(4).position(|w| w == magic) else {
            return Ok(Framed::NeedMore);
        };
        if start > 0 {
            debug!(skipped = start, "skipping bytes before network magic");
        }

        if buf.len() < start + HEADER_SIZE {
            return Ok(Framed::NeedMore);
        }
        let header = &buf[start..start + HEADER_SIZE];

        let command_bytes: [u8; 12] = header[4..16].try_into().unwrap();
        let command_name = command_name_for_logging(&command_bytes);
        let length = u32::from_le_bytes(header[16..20].try_into().unwrap());
        let declared_checksum: [u8; 4] = header[20..24].try_into().unwrap();

        if length > MAX_PAYLOAD_SIZE {
            warn!(command = %command_name, length, "frame declares oversized payload");
            return Err(EnvelopeError::PayloadTooLarge {
                command: command_name,
                length,
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        let total = start + HEADER_SIZE + length as usize;
        if buf.len() < total {
            return Ok(Framed::NeedMore);
        }
        let payload = &buf[start + HEADER_SIZE..total];

        if checksum(payload) != declared_checksum {
            warn!(command = %command_name, "dropping frame with bad checksum");
            return Ok(Framed::Invalid {
                reason: EnvelopeError::ChecksumMismatch {
                    command: command_name.clone(),
                },
                command: command_name,
                consumed: total,
            });
        }

        let command = match Command::from_wire_bytes(&command_bytes) {
            Ok(command) => command,
            Err(name) => {
                warn!(command = %name, "dropping frame with unknown command");
                return Ok(Framed::Invalid {
                    reason: EnvelopeError::UnknownCommand {
                        command: name.clone(),
                    },
                    command: name,
                    consumed: total,
                });
            }
        };

        let message = Message::from_wire(command, self.params, payload, 0, self.protocol_version)?;
        Ok(Framed::Message {
            message,
            consumed: total,
        })
    }
}

/// First 4 bytes of the double SHA-256 of the payload.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = Sha256::digest(Sha256::digest(payload));
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&hash[..4]);
    checksum
}

fn command_name_for_logging(bytes: &[u8; 12]) -> String {
    std::str::from_utf8(bytes)
        .unwrap_or("")
        .trim_matches(char::from(0))
        .to_string()
}
