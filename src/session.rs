//! A blocking TCP session with one peer.
//!
//! Wraps a stream with the envelope serializer and drives the
//! version/verack handshake. Received bytes accumulate in a buffer the
//! framer is fed from, so partial frames and back-to-back frames both
//! work regardless of how the kernel chunks the stream.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::error::{ProtocolError, WireError, WireResult};
use crate::wire::{
    Framed, Message, MessageSerializer, NetworkParams, ProtocolVersion, VerackMessage,
    VersionMessage,
};
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 4096;
const IO_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Session {
    stream: TcpStream,
    serializer: MessageSerializer,
    buffer: Vec<u8>,
}

impl Session {
    pub fn new(params: &'static NetworkParams, stream: TcpStream) -> WireResult<Self> {
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(Self {
            stream,
            serializer: MessageSerializer::new(params),
            buffer: Vec::new(),
        })
    }

    pub fn params(&self) -> &'static NetworkParams {
        self.serializer.params()
    }

    pub fn protocol_version(&self) -> u32 {
        self.serializer.protocol_version()
    }

    /// Performs the version/verack exchange and returns the peer's
    /// announcement.
    ///
    /// The peer's advertised version is checked against the network's
    /// minimum; anything older is refused before verack.
    pub fn handshake(&mut self) -> WireResult<VersionMessage> {
        let local = VersionMessage::new(self.params(), 0, 0);
        self.send(&Message::Version(local))?;

        let mut peer_version: Option<VersionMessage> = None;
        let mut got_verack = false;

        while peer_version.is_none() || !got_verack {
            match self.recv()? {
                Message::Version(version) => {
                    let minimum = self.params().protocol_version(ProtocolVersion::Minimum);
                    if version.version < minimum {
                        return Err(ProtocolError::UnsupportedVersion {
                            got: version.version,
                            minimum,
                        }
                        .into());
                    }
                    info!(
                        version = version.version,
                        user_agent = %version.user_agent,
                        "peer announced itself"
                    );
                    self.send(&Message::Verack(VerackMessage::new(self.protocol_version())))?;
                    peer_version = Some(version);
                }
                Message::Verack(_) => {
                    got_verack = true;
                }
                other => {
                    debug!(command = other.command().as_str(), "ignored during handshake");
                }
            }
        }

        // Both arms assign before the loop exits.
        peer_version.ok_or_else(|| WireError::Handshake("peer never sent version".into()))
    }

    /// Frames and writes one message.
    pub fn send(&mut self, message: &Message) -> WireResult<()> {
        let frame = self.serializer.frame_message(message)?;
        self.stream.write_all(&frame)?;
        debug!(command = message.command().as_str(), "sent");
        Ok(())
    }

    /// Blocks until the next valid message arrives.
    ///
    /// Invalid frames (bad checksum, unknown command) are logged and
    /// skipped; malformed payloads and oversized frames are errors the
    /// caller should disconnect on.
    pub fn recv(&mut self) -> WireResult<Message> {
        loop {
            match self.serializer.next(&self.buffer)? {
                Framed::Message { message, consumed } => {
                    self.buffer.drain(..consumed);
                    debug!(command = message.command().as_str(), "received");
                    return Ok(message);
                }
                Framed::Invalid {
                    command,
                    reason,
                    consumed,
                } => {
                    warn!(command = %command, %reason, "skipping invalid frame");
                    self.buffer.drain(..consumed);
                }
                Framed::NeedMore => {
                    let mut chunk = [0u8; READ_CHUNK];
                    let n = self.stream.read(&mut chunk)?;
                    if n == 0 {
                        return Err(WireError::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "peer closed connection",
                        )));
                    }
                    self.buffer.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}
