//! The typed message family and the contract every member obeys.
//!
//! Each wire message is a concrete struct implementing [`WireMessage`]; the
//! [`Message`] enum is the closed set the envelope framer dispatches into.
//! Bodies never include the envelope (magic, command, length, checksum);
//! framing is the serializer's concern.

use crate::error::ProtocolError;
use crate::utils;
use crate::wire::params::{NetworkParams, ProtocolVersion};
use crate::wire::peer_address::{ipv6_form, PeerAddress, PEER_ADDRESS_SIZE};
use crate::wire::reader::{varint_size, write_varint, PayloadReader};
use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use rand::Rng;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr};

/// User agent advertised in our `version` messages.
pub const USER_AGENT: &str = "/inchain-network:0.1.0/";

/// Longest user agent accepted from a peer.
const MAX_USER_AGENT_LENGTH: u64 = 256;

/// Most addresses allowed in one `addr` message.
const MAX_ADDRESSES: u64 = 1000;

/// Message kinds this node understands, one per wire command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Version,
    Verack,
    Addr,
    GetAddr,
    Ping,
    Pong,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Addr => "addr",
            Command::GetAddr => "getaddr",
            Command::Ping => "ping",
            Command::Pong => "pong",
        }
    }

    /// The 12-byte command field: ASCII, padded with zero bytes.
    pub fn as_bytes(&self) -> [u8; 12] {
        let name = self.as_str().as_bytes();
        let mut padded = [0u8; 12];
        padded[..name.len()].copy_from_slice(name);
        padded
    }

    /// Decodes a header command field. Unknown commands come back as `Err`
    /// carrying the trimmed name so callers can log what the peer sent.
    pub fn from_wire_bytes(bytes: &[u8; 12]) -> Result<Self, String> {
        let name = std::str::from_utf8(bytes)
            .unwrap_or("")
            .trim_matches(char::from(0));
        match name {
            "version" => Ok(Command::Version),
            "verack" => Ok(Command::Verack),
            "addr" => Ok(Command::Addr),
            "getaddr" => Ok(Command::GetAddr),
            "ping" => Ok(Command::Ping),
            "pong" => Ok(Command::Pong),
            other => Err(other.to_string()),
        }
    }
}

/// The parse/serialize contract shared by every concrete message.
///
/// Parsing starts a cursor at `offset`, consumes exactly the message body,
/// and the distance travelled becomes [`length`](WireMessage::length).
/// Serialization writes the body to any sink and, apart from fields
/// documented as refreshed on send (the `time` of a [`PeerAddress`]),
/// reproduces the parsed bytes exactly.
pub trait WireMessage: Sized {
    /// Constructs the message by parsing `payload` starting at `offset`.
    fn from_payload(
        params: &NetworkParams,
        payload: &[u8],
        offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError>;

    /// Writes the message body. The envelope is not written here.
    fn serialize_to_stream<W: Write>(&self, sink: &mut W) -> io::Result<()>;

    /// Body length in bytes.
    fn length(&self) -> usize;

    /// Protocol version this message was parsed under or will be sent under.
    fn protocol_version(&self) -> u32;

    /// The body as a byte vector.
    fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::with_capacity(self.length());
        self.serialize_to_stream(&mut body)?;
        Ok(body)
    }
}

/// A decoded inchain message.
#[derive(Debug)]
pub enum Message {
    Version(VersionMessage),
    Verack(VerackMessage),
    Addr(AddrMessage),
    GetAddr(GetAddrMessage),
    Ping(PingMessage),
    Pong(PongMessage),
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version(_) => Command::Version,
            Message::Verack(_) => Command::Verack,
            Message::Addr(_) => Command::Addr,
            Message::GetAddr(_) => Command::GetAddr,
            Message::Ping(_) => Command::Ping,
            Message::Pong(_) => Command::Pong,
        }
    }

    /// Dispatches a framed payload to the parser for `command`.
    pub(crate) fn from_wire(
        command: Command,
        params: &NetworkParams,
        payload: &[u8],
        offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        match command {
            Command::Version => {
                VersionMessage::from_payload(params, payload, offset, protocol_version)
                    .map(Message::Version)
            }
            Command::Verack => {
                VerackMessage::from_payload(params, payload, offset, protocol_version)
                    .map(Message::Verack)
            }
            Command::Addr => AddrMessage::from_payload(params, payload, offset, protocol_version)
                .map(Message::Addr),
            Command::GetAddr => {
                GetAddrMessage::from_payload(params, payload, offset, protocol_version)
                    .map(Message::GetAddr)
            }
            Command::Ping => PingMessage::from_payload(params, payload, offset, protocol_version)
                .map(Message::Ping),
            Command::Pong => PongMessage::from_payload(params, payload, offset, protocol_version)
                .map(Message::Pong),
        }
    }

    pub fn serialize_to_stream<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        match self {
            Message::Version(m) => m.serialize_to_stream(sink),
            Message::Verack(m) => m.serialize_to_stream(sink),
            Message::Addr(m) => m.serialize_to_stream(sink),
            Message::GetAddr(m) => m.serialize_to_stream(sink),
            Message::Ping(m) => m.serialize_to_stream(sink),
            Message::Pong(m) => m.serialize_to_stream(sink),
        }
    }

    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::with_capacity(self.length());
        self.serialize_to_stream(&mut body)?;
        Ok(body)
    }

    pub fn length(&self) -> usize {
        match self {
            Message::Version(m) => m.length(),
            Message::Verack(m) => m.length(),
            Message::Addr(m) => m.length(),
            Message::GetAddr(m) => m.length(),
            Message::Ping(m) => m.length(),
            Message::Pong(m) => m.length(),
        }
    }

    pub fn protocol_version(&self) -> u32 {
        match self {
            Message::Version(m) => m.protocol_version(),
            Message::Verack(m) => m.protocol_version(),
            Message::Addr(m) => m.protocol_version(),
            Message::GetAddr(m) => m.protocol_version(),
            Message::Ping(m) => m.protocol_version(),
            Message::Pong(m) => m.protocol_version(),
        }
    }
}

/// The time-less 26-byte address stub embedded in `version` messages:
/// services (u64 LE), 16-byte IPv6-form address, port (u16 BE). The
/// last-seen timestamp lives only in `addr` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddr {
    pub services: u64,
    pub ip: IpAddr,
    pub port: u16,
}

impl NetAddr {
    const WIRE_SIZE: usize = 26;

    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            services: 0,
            ip,
            port,
        }
    }

    /// The all-zero stub nodes send when they do not know an endpoint.
    pub fn unspecified() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    }

    fn read(reader: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let services = reader.read_u64_le("net addr: services")?;
        let ip_bytes: [u8; 16] = reader.read_array("net addr: address")?;
        let ip = IpAddr::from(ip_bytes).to_canonical();
        let port = reader.read_u16_be("net addr: port")?;
        Ok(Self { services, ip, port })
    }

    fn write<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_u64::<LittleEndian>(self.services)?;
        sink.write_all(&ipv6_form(self.ip))?;
        sink.write_u16::<BigEndian>(self.port)
    }
}

/// The `version` handshake message.
///
/// Layout: protocol version (u32 LE), services (u64 LE), timestamp
/// (i64 LE), receiver stub (26 bytes), sender stub (26 bytes), nonce
/// (u64 LE), CompactSize-prefixed user agent, best height (u32 LE).
#[derive(Debug, Clone)]
pub struct VersionMessage {
    pub version: u32,
    pub services: u64,
    pub timestamp: i64,
    pub receiver: NetAddr,
    pub sender: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: u32,
    protocol_version: u32,
    length: usize,
}

impl VersionMessage {
    /// Builds our own announcement: current version, current clock, a
    /// random nonce for self-connection detection, and [`USER_AGENT`].
    pub fn new(params: &NetworkParams, services: u64, start_height: u32) -> Self {
        let version = params.protocol_version(ProtocolVersion::Current);
        let user_agent = USER_AGENT.to_string();
        let length = Self::body_length(&user_agent);
        Self {
            version,
            services,
            timestamp: utils::current_time_seconds() as i64,
            receiver: NetAddr::unspecified(),
            sender: NetAddr::unspecified(),
            nonce: rand::thread_rng().r#gen(),
            user_agent,
            start_height,
            protocol_version: version,
            length,
        }
    }

    fn body_length(user_agent: &str) -> usize {
        4 + 8 + 8 + NetAddr::WIRE_SIZE * 2 + 8 + varint_size(user_agent.len() as u64)
            + user_agent.len()
            + 4
    }
}

impl WireMessage for VersionMessage {
    fn from_payload(
        _params: &NetworkParams,
        payload: &[u8],
        offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        let mut reader = PayloadReader::new(payload, offset);
        let version = reader.read_u32_le("version: version")?;
        let services = reader.read_u64_le("version: services")?;
        let timestamp = reader.read_i64_le("version: timestamp")?;
        let receiver = NetAddr::read(&mut reader)?;
        let sender = NetAddr::read(&mut reader)?;
        let nonce = reader.read_u64_le("version: nonce")?;

        let ua_len = reader.read_varint("version: user agent length")?;
        if ua_len > MAX_USER_AGENT_LENGTH {
            return Err(ProtocolError::TooManyEntries {
                context: "version: user agent bytes",
                count: ua_len,
                max: MAX_USER_AGENT_LENGTH,
            });
        }
        let ua_bytes = reader.read_bytes(ua_len as usize, "version: user agent")?;
        let user_agent = String::from_utf8(ua_bytes)
            .map_err(|_| ProtocolError::InvalidUtf8("version: user agent"))?;

        let start_height = reader.read_u32_le("version: start height")?;
        let length = reader.cursor() - offset;

        Ok(Self {
            version,
            services,
            timestamp,
            receiver,
            sender,
            nonce,
            user_agent,
            start_height,
            protocol_version,
            length,
        })
    }

    fn serialize_to_stream<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_u32::<LittleEndian>(self.version)?;
        sink.write_u64::<LittleEndian>(self.services)?;
        sink.write_i64::<LittleEndian>(self.timestamp)?;
        self.receiver.write(sink)?;
        self.sender.write(sink)?;
        sink.write_u64::<LittleEndian>(self.nonce)?;
        write_varint(self.user_agent.len() as u64, sink)?;
        sink.write_all(self.user_agent.as_bytes())?;
        sink.write_u32::<LittleEndian>(self.start_height)
    }

    fn length(&self) -> usize {
        self.length
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

/// `verack`: empty acknowledgement completing the handshake.
#[derive(Debug, Clone)]
pub struct VerackMessage {
    protocol_version: u32,
}

impl VerackMessage {
    pub fn new(protocol_version: u32) -> Self {
        Self { protocol_version }
    }
}

impl WireMessage for VerackMessage {
    fn from_payload(
        _params: &NetworkParams,
        _payload: &[u8],
        _offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        Ok(Self { protocol_version })
    }

    fn serialize_to_stream<W: Write>(&self, _sink: &mut W) -> io::Result<()> {
        Ok(())
    }

    fn length(&self) -> usize {
        0
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

/// `getaddr`: empty request for the peer's known addresses.
#[derive(Debug, Clone)]
pub struct GetAddrMessage {
    protocol_version: u32,
}

impl GetAddrMessage {
    pub fn new(protocol_version: u32) -> Self {
        Self { protocol_version }
    }
}

impl WireMessage for GetAddrMessage {
    fn from_payload(
        _params: &NetworkParams,
        _payload: &[u8],
        _offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        Ok(Self { protocol_version })
    }

    fn serialize_to_stream<W: Write>(&self, _sink: &mut W) -> io::Result<()> {
        Ok(())
    }

    fn length(&self) -> usize {
        0
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

/// `ping`: keepalive carrying a nonce the peer must echo.
#[derive(Debug, Clone)]
pub struct PingMessage {
    pub nonce: u64,
    protocol_version: u32,
}

impl PingMessage {
    pub fn new(protocol_version: u32) -> Self {
        Self::with_nonce(rand::thread_rng().r#gen(), protocol_version)
    }

    pub fn with_nonce(nonce: u64, protocol_version: u32) -> Self {
        Self {
            nonce,
            protocol_version,
        }
    }
}

impl WireMessage for PingMessage {
    fn from_payload(
        _params: &NetworkParams,
        payload: &[u8],
        offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        let mut reader = PayloadReader::new(payload, offset);
        let nonce = reader.read_u64_le("ping: nonce")?;
        Ok(Self {
            nonce,
            protocol_version,
        })
    }

    fn serialize_to_stream<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_u64::<LittleEndian>(self.nonce)
    }

    fn length(&self) -> usize {
        8
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

/// `pong`: echoes the nonce of the `ping` it answers.
#[derive(Debug, Clone)]
pub struct PongMessage {
    pub nonce: u64,
    protocol_version: u32,
}

impl PongMessage {
    pub fn new(nonce: u64, protocol_version: u32) -> Self {
        Self {
            nonce,
            protocol_version,
        }
    }

    /// The reply to a received ping.
    pub fn answering(ping: &PingMessage) -> Self {
        Self::new(ping.nonce, ping.protocol_version)
    }
}

impl WireMessage for PongMessage {
    fn from_payload(
        _params: &NetworkParams,
        payload: &[u8],
        offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        let mut reader = PayloadReader::new(payload, offset);
        let nonce = reader.read_u64_le("pong: nonce")?;
        Ok(Self {
            nonce,
            protocol_version,
        })
    }

    fn serialize_to_stream<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        sink.write_u64::<LittleEndian>(self.nonce)
    }

    fn length(&self) -> usize {
        8
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

/// `addr`: a CompactSize count followed by that many 30-byte
/// [`PeerAddress`] records. Capped at 1000 entries.
#[derive(Debug, Clone)]
pub struct AddrMessage {
    pub addresses: Vec<PeerAddress>,
    protocol_version: u32,
    length: usize,
}

impl AddrMessage {
    pub fn new(addresses: Vec<PeerAddress>, protocol_version: u32) -> Self {
        let length = varint_size(addresses.len() as u64) + addresses.len() * PEER_ADDRESS_SIZE;
        Self {
            addresses,
            protocol_version,
            length,
        }
    }
}

impl WireMessage for AddrMessage {
    fn from_payload(
        _params: &NetworkParams,
        payload: &[u8],
        offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        let mut reader = PayloadReader::new(payload, offset);
        let count = reader.read_varint("addr: count")?;
        if count > MAX_ADDRESSES {
            return Err(ProtocolError::TooManyEntries {
                context: "addr: addresses",
                count,
                max: MAX_ADDRESSES,
            });
        }
        let mut addresses = Vec::with_capacity(count as usize);
        for _ in 0..count {
            addresses.push(PeerAddress::read(&mut reader, protocol_version)?);
        }
        let length = reader.cursor() - offset;
        Ok(Self {
            addresses,
            protocol_version,
            length,
        })
    }

    fn serialize_to_stream<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        write_varint(self.addresses.len() as u64, sink)?;
        for address in &self.addresses {
            address.serialize_to_stream(sink)?;
        }
        Ok(())
    }

    fn length(&self) -> usize {
        self.length
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::FrozenClock;
    use crate::wire::params::MAIN_NET;

    #[test]
    fn command_bytes_are_nul_padded_ascii() {
        let bytes = Command::Version.as_bytes();
        assert_eq!(&bytes[..7], b"version");
        assert_eq!(&bytes[7..], &[0u8; 5]);
        assert_eq!(Command::from_wire_bytes(&bytes).unwrap(), Command::Version);
    }

    #[test]
    fn unknown_command_name_is_preserved() {
        let mut bytes = [0u8; 12];
        bytes[..5].copy_from_slice(b"bogus");
        assert_eq!(Command::from_wire_bytes(&bytes).unwrap_err(), "bogus");
    }

    #[test]
    fn every_command_round_trips_through_its_bytes() {
        for command in [
            Command::Version,
            Command::Verack,
            Command::Addr,
            Command::GetAddr,
            Command::Ping,
            Command::Pong,
        ] {
            assert_eq!(
                Command::from_wire_bytes(&command.as_bytes()).unwrap(),
                command
            );
        }
    }

    #[test]
    fn version_message_round_trips_byte_exactly() {
        let original = VersionMessage::new(&MAIN_NET, 1, 42_000);
        let body = original.serialize().unwrap();
        assert_eq!(body.len(), original.length());

        let reparsed =
            VersionMessage::from_payload(&MAIN_NET, &body, 0, original.protocol_version()).unwrap();

        assert_eq!(reparsed.version, original.version);
        assert_eq!(reparsed.services, original.services);
        assert_eq!(reparsed.timestamp, original.timestamp);
        assert_eq!(reparsed.nonce, original.nonce);
        assert_eq!(reparsed.user_agent, USER_AGENT);
        assert_eq!(reparsed.start_height, 42_000);
        assert_eq!(reparsed.length(), body.len());
        assert_eq!(reparsed.serialize().unwrap(), body);
    }

    #[test]
    fn version_message_carries_endpoint_stubs() {
        let mut original = VersionMessage::new(&MAIN_NET, 0, 0);
        original.receiver = NetAddr {
            services: 1,
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)),
            port: 8632,
        };
        let body = original.serialize().unwrap();

        let reparsed = VersionMessage::from_payload(&MAIN_NET, &body, 0, 70012).unwrap();
        assert_eq!(reparsed.receiver, original.receiver);
        assert_eq!(reparsed.sender, NetAddr::unspecified());
    }

    #[test]
    fn version_rejects_oversized_user_agent() {
        let mut original = VersionMessage::new(&MAIN_NET, 0, 0);
        original.user_agent = "x".repeat(300);
        let body = original.serialize().unwrap();

        let err = VersionMessage::from_payload(&MAIN_NET, &body, 0, 70012).unwrap_err();
        assert!(matches!(err, ProtocolError::TooManyEntries { .. }));
    }

    #[test]
    fn version_rejects_truncated_body() {
        let body = VersionMessage::new(&MAIN_NET, 0, 0).serialize().unwrap();
        let err =
            VersionMessage::from_payload(&MAIN_NET, &body[..body.len() - 2], 0, 70012).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated(_)));
    }

    #[test]
    fn ping_pong_nonce_echoes() {
        let ping = PingMessage::new(70012);
        let pong = PongMessage::answering(&ping);
        assert_eq!(pong.nonce, ping.nonce);

        let body = ping.serialize().unwrap();
        assert_eq!(body.len(), 8);
        let reparsed = PingMessage::from_payload(&MAIN_NET, &body, 0, 70012).unwrap();
        assert_eq!(reparsed.nonce, ping.nonce);
    }

    #[test]
    fn empty_messages_have_empty_bodies() {
        assert!(VerackMessage::new(70012).serialize().unwrap().is_empty());
        assert!(GetAddrMessage::new(70012).serialize().unwrap().is_empty());
    }

    #[test]
    fn addr_message_round_trips_under_a_frozen_clock() {
        let _clock = FrozenClock::at(0x1234_5678);
        let addresses = vec![
            PeerAddress::new(&MAIN_NET, IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 8632),
            PeerAddress::new(&MAIN_NET, IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)), 8633),
        ];
        let original = AddrMessage::new(addresses, 70012);
        let body = original.serialize().unwrap();
        assert_eq!(body.len(), original.length());
        assert_eq!(body.len(), 1 + 2 * PEER_ADDRESS_SIZE);

        let reparsed = AddrMessage::from_payload(&MAIN_NET, &body, 0, 70012).unwrap();
        assert_eq!(reparsed.addresses.len(), 2);
        assert_eq!(reparsed.addresses[0].port(), 8632);
        assert_eq!(reparsed.addresses[0].time(), 0x1234_5678);
        // With the clock still frozen, a reserialize reproduces the bytes.
        assert_eq!(reparsed.serialize().unwrap(), body);
    }

    #[test]
    fn addr_message_rejects_oversized_count() {
        // CompactSize 0xFD prefix encoding 1001.
        let payload = [0xFD, 0xE9, 0x03];
        let err = AddrMessage::from_payload(&MAIN_NET, &payload, 0, 70012).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::TooManyEntries { count: 1001, .. }
        ));
    }

    #[test]
    fn addr_message_rejects_truncated_entry() {
        let _clock = FrozenClock::at(0);
        let original = AddrMessage::new(
            vec![PeerAddress::new(
                &MAIN_NET,
                IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)),
                8632,
            )],
            70012,
        );
        let body = original.serialize().unwrap();

        let err =
            AddrMessage::from_payload(&MAIN_NET, &body[..body.len() - 5], 0, 70012).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated(_)));
    }

    #[test]
    fn empty_addr_message_is_one_byte() {
        let original = AddrMessage::new(vec![], 70012);
        assert_eq!(original.serialize().unwrap(), vec![0x00]);

        let reparsed = AddrMessage::from_payload(&MAIN_NET, &[0x00], 0, 70012).unwrap();
        assert!(reparsed.addresses.is_empty());
        assert_eq!(reparsed.length(), 1);
    }
}
