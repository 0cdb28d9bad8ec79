//! The 30-byte address record exchanged in `addr` traffic.

use crate::error::ProtocolError;
use crate::utils;
use crate::wire::message::WireMessage;
use crate::wire::params::{NetworkParams, ProtocolVersion, MAIN_NET};
use crate::wire::reader::PayloadReader;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Wire size of a serialized peer address.
pub const PEER_ADDRESS_SIZE: usize = 30;

/// Base service bit advertised for addresses we only know by IP.
const DEFAULT_SERVICES: u64 = 1;

/// Network location of one peer, as gossiped between nodes.
///
/// On the wire this is exactly 30 bytes:
///
/// ```text
///  0..4    uint32 LE  time      (last seen, seconds since epoch)
///  4..12   uint64 LE  services  (capability bitfield)
/// 12..28   16 bytes   address   (IPv6 form; IPv4 carried as ::ffff:a.b.c.d)
/// 28..30   uint16 BE  port
/// ```
///
/// Unlike every other integer in the message set, the port travels in
/// network byte order. Tor peers are held as a `.onion` hostname with no IP
/// address; they have no 30-byte wire form and refuse serialization.
///
/// Instances are not safe for use by multiple threads.
#[derive(Debug, Clone)]
pub struct PeerAddress {
    addr: Option<IpAddr>,
    hostname: Option<String>,
    port: u16,
    services: u64,
    time: u32,
    protocol_version: u32,
}

impl PeerAddress {
    /// Address from an IP and port, speaking the network's current version.
    pub fn new(params: &NetworkParams, addr: IpAddr, port: u16) -> Self {
        Self::with_version(
            addr,
            port,
            params.protocol_version(ProtocolVersion::Current),
        )
    }

    /// Address from an IP and port under an explicit protocol version.
    pub fn with_version(addr: IpAddr, port: u16, protocol_version: u32) -> Self {
        Self {
            addr: Some(addr),
            hostname: None,
            port,
            services: DEFAULT_SERVICES,
            time: 0,
            protocol_version,
        }
    }

    /// Address from an IP alone; port and version default to mainnet's.
    pub fn from_addr(addr: IpAddr) -> Self {
        Self::new(&MAIN_NET, addr, MAIN_NET.default_port())
    }

    /// Address from a resolved socket address.
    pub fn from_socket_addr(params: &NetworkParams, addr: SocketAddr) -> Self {
        Self::new(params, addr.ip(), addr.port())
    }

    /// Address from a hostname and port. This is how Tor `.onion` peers are
    /// represented; they advertise no services and carry no IP.
    pub fn from_hostname(hostname: impl Into<String>, port: u16) -> Self {
        Self {
            addr: None,
            hostname: Some(hostname.into()),
            port,
            services: 0,
            time: 0,
            protocol_version: MAIN_NET.protocol_version(ProtocolVersion::Current),
        }
    }

    /// `127.0.0.1` on the network's default port.
    pub fn localhost(params: &NetworkParams) -> Self {
        Self::new(params, IpAddr::V4(Ipv4Addr::LOCALHOST), params.default_port())
    }

    /// Reads one 30-byte record at the reader's cursor.
    pub(crate) fn read(
        reader: &mut PayloadReader<'_>,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        let time = reader.read_u32_le("peer address: time")?;
        let services = reader.read_u64_le("peer address: services")?;
        let addr_bytes: [u8; 16] = reader.read_array("peer address: address")?;
        // The 16-byte field always holds the IPv6 form; canonicalization
        // (collapsing ::ffff:a.b.c.d back to IPv4) is the address type's job.
        let addr = IpAddr::from(addr_bytes).to_canonical();
        let port = reader.read_u16_be("peer address: port")?;
        Ok(Self {
            addr: Some(addr),
            hostname: None,
            port,
            services,
            time,
            protocol_version,
        })
    }

    pub fn addr(&self) -> Option<IpAddr> {
        self.addr
    }

    pub fn set_addr(&mut self, addr: IpAddr) {
        self.addr = Some(addr);
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn services(&self) -> u64 {
        self.services
    }

    pub fn set_services(&mut self, services: u64) {
        self.services = services;
    }

    /// Seconds since epoch this peer was last seen, as parsed from the wire.
    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn set_time(&mut self, time: u32) {
        self.time = time;
    }

    /// Socket address, when an IP is known. `.onion` peers return `None`
    /// and must be dialed through their hostname.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.addr.map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl WireMessage for PeerAddress {
    fn from_payload(
        _params: &NetworkParams,
        payload: &[u8],
        offset: usize,
        protocol_version: u32,
    ) -> Result<Self, ProtocolError> {
        let mut reader = PayloadReader::new(payload, offset);
        Self::read(&mut reader, protocol_version)
    }

    /// Writes the 30-byte record.
    ///
    /// The `time` field is deliberately not taken from this instance: the
    /// advertisement is stamped with the clock at send time, so serialize
    /// is not a pure function of the struct. Tests freeze the clock.
    fn serialize_to_stream<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        let Some(addr) = self.addr else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "hostname-only peer address has no fixed-size wire form",
            ));
        };
        sink.write_u32::<LittleEndian>(utils::current_time_seconds() as u32)?;
        sink.write_u64::<LittleEndian>(self.services)?;
        sink.write_all(&ipv6_form(addr))?;
        sink.write_u8((self.port >> 8) as u8)?;
        sink.write_u8((self.port & 0xFF) as u8)?;
        Ok(())
    }

    fn length(&self) -> usize {
        PEER_ADDRESS_SIZE
    }

    fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

/// Expands an address to the 16-byte IPv6 form used on the wire: IPv6
/// octets pass through, IPv4 becomes `::ffff:a.b.c.d`.
pub(crate) fn ipv6_form(addr: IpAddr) -> [u8; 16] {
    match addr {
        IpAddr::V4(v4) => {
            let mut bytes = [0u8; 16];
            bytes[10] = 0xFF;
            bytes[11] = 0xFF;
            bytes[12..].copy_from_slice(&v4.octets());
            bytes
        }
        IpAddr::V6(v6) => v6.octets(),
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.hostname, &self.addr) {
            (Some(host), _) => write!(f, "[{}]:{}", host, self.port),
            (None, Some(addr)) => write!(f, "[{}]:{}", addr, self.port),
            (None, None) => write!(f, "[unspecified]:{}", self.port),
        }
    }
}

// Identity is the advertised tuple, not the hostname. Two advertisements
// for the same endpoint with different times or services compare unequal,
// so a refreshed advertisement shows up as a distinct set member.
impl PartialEq for PeerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
            && self.port == other.port
            && self.time == other.time
            && self.services == other.services
    }
}

impl Eq for PeerAddress {}

impl Hash for PeerAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
        self.port.hash(state);
        self.time.hash(state);
        self.services.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::testing::FrozenClock;
    use crate::wire::params::TEST_NET;
    use std::collections::HashSet;
    use std::net::Ipv6Addr;

    fn parse(bytes: &[u8]) -> PeerAddress {
        PeerAddress::from_payload(&MAIN_NET, bytes, 0, 70012).unwrap()
    }

    #[test]
    fn serializes_localhost_to_known_bytes() {
        let _clock = FrozenClock::at(0x5A00_0000);
        let peer = PeerAddress::new(&MAIN_NET, IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8333);

        let bytes = peer.serialize().unwrap();

        assert_eq!(
            hex::encode(&bytes),
            "0000005a0100000000000000000000000000000000000000ffff7f000001208d"
        );
        assert_eq!(bytes.len(), PEER_ADDRESS_SIZE);
    }

    #[test]
    fn parses_the_localhost_record_back() {
        let bytes = hex::decode("0000005a0100000000000000000000000000000000000000ffff7f000001208d")
            .unwrap();

        let peer = parse(&bytes);

        assert_eq!(peer.time(), 0x5A00_0000);
        assert_eq!(peer.services(), 1);
        // ::ffff:127.0.0.1 canonicalizes to the plain IPv4 address.
        assert_eq!(peer.addr(), Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert_eq!(peer.port(), 8333);
        assert_eq!(peer.length(), PEER_ADDRESS_SIZE);
    }

    #[test]
    fn round_trip_is_identity_except_time() {
        let _clock = FrozenClock::at(1_700_000_000);
        let original = PeerAddress::new(&MAIN_NET, IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), 8632);

        let reparsed = parse(&original.serialize().unwrap());

        // time is refreshed from the clock on send, so it differs from the
        // in-memory instance (which never had one) but everything else holds.
        assert_eq!(reparsed.addr(), original.addr());
        assert_eq!(reparsed.port(), original.port());
        assert_eq!(reparsed.services(), original.services());
        assert_eq!(reparsed.time(), 1_700_000_000);

        // A second serialize under the same clock reproduces the bytes.
        let bytes = reparsed.serialize().unwrap();
        assert_eq!(bytes, original.serialize().unwrap());
    }

    #[test]
    fn ipv4_is_written_in_mapped_form() {
        let _clock = FrozenClock::at(0);
        let peer = PeerAddress::new(&MAIN_NET, IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)), 8632);

        let bytes = peer.serialize().unwrap();

        assert_eq!(&bytes[12..22], &[0u8; 10]);
        assert_eq!(&bytes[22..24], &[0xFF, 0xFF]);
        assert_eq!(&bytes[24..28], &[93, 184, 216, 34]);
    }

    #[test]
    fn port_is_big_endian_on_the_wire() {
        let _clock = FrozenClock::at(0);
        let peer = PeerAddress::new(&MAIN_NET, IpAddr::V4(Ipv4Addr::LOCALHOST), 0x1234);

        let bytes = peer.serialize().unwrap();

        assert_eq!(bytes[28], 0x12);
        assert_eq!(bytes[29], 0x34);
    }

    #[test]
    fn native_ipv6_passes_through_untouched() {
        let _clock = FrozenClock::at(0);
        let ip = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
        let peer = PeerAddress::new(&MAIN_NET, IpAddr::V6(ip), 8632);

        let bytes = peer.serialize().unwrap();
        assert_eq!(&bytes[12..28], &ip.octets());

        let reparsed = parse(&bytes);
        assert_eq!(reparsed.addr(), Some(IpAddr::V6(ip)));
    }

    #[test]
    fn parse_respects_offset() {
        let _clock = FrozenClock::at(7);
        let peer = PeerAddress::new(&MAIN_NET, IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 1);
        let mut buf = vec![0xEE; 5];
        buf.extend(peer.serialize().unwrap());

        let reparsed = PeerAddress::from_payload(&MAIN_NET, &buf, 5, 70012).unwrap();
        assert_eq!(reparsed.addr(), Some(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))));
        assert_eq!(reparsed.port(), 1);
    }

    #[test]
    fn truncated_record_is_a_protocol_error() {
        let err = PeerAddress::from_payload(&MAIN_NET, &[0u8; 29], 0, 70012).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated(_)));
    }

    #[test]
    fn equality_covers_the_advertised_tuple() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let a = PeerAddress::with_version(ip, 8632, 70012);
        let b = PeerAddress::with_version(ip, 8632, 70012);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&b));

        let mut c = b.clone();
        c.set_port(8633);
        assert_ne!(a, c);

        let mut c = b.clone();
        c.set_time(1);
        assert_ne!(a, c);

        let mut c = b.clone();
        c.set_services(8);
        assert_ne!(a, c);

        let mut c = b;
        c.set_addr(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_ne!(a, c);
    }

    #[test]
    fn onion_peer_has_hostname_and_no_services() {
        let peer = PeerAddress::from_hostname("abcd.onion", 8333);

        assert_eq!(peer.hostname(), Some("abcd.onion"));
        assert_eq!(peer.addr(), None);
        assert_eq!(peer.services(), 0);
        assert_eq!(peer.port(), 8333);
        assert_eq!(peer.to_string(), "[abcd.onion]:8333");
        assert_eq!(peer.socket_addr(), None);
    }

    #[test]
    fn onion_peer_refuses_serialization() {
        let peer = PeerAddress::from_hostname("abcd.onion", 8333);
        let err = peer.serialize().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn localhost_uses_the_network_default_port() {
        let peer = PeerAddress::localhost(&MAIN_NET);
        assert_eq!(peer.addr(), Some(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert_eq!(peer.port(), MAIN_NET.default_port());

        assert_eq!(PeerAddress::localhost(&TEST_NET).port(), TEST_NET.default_port());
    }

    #[test]
    fn display_shows_bracketed_endpoint() {
        let peer = PeerAddress::with_version(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8632, 70012);
        assert_eq!(peer.to_string(), "[127.0.0.1]:8632");
    }
}
