//! inchain wire protocol primitives.
//!
//! This module implements the byte-level contract between peers:
//! the envelope framer, the typed message family, the 30-byte peer
//! address record, and the per-network constants everything consults.
//!
//! The format is the Bitcoin-family one; the general shape is documented
//! at https://developer.bitcoin.org/reference/p2p_networking.html

pub mod message;
pub mod params;
pub mod peer_address;
pub mod reader;
pub mod serializer;

pub use message::{
    AddrMessage, Command, GetAddrMessage, Message, NetAddr, PingMessage, PongMessage,
    VerackMessage, VersionMessage, WireMessage,
};
pub use params::{NetworkParams, ProtocolVersion, MAIN_NET, TEST_NET};
pub use peer_address::{PeerAddress, PEER_ADDRESS_SIZE};
pub use reader::PayloadReader;
pub use serializer::{Framed, MessageSerializer, HEADER_SIZE, MAX_PAYLOAD_SIZE};
